//! Clinic views over the record pipeline.
//!
//! `ClinicService` owns the store, the clinic configuration and the field
//! key, and runs Fetch → Decrypt → Query for each view. Nothing is cached:
//! every call refetches.

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use crate::config::{ClinicConfig, CollectionConfig, ConfigError, ObserverZone};
use crate::crypto::FieldKey;
use crate::models::{AppointmentRow, DecryptedRecord, PrescriptionDetail, PrescriptionRow, RawRecord};
use crate::pipeline::{
    aggregate_by_weekday, decrypt_all, fetch_collection, fetch_document, fetch_pair,
    filter_prescriptions, WeekdayBucket,
};
use crate::store::{DocumentStore, StoreError};

#[derive(Error, Debug)]
pub enum ClinicError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardData {
    /// Number of appointment documents.
    pub patient_count: usize,
    pub prescription_count: usize,
    /// Monday → Sunday.
    pub weekly: Vec<WeekdayBucket>,
    /// Prescriptions left out of `weekly` for lack of a usable date.
    pub skipped: usize,
}

/// Result of the prescription list for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionList {
    pub query: String,
    pub rows: Vec<PrescriptionRow>,
    pub records: Vec<DecryptedRecord>,
}

pub struct ClinicService<S> {
    store: S,
    config: ClinicConfig,
    key: Option<Arc<FieldKey>>,
}

impl<S: DocumentStore> ClinicService<S> {
    /// Fails if the configuration declares encrypted data but no key is given.
    pub fn new(store: S, config: ClinicConfig, key: Option<FieldKey>) -> Result<Self, ClinicError> {
        config.validate(key.is_some())?;
        Ok(Self {
            store,
            config,
            key: key.map(Arc::new),
        })
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decrypt(&self, records: Vec<RawRecord>, collection: &CollectionConfig) -> Vec<DecryptedRecord> {
        decrypt_all(records, &collection.decryption, self.key.as_deref())
    }

    /// Counts and the weekday chart.
    pub async fn dashboard(&self) -> Result<DashboardData, ClinicError> {
        let (appointments, prescriptions) = fetch_pair(
            &self.store,
            &self.config.appointments.name,
            &self.config.prescriptions.name,
        )
        .await?;

        let prescriptions = self.decrypt(prescriptions, &self.config.prescriptions);
        let source = &self.config.date_source;
        let histogram = match self.config.observer_zone() {
            ObserverZone::Local => {
                aggregate_by_weekday(&prescriptions, &source.extractor(self.key.clone(), Local))
            }
            ObserverZone::Fixed(offset) => {
                aggregate_by_weekday(&prescriptions, &source.extractor(self.key.clone(), offset))
            }
        };

        tracing::info!(
            appointments = appointments.len(),
            prescriptions = prescriptions.len(),
            skipped = histogram.skipped,
            "Dashboard computed"
        );

        Ok(DashboardData {
            patient_count: appointments.len(),
            prescription_count: prescriptions.len(),
            weekly: histogram.buckets(),
            skipped: histogram.skipped,
        })
    }

    /// Prescriptions matching `query` that belong to a known appointment.
    pub async fn prescription_list(&self, query: &str) -> Result<PrescriptionList, ClinicError> {
        let (appointments, prescriptions) = fetch_pair(
            &self.store,
            &self.config.appointments.name,
            &self.config.prescriptions.name,
        )
        .await?;

        let appointments = self.decrypt(appointments, &self.config.appointments);
        let prescriptions = self.decrypt(prescriptions, &self.config.prescriptions);
        let bindings = &self.config.bindings;
        let records = filter_prescriptions(&prescriptions, &appointments, query, bindings);

        tracing::debug!(
            total = prescriptions.len(),
            matched = records.len(),
            "Prescription list filtered"
        );

        Ok(PrescriptionList {
            query: query.to_string(),
            rows: records
                .iter()
                .map(|r| PrescriptionRow::from_record(r, bindings))
                .collect(),
            records,
        })
    }

    pub async fn appointments(&self) -> Result<Vec<AppointmentRow>, ClinicError> {
        let raw = fetch_collection(&self.store, &self.config.appointments.name).await?;
        let key = &self.config.bindings.appointment_key;
        Ok(self
            .decrypt(raw, &self.config.appointments)
            .into_iter()
            .map(|r| AppointmentRow::from_record(r, key))
            .collect())
    }

    /// A single prescription from the detail collection, `None` if absent.
    pub async fn prescription_detail(&self, id: &str) -> Result<Option<PrescriptionDetail>, ClinicError> {
        let detail = &self.config.prescription_detail;
        let Some(raw) = fetch_document(&self.store, &detail.name, id).await? else {
            return Ok(None);
        };
        let record = detail.decryption.apply(raw, self.key.as_deref());
        Ok(Some(PrescriptionDetail::from_record(&record, &self.config.bindings)))
    }
}
