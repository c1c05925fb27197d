use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, FieldKey};
use crate::pipeline::aggregate::{
    ConfiguredExtractor, DateStringDate, EncryptedDateString, TimestampDate,
};
use crate::pipeline::decrypt::DecryptionPolicy;
use crate::store::firestore::FirestoreConfig;

/// Application-level constants
pub const APP_NAME: &str = "ClinicRecords";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "clinic_records=info,tower_http=info"
}

/// Get the application data directory
/// ~/ClinicRecords/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Default location of the local SQLite document store
pub fn default_sqlite_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("records.db"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("Cannot load config file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("{0} needs a field key but none is configured")]
    MissingKey(String),

    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),

    #[error("Field key error: {0}")]
    Key(#[from] CryptoError),
}

// ── Clinic configuration ────────────────────────────────────────────────────

/// A named collection and which of its fields are ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub decryption: DecryptionPolicy,
}

impl CollectionConfig {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decryption: DecryptionPolicy::None,
        }
    }

    pub fn encrypted<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            decryption: DecryptionPolicy::fields(fields),
        }
    }
}

/// Field names the queries read. The two record layouts in use disagree on
/// these, so none of them is fixed in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBindings {
    /// Business key on appointments.
    pub appointment_key: String,
    /// Business key on prescriptions, matched against `appointment_key`.
    pub prescription_key: String,
    pub patient_field: String,
    pub email_field: String,
    pub search_fields: Vec<String>,
}

/// Where a prescription's date comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateSource {
    Timestamp { field: String },
    PlainString { field: String },
    EncryptedString { field: String },
}

impl DateSource {
    pub fn field(&self) -> &str {
        match self {
            DateSource::Timestamp { field }
            | DateSource::PlainString { field }
            | DateSource::EncryptedString { field } => field,
        }
    }

    pub fn requires_key(&self) -> bool {
        matches!(self, DateSource::EncryptedString { .. })
    }

    /// Build the extractor for this source. An encrypted source without a
    /// key skips every record.
    pub fn extractor<Tz: TimeZone>(
        &self,
        key: Option<Arc<FieldKey>>,
        tz: Tz,
    ) -> ConfiguredExtractor<Tz> {
        match (self, key) {
            (DateSource::Timestamp { field }, _) => {
                ConfiguredExtractor::Timestamp(TimestampDate::new(field.as_str(), tz))
            }
            (DateSource::PlainString { field }, _) => {
                ConfiguredExtractor::PlainString(DateStringDate::new(field.as_str(), tz))
            }
            (DateSource::EncryptedString { field }, Some(key)) => {
                ConfiguredExtractor::EncryptedString(EncryptedDateString::new(field.as_str(), key, tz))
            }
            (DateSource::EncryptedString { .. }, None) => ConfiguredExtractor::Unavailable,
        }
    }
}

/// Collections, bindings and date handling for one clinic deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicConfig {
    pub appointments: CollectionConfig,
    /// Collection backing the list view and the dashboard.
    pub prescriptions: CollectionConfig,
    /// Collection backing the detail view.
    pub prescription_detail: CollectionConfig,
    pub bindings: FieldBindings,
    pub date_source: DateSource,
    /// Observer's offset from UTC in minutes. Unset means the host's zone.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for ClinicConfig {
    /// Plaintext layout: `appointmentId`/`patientName` with store timestamps.
    fn default() -> Self {
        Self {
            appointments: CollectionConfig::plain("Appointments"),
            prescriptions: CollectionConfig::plain("prescriptions"),
            prescription_detail: CollectionConfig::plain("Prescriptions"),
            bindings: FieldBindings {
                appointment_key: "appointmentNumber".into(),
                prescription_key: "appointmentId".into(),
                patient_field: "patientName".into(),
                email_field: "email".into(),
                search_fields: vec![
                    "patientName".into(),
                    "email".into(),
                    "appointmentId".into(),
                ],
            },
            date_source: DateSource::Timestamp {
                field: "prescriptionDate".into(),
            },
            utc_offset_minutes: None,
        }
    }
}

impl ClinicConfig {
    /// Encrypted layout: `appointmentNo`/`patient`, ciphertext patient fields
    /// and an encrypted date string.
    pub fn encrypted() -> Self {
        Self {
            appointments: CollectionConfig::plain("Appointments"),
            prescriptions: CollectionConfig::encrypted("prescriptions", ["patient", "email"]),
            prescription_detail: CollectionConfig::encrypted(
                "Prescriptions",
                ["patient", "email", "patientAddress", "date"],
            ),
            bindings: FieldBindings {
                appointment_key: "appointmentNumber".into(),
                prescription_key: "appointmentNo".into(),
                patient_field: "patient".into(),
                email_field: "email".into(),
                search_fields: vec!["patient".into(), "email".into(), "appointmentNo".into()],
            },
            date_source: DateSource::EncryptedString {
                field: "date".into(),
            },
            utc_offset_minutes: None,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Reject configurations that would mark every protected field failed.
    pub fn validate(&self, has_key: bool) -> Result<(), ConfigError> {
        if !has_key {
            for collection in [&self.appointments, &self.prescriptions, &self.prescription_detail] {
                if collection.decryption.requires_key() {
                    return Err(ConfigError::MissingKey(format!(
                        "Collection '{}'",
                        collection.name
                    )));
                }
            }
            if self.date_source.requires_key() {
                return Err(ConfigError::MissingKey(format!(
                    "Date field '{}'",
                    self.date_source.field()
                )));
            }
        }
        if let Some(minutes) = self.utc_offset_minutes {
            offset_from_minutes(minutes)?;
        }
        Ok(())
    }

    /// Zone in which dates are bucketed into weekdays.
    pub fn observer_zone(&self) -> ObserverZone {
        match self.utc_offset_minutes {
            Some(minutes) => ObserverZone::Fixed(offset_from_minutes(minutes).unwrap_or_else(|_| Utc.fix())),
            None => ObserverZone::Local,
        }
    }
}

/// The observer's calendar. `Local` resolves the host's offset per instant,
/// so daylight-saving changes apply to each date on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverZone {
    Local,
    Fixed(FixedOffset),
}

fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ConfigError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(ConfigError::InvalidOffset(minutes))
}

// ── Runtime settings ────────────────────────────────────────────────────────

/// Which document store backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Sqlite { path: PathBuf },
    Firestore(FirestoreConfig),
}

/// How the field key is supplied. Secrets are never printed.
pub enum KeySource {
    None,
    Base64(Zeroizing<String>),
    Passphrase {
        passphrase: Zeroizing<String>,
        salt: String,
    },
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::None => write!(f, "KeySource::None"),
            KeySource::Base64(_) => write!(f, "KeySource::Base64(..)"),
            KeySource::Passphrase { .. } => write!(f, "KeySource::Passphrase(..)"),
        }
    }
}

/// Process settings read from the environment.
#[derive(Debug)]
pub struct Settings {
    pub store: StoreSettings,
    pub key_source: KeySource,
    pub config_path: Option<PathBuf>,
    pub bind: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store = match get("CLINIC_STORE").as_deref().unwrap_or("sqlite") {
            "sqlite" => StoreSettings::Sqlite {
                path: match get("CLINIC_SQLITE_PATH") {
                    Some(path) => PathBuf::from(path),
                    None => default_sqlite_path()?,
                },
            },
            "firestore" => {
                let project = get("CLINIC_FIRESTORE_PROJECT")
                    .ok_or(ConfigError::MissingVar("CLINIC_FIRESTORE_PROJECT"))?;
                let mut firestore = FirestoreConfig::new(project);
                if let Some(database) = get("CLINIC_FIRESTORE_DATABASE") {
                    firestore.database = database;
                }
                if let Some(base_url) = get("CLINIC_FIRESTORE_URL") {
                    firestore.base_url = base_url;
                }
                firestore.api_key = get("CLINIC_FIRESTORE_API_KEY");
                StoreSettings::Firestore(firestore)
            }
            other => {
                return Err(ConfigError::InvalidVar {
                    var: "CLINIC_STORE",
                    reason: format!("expected 'sqlite' or 'firestore', got '{other}'"),
                })
            }
        };

        let key_source = match (
            get("CLINIC_FIELD_KEY"),
            get("CLINIC_FIELD_PASSPHRASE"),
            get("CLINIC_FIELD_SALT"),
        ) {
            (Some(key), _, _) => KeySource::Base64(Zeroizing::new(key)),
            (None, Some(passphrase), Some(salt)) => KeySource::Passphrase {
                passphrase: Zeroizing::new(passphrase),
                salt,
            },
            (None, Some(_), None) => return Err(ConfigError::MissingVar("CLINIC_FIELD_SALT")),
            (None, None, _) => KeySource::None,
        };

        let bind_text = get("CLINIC_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_text.parse().map_err(|e| ConfigError::InvalidVar {
            var: "CLINIC_BIND",
            reason: format!("{bind_text}: {e}"),
        })?;

        Ok(Self {
            store,
            key_source,
            config_path: get("CLINIC_CONFIG").map(PathBuf::from),
            bind,
        })
    }

    /// Load the field key once. Passphrase keys go through PBKDF2.
    pub fn load_field_key(&self) -> Result<Option<FieldKey>, ConfigError> {
        match &self.key_source {
            KeySource::None => Ok(None),
            KeySource::Base64(encoded) => Ok(Some(FieldKey::from_base64(encoded)?)),
            KeySource::Passphrase { passphrase, salt } => {
                let salt = STANDARD.decode(salt.trim()).map_err(|e| ConfigError::InvalidVar {
                    var: "CLINIC_FIELD_SALT",
                    reason: e.to_string(),
                })?;
                Ok(Some(FieldKey::derive(passphrase, &salt)))
            }
        }
    }

    pub fn load_clinic_config(&self) -> Result<ClinicConfig, ConfigError> {
        match &self.config_path {
            Some(path) => ClinicConfig::from_json_file(path),
            None => Ok(ClinicConfig::default()),
        }
    }
}
