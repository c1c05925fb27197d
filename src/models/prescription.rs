use std::fmt;

use serde::Serialize;

use super::record::{DecryptedRecord, DisplayField, FieldValue};
use crate::config::FieldBindings;

/// One line of the medicine table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Medicine {
    pub name: String,
    pub dosage: String,
    pub duration: String,
}

impl Medicine {
    fn from_value(value: &FieldValue) -> Option<Self> {
        let FieldValue::Map(map) = value else {
            return None;
        };
        let text = |key: &str| map.get(key).and_then(FieldValue::text).unwrap_or_default();
        Some(Self {
            name: text("name"),
            dosage: text("dosage"),
            duration: text("duration"),
        })
    }
}

/// Row of the prescription list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrescriptionRow {
    pub id: String,
    pub appointment_no: DisplayField,
    pub patient_name: DisplayField,
    pub email: DisplayField,
}

impl PrescriptionRow {
    pub fn from_record(record: &DecryptedRecord, bindings: &FieldBindings) -> Self {
        Self {
            id: record.id.clone(),
            appointment_no: DisplayField::of(record, &bindings.prescription_key),
            patient_name: DisplayField::of(record, &bindings.patient_field),
            email: DisplayField::of(record, &bindings.email_field),
        }
    }
}

/// Everything the prescription card shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrescriptionDetail {
    pub id: String,
    pub doctor_name: DisplayField,
    pub doctor_qualifications: DisplayField,
    pub doctor_reg_no: DisplayField,
    pub doctor_mobile: DisplayField,
    pub clinic_name: DisplayField,
    pub patient_id: DisplayField,
    pub patient_name: DisplayField,
    pub patient_address: DisplayField,
    pub temperature: DisplayField,
    pub blood_pressure: DisplayField,
    pub reference_no: DisplayField,
    pub date: DisplayField,
    pub medicines: Vec<Medicine>,
    pub advice: DisplayField,
    pub follow_up_date: DisplayField,
}

impl PrescriptionDetail {
    /// Project a decrypted prescription document. Non-map medicine entries
    /// are dropped; an unreadable medicines field yields an empty table.
    pub fn from_record(record: &DecryptedRecord, bindings: &FieldBindings) -> Self {
        let field = |name: &str| DisplayField::of(record, name);
        let medicines = match record.value("medicines") {
            Some(FieldValue::Array(items)) => items.iter().filter_map(Medicine::from_value).collect(),
            _ => Vec::new(),
        };

        Self {
            id: record.id.clone(),
            doctor_name: field("doctorName"),
            doctor_qualifications: field("doctorQualifications"),
            doctor_reg_no: field("doctorRegNo"),
            doctor_mobile: field("doctorMobile"),
            clinic_name: field("clinicName"),
            patient_id: field("patientId"),
            patient_name: field(bindings.patient_field.as_str()),
            patient_address: field("patientAddress"),
            temperature: field("temperature"),
            blood_pressure: field("bloodPressure"),
            reference_no: field("referenceNo"),
            date: field("date"),
            medicines,
            advice: field("advice"),
            follow_up_date: field("followUpDate"),
        }
    }
}

// ── Card rendering ─────────────────────────────────────────────────────────

const RULE: &str = "----------------------------------------";

impl fmt::Display for PrescriptionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.doctor_name)?;
        writeln!(f, "{} | Reg. No: {}", self.doctor_qualifications, self.doctor_reg_no)?;
        writeln!(f, "Mob. No: {}", self.doctor_mobile)?;
        writeln!(f, "{}", self.clinic_name)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "ID: {} - {}", self.patient_id, self.patient_name)?;
        writeln!(f, "Address: {}", self.patient_address)?;
        writeln!(f, "Temp (°C): {}, BP: {}", self.temperature, self.blood_pressure)?;
        writeln!(f, "Reference No: {}", self.reference_no)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:<24} {:<12} {}", "Medicine", "Dosage", "Duration")?;
        for med in &self.medicines {
            writeln!(f, "{:<24} {:<12} {}", med.name, med.dosage, med.duration)?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "Advice: {}", self.advice)?;
        writeln!(f, "Follow Up: {}", self.follow_up_date)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{}", self.doctor_name)?;
        write!(f, "{}", self.doctor_qualifications)
    }
}
