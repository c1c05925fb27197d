use std::collections::BTreeMap;

use serde::Serialize;

use super::record::{DecryptedField, DecryptedRecord, DisplayField};

/// An appointment as listed, keyed by its business number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentRow {
    pub id: String,
    pub appointment_number: DisplayField,
    pub fields: BTreeMap<String, DecryptedField>,
}

impl AppointmentRow {
    pub fn from_record(record: DecryptedRecord, appointment_key: &str) -> Self {
        Self {
            appointment_number: DisplayField::of(&record, appointment_key),
            id: record.id,
            fields: record.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;

    #[test]
    fn row_carries_key_and_fields() {
        let record = DecryptedRecord::passthrough(
            RawRecord::new("ap-1")
                .with_field("appointmentNumber", 1042i64)
                .with_field("doctor", "Dr. Silva"),
        );
        let row = AppointmentRow::from_record(record, "appointmentNumber");

        assert_eq!(row.id, "ap-1");
        assert_eq!(row.appointment_number.as_text(), Some("1042"));
        assert_eq!(row.fields.len(), 2);
    }
}
