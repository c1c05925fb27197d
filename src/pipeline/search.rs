//! Filter / join stage over decrypted records.
//!
//! Both operations are full recomputations over the in-memory set and keep
//! the input order.

use std::collections::HashSet;

use crate::config::FieldBindings;
use crate::models::DecryptedRecord;

/// Case-insensitive substring search across `fields`.
///
/// A record matches when any designated field contains the lower-cased
/// query. Absent, undecryptable and non-textual fields read as `""`.
pub fn search<S: AsRef<str>>(
    records: &[DecryptedRecord],
    query: &str,
    fields: &[S],
) -> Vec<DecryptedRecord> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|record| matches_query(record, &needle, fields))
        .cloned()
        .collect()
}

fn matches_query<S: AsRef<str>>(record: &DecryptedRecord, needle: &str, fields: &[S]) -> bool {
    fields.iter().any(|field| {
        record
            .text(field.as_ref())
            .unwrap_or_default()
            .to_lowercase()
            .contains(needle)
    })
}

/// Inner join by business key: keep prescriptions whose `prescription_key`
/// exactly equals some appointment's `appointment_key`. Only string keys
/// take part; a numeric key never matches its decimal spelling.
pub fn join_filter(
    prescriptions: &[DecryptedRecord],
    appointments: &[DecryptedRecord],
    prescription_key: &str,
    appointment_key: &str,
) -> Vec<DecryptedRecord> {
    let known: HashSet<&str> = appointments
        .iter()
        .filter_map(|a| a.str_field(appointment_key))
        .collect();

    prescriptions
        .iter()
        .filter(|p| {
            p.str_field(prescription_key)
                .is_some_and(|key| known.contains(key))
        })
        .cloned()
        .collect()
}

/// The prescription list: free-text search, then only prescriptions whose
/// business key matches a known appointment.
pub fn filter_prescriptions(
    prescriptions: &[DecryptedRecord],
    appointments: &[DecryptedRecord],
    query: &str,
    bindings: &FieldBindings,
) -> Vec<DecryptedRecord> {
    let searched = search(prescriptions, query, &bindings.search_fields);
    join_filter(
        &searched,
        appointments,
        &bindings.prescription_key,
        &bindings.appointment_key,
    )
}
