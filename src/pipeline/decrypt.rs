//! Decrypt stage: resolves declared ciphertext fields of a raw record.
//!
//! Failure is per field. A field that cannot be decrypted becomes
//! `DecryptedField::Failed`; the rest of the record is kept as fetched.

use serde::{Deserialize, Serialize};

use crate::crypto::FieldKey;
use crate::models::{DecryptedField, DecryptedRecord, FieldValue, RawRecord};

/// Which fields of a collection hold ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecryptionPolicy {
    /// Every field is stored in the clear.
    #[default]
    None,
    /// The named fields are base64 AES-GCM envelopes.
    Fields { fields: Vec<String> },
}

impl DecryptionPolicy {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DecryptionPolicy::Fields {
            fields: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn requires_key(&self) -> bool {
        matches!(self, DecryptionPolicy::Fields { fields } if !fields.is_empty())
    }

    /// Apply the policy. Without a key every declared field that is present
    /// is marked failed.
    pub fn apply(&self, record: RawRecord, key: Option<&FieldKey>) -> DecryptedRecord {
        match self {
            DecryptionPolicy::None => DecryptedRecord::passthrough(record),
            DecryptionPolicy::Fields { fields } => match key {
                Some(key) => decrypt_fields(record, fields, key),
                None => mark_failed(record, fields),
            },
        }
    }
}

/// Replace each named field present in `record` with its plaintext, or with
/// the failure marker. Fields not named are passed through unchanged.
pub fn decrypt_fields<S: AsRef<str>>(
    record: RawRecord,
    field_names: &[S],
    key: &FieldKey,
) -> DecryptedRecord {
    let mut out = DecryptedRecord::passthrough(record);
    let mut failed = 0usize;

    for name in field_names {
        let name = name.as_ref();
        let Some(slot) = out.fields.get_mut(name) else {
            continue;
        };
        let resolved = match slot.value() {
            Some(FieldValue::String(envelope)) => match key.decrypt_text(envelope) {
                Ok(plain) => DecryptedField::Value(FieldValue::String(plain)),
                Err(_) => DecryptedField::Failed,
            },
            _ => DecryptedField::Failed,
        };
        if resolved.is_failed() {
            failed += 1;
        }
        *slot = resolved;
    }

    if failed > 0 {
        tracing::warn!(record_id = %out.id, failed, "Fields could not be decrypted");
    }
    out
}

/// Decrypt a whole fetched collection under one policy.
pub fn decrypt_all(
    records: Vec<RawRecord>,
    policy: &DecryptionPolicy,
    key: Option<&FieldKey>,
) -> Vec<DecryptedRecord> {
    records
        .into_iter()
        .map(|record| policy.apply(record, key))
        .collect()
}

fn mark_failed(record: RawRecord, field_names: &[String]) -> DecryptedRecord {
    let mut out = DecryptedRecord::passthrough(record);
    for name in field_names {
        if let Some(slot) = out.fields.get_mut(name) {
            *slot = DecryptedField::Failed;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LENGTH;
    use crate::models::StoreTimestamp;

    fn key() -> FieldKey {
        FieldKey::from_bytes([3u8; KEY_LENGTH])
    }

    fn encrypted_prescription(key: &FieldKey) -> RawRecord {
        RawRecord::new("rx-1")
            .with_field("patient", key.encrypt_text("Kamala Silva").unwrap())
            .with_field("email", key.encrypt_text("kamala@example.com").unwrap())
            .with_field("appointmentNo", "A-100")
            .with_field(
                "prescriptionDate",
                StoreTimestamp { seconds: 1_700_000_000, nanos: 0 },
            )
    }

    #[test]
    fn declared_fields_are_decrypted() {
        let key = key();
        let record = decrypt_fields(encrypted_prescription(&key), &["patient", "email"], &key);
        assert_eq!(record.str_field("patient"), Some("Kamala Silva"));
        assert_eq!(record.str_field("email"), Some("kamala@example.com"));
    }

    #[test]
    fn undeclared_fields_pass_through_unchanged() {
        let key = key();
        let raw = encrypted_prescription(&key);
        let original_date = raw.get("prescriptionDate").cloned();
        let original_email = raw.get("email").cloned();

        let record = decrypt_fields(raw, &["patient"], &key);
        assert_eq!(record.value("prescriptionDate"), original_date.as_ref());
        assert_eq!(record.value("email"), original_email.as_ref());
        assert_eq!(record.str_field("appointmentNo"), Some("A-100"));
    }

    #[test]
    fn wrong_key_marks_field_failed_and_keeps_record() {
        let key = key();
        let other = FieldKey::from_bytes([4u8; KEY_LENGTH]);
        let record = decrypt_fields(encrypted_prescription(&key), &["patient"], &other);

        assert!(record.is_failed("patient"));
        assert_ne!(record.str_field("patient"), Some("Kamala Silva"));
        assert_eq!(record.str_field("appointmentNo"), Some("A-100"));
    }

    #[test]
    fn one_bad_field_does_not_spoil_the_others() {
        let key = key();
        let raw = encrypted_prescription(&key).with_field("email", "plain@example.com");
        let record = decrypt_fields(raw, &["patient", "email"], &key);

        assert_eq!(record.str_field("patient"), Some("Kamala Silva"));
        assert!(record.is_failed("email"));
    }

    #[test]
    fn non_string_ciphertext_field_is_failed() {
        let key = key();
        let raw = RawRecord::new("rx-2").with_field("patient", 12i64);
        let record = decrypt_fields(raw, &["patient"], &key);
        assert!(record.is_failed("patient"));
    }

    #[test]
    fn declared_but_absent_field_stays_absent() {
        let key = key();
        let record = decrypt_fields(RawRecord::new("rx-3"), &["patient"], &key);
        assert!(record.field("patient").is_none());
    }

    #[test]
    fn decryption_is_deterministic_for_same_ciphertext() {
        let key = key();
        let raw = encrypted_prescription(&key);
        let a = decrypt_fields(raw.clone(), &["patient"], &key);
        let b = decrypt_fields(raw, &["patient"], &key);
        assert_eq!(a, b);
    }

    #[test]
    fn none_policy_passes_everything_through() {
        let key = key();
        let raw = encrypted_prescription(&key);
        let record = DecryptionPolicy::None.apply(raw.clone(), Some(&key));
        assert_eq!(record.value("patient"), raw.get("patient"));
    }

    #[test]
    fn fields_policy_without_key_marks_present_fields_failed() {
        let key = key();
        let policy = DecryptionPolicy::fields(["patient", "missing"]);
        let record = policy.apply(encrypted_prescription(&key), None);
        assert!(record.is_failed("patient"));
        assert!(record.field("missing").is_none());
        assert!(policy.requires_key());
        assert!(!DecryptionPolicy::None.requires_key());
    }

    #[test]
    fn policy_deserializes_from_config_json() {
        let policy: DecryptionPolicy =
            serde_json::from_str(r#"{"mode":"fields","fields":["patient","email"]}"#).unwrap();
        assert_eq!(policy, DecryptionPolicy::fields(["patient", "email"]));

        let none: DecryptionPolicy = serde_json::from_str(r#"{"mode":"none"}"#).unwrap();
        assert_eq!(none, DecryptionPolicy::None);
    }
}
