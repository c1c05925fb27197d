use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Store-native timestamp: seconds since the Unix epoch plus nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl StoreTimestamp {
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

impl From<DateTime<Utc>> for StoreTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }
}

/// A schemaless document value as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(StoreTimestamp),
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used for matching and display: strings as-is, numbers
    /// rendered, everything else has no text form.
    pub fn text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Double(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Convert a JSON value. Objects shaped exactly like a store timestamp
    /// (`seconds` plus optional `nanos`/`nanoseconds`) become timestamps.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(map) => {
                if let Some(ts) = timestamp_shape(&map) {
                    return FieldValue::Timestamp(ts);
                }
                FieldValue::Map(
                    map.into_iter()
                        .map(|(k, v)| (k, FieldValue::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

fn timestamp_shape(map: &serde_json::Map<String, serde_json::Value>) -> Option<StoreTimestamp> {
    let seconds = map.get("seconds")?.as_i64()?;
    let nanos_key = ["nanos", "nanoseconds"]
        .into_iter()
        .find(|k| map.contains_key(*k));
    let expected_len = if nanos_key.is_some() { 2 } else { 1 };
    if map.len() != expected_len {
        return None;
    }
    let nanos = match nanos_key {
        Some(k) => u32::try_from(map.get(k)?.as_u64()?).ok()?,
        None => 0,
    };
    Some(StoreTimestamp { seconds, nanos })
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(FieldValue::from_json)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<StoreTimestamp> for FieldValue {
    fn from(ts: StoreTimestamp) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// A document as fetched: store-assigned opaque id plus its field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// One field after the decrypt stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DecryptedField {
    /// Passed through untouched, or successfully decrypted to a string.
    Value(FieldValue),
    /// Declared as ciphertext but could not be decrypted.
    Failed,
}

impl DecryptedField {
    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            DecryptedField::Value(v) => Some(v),
            DecryptedField::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DecryptedField::Failed)
    }
}

impl Serialize for DecryptedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DecryptedField::Value(v) => v.serialize(serializer),
            DecryptedField::Failed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("decryption_failed", &true)?;
                map.end()
            }
        }
    }
}

/// A record whose declared ciphertext fields have been resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecryptedRecord {
    pub id: String,
    pub fields: BTreeMap<String, DecryptedField>,
}

impl DecryptedRecord {
    /// Lift a raw record with every field passed through.
    pub fn passthrough(raw: RawRecord) -> Self {
        Self {
            id: raw.id,
            fields: raw
                .fields
                .into_iter()
                .map(|(k, v)| (k, DecryptedField::Value(v)))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&DecryptedField> {
        self.fields.get(name)
    }

    /// The value of a field, `None` when absent or undecryptable.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(DecryptedField::value)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(FieldValue::as_str)
    }

    /// Text form of a field, `None` when absent, undecryptable or non-textual.
    pub fn text(&self, name: &str) -> Option<String> {
        self.value(name).and_then(FieldValue::text)
    }

    pub fn is_failed(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(DecryptedField::is_failed)
    }
}

/// A field as a view shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayField {
    Text(String),
    Missing,
    Failed,
}

impl DisplayField {
    /// Read `name` from a decrypted record. Timestamps render as UTC
    /// `YYYY-MM-DD HH:MM`; maps, arrays and nulls have no display form.
    pub fn of(record: &DecryptedRecord, name: &str) -> Self {
        match record.field(name) {
            None => DisplayField::Missing,
            Some(DecryptedField::Failed) => DisplayField::Failed,
            Some(DecryptedField::Value(FieldValue::Timestamp(ts))) => ts
                .to_utc()
                .map(|dt| DisplayField::Text(dt.format("%Y-%m-%d %H:%M").to_string()))
                .unwrap_or(DisplayField::Missing),
            Some(DecryptedField::Value(v)) => v.text().map_or(DisplayField::Missing, DisplayField::Text),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DisplayField::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl std::fmt::Display for DisplayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayField::Text(t) => f.write_str(t),
            DisplayField::Missing => Ok(()),
            DisplayField::Failed => f.write_str("[unreadable]"),
        }
    }
}

impl Serialize for DisplayField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DisplayField::Text(t) => serializer.serialize_str(t),
            DisplayField::Missing => serializer.serialize_none(),
            DisplayField::Failed => DecryptedField::Failed.serialize(serializer),
        }
    }
}
