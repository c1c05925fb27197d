//! Aggregation stage: weekday histogram for the dashboard chart.
//!
//! Bucketing is shared; how a record yields its calendar date is a
//! pluggable `DateExtractor`. Records without a usable date are skipped.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::FieldKey;
use crate::models::{DecryptedRecord, FieldValue};

/// Calendar order of the histogram.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Long English weekday name ("Monday" .. "Sunday").
pub fn weekday_name(date: NaiveDate) -> &'static str {
    weekday_label(date.weekday())
}

pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// One chart bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayBucket {
    pub weekday: String,
    pub count: u32,
}

/// Seven buckets, Monday first, always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdayHistogram {
    counts: [u32; 7],
    /// Records that had no usable date.
    pub skipped: usize,
}

impl WeekdayHistogram {
    pub fn empty() -> Self {
        Self {
            counts: [0; 7],
            skipped: 0,
        }
    }

    pub fn record(&mut self, date: NaiveDate) {
        let idx = date.weekday().num_days_from_monday() as usize;
        self.counts[idx] += 1;
    }

    pub fn count(&self, day: Weekday) -> u32 {
        self.counts[day.num_days_from_monday() as usize]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn buckets(&self) -> Vec<WeekdayBucket> {
        WEEKDAYS
            .iter()
            .map(|day| WeekdayBucket {
                weekday: weekday_label(*day).to_string(),
                count: self.count(*day),
            })
            .collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("Date field is missing")]
    Missing,

    #[error("Date field could not be decrypted")]
    Undecryptable,

    /// Carries a shape description only, never the field's contents.
    #[error("Malformed date: {0}")]
    Unparsable(String),
}

/// Strategy turning a record into the calendar date it is bucketed under.
pub trait DateExtractor {
    fn extract(&self, record: &DecryptedRecord) -> Result<NaiveDate, DateError>;
}

/// Count records per weekday. Extraction failures are skipped, never fatal.
pub fn aggregate_by_weekday<E: DateExtractor + ?Sized>(
    records: &[DecryptedRecord],
    extractor: &E,
) -> WeekdayHistogram {
    let mut histogram = WeekdayHistogram::empty();
    for record in records {
        match extractor.extract(record) {
            Ok(date) => histogram.record(date),
            Err(e) => {
                tracing::debug!(record_id = %record.id, error = %e, "Skipping record in weekday aggregation");
                histogram.skipped += 1;
            }
        }
    }
    histogram
}

// ── Extractors ──────────────────────────────────────────────────────────────

/// Reads a store-native timestamp and takes its date in the observer's zone.
pub struct TimestampDate<Tz: TimeZone> {
    pub field: String,
    pub tz: Tz,
}

impl<Tz: TimeZone> TimestampDate<Tz> {
    pub fn new(field: impl Into<String>, tz: Tz) -> Self {
        Self { field: field.into(), tz }
    }
}

impl<Tz: TimeZone> DateExtractor for TimestampDate<Tz> {
    fn extract(&self, record: &DecryptedRecord) -> Result<NaiveDate, DateError> {
        let field = record.field(&self.field).ok_or(DateError::Missing)?;
        match field.value() {
            None => Err(DateError::Undecryptable),
            Some(FieldValue::Timestamp(ts)) => ts
                .to_utc()
                .map(|utc| utc.with_timezone(&self.tz).date_naive())
                .ok_or_else(|| DateError::Unparsable("timestamp out of range".into())),
            Some(FieldValue::Null) => Err(DateError::Missing),
            Some(other) => Err(DateError::Unparsable(format!("expected timestamp, found {}", kind(other)))),
        }
    }
}

/// Reads a plaintext date string.
pub struct DateStringDate<Tz: TimeZone> {
    pub field: String,
    pub tz: Tz,
}

impl<Tz: TimeZone> DateStringDate<Tz> {
    pub fn new(field: impl Into<String>, tz: Tz) -> Self {
        Self { field: field.into(), tz }
    }
}

impl<Tz: TimeZone> DateExtractor for DateStringDate<Tz> {
    fn extract(&self, record: &DecryptedRecord) -> Result<NaiveDate, DateError> {
        let field = record.field(&self.field).ok_or(DateError::Missing)?;
        match field.value() {
            None => Err(DateError::Undecryptable),
            Some(FieldValue::String(text)) => parse_date_text(text, &self.tz),
            Some(FieldValue::Null) => Err(DateError::Missing),
            Some(other) => Err(DateError::Unparsable(format!("expected date string, found {}", kind(other)))),
        }
    }
}

/// Decrypts a ciphertext date string with the shared key, then parses it.
pub struct EncryptedDateString<Tz: TimeZone> {
    pub field: String,
    pub key: Arc<FieldKey>,
    pub tz: Tz,
}

impl<Tz: TimeZone> EncryptedDateString<Tz> {
    pub fn new(field: impl Into<String>, key: Arc<FieldKey>, tz: Tz) -> Self {
        Self { field: field.into(), key, tz }
    }
}

impl<Tz: TimeZone> DateExtractor for EncryptedDateString<Tz> {
    fn extract(&self, record: &DecryptedRecord) -> Result<NaiveDate, DateError> {
        let field = record.field(&self.field).ok_or(DateError::Missing)?;
        match field.value() {
            Some(FieldValue::String(envelope)) => {
                let plain = self
                    .key
                    .decrypt_text(envelope)
                    .map_err(|_| DateError::Undecryptable)?;
                parse_date_text(&plain, &self.tz)
            }
            Some(FieldValue::Null) => Err(DateError::Missing),
            _ => Err(DateError::Undecryptable),
        }
    }
}

/// Extractor chosen at runtime from configuration.
pub enum ConfiguredExtractor<Tz: TimeZone> {
    Timestamp(TimestampDate<Tz>),
    PlainString(DateStringDate<Tz>),
    EncryptedString(EncryptedDateString<Tz>),
    /// Encrypted date source configured without a key: every date is undecryptable.
    Unavailable,
}

impl<Tz: TimeZone> DateExtractor for ConfiguredExtractor<Tz> {
    fn extract(&self, record: &DecryptedRecord) -> Result<NaiveDate, DateError> {
        match self {
            ConfiguredExtractor::Timestamp(e) => e.extract(record),
            ConfiguredExtractor::PlainString(e) => e.extract(record),
            ConfiguredExtractor::EncryptedString(e) => e.extract(record),
            ConfiguredExtractor::Unavailable => Err(DateError::Undecryptable),
        }
    }
}

// ── Date parsing ────────────────────────────────────────────────────────────

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y"];

/// Parse a date string into the calendar date seen in `tz`.
///
/// Zoned inputs (RFC 3339, RFC 2822) are converted into `tz`; naive date-times
/// and bare dates are taken as already local.
pub fn parse_date_text<Tz: TimeZone>(text: &str, tz: &Tz) -> Result<NaiveDate, DateError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DateError::Missing);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(tz).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(tz).date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Ok(d);
        }
    }
    Err(DateError::Unparsable(format!(
        "no known format for {} characters of text",
        text.chars().count()
    )))
}

fn kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Null => "null",
        FieldValue::Bool(_) => "bool",
        FieldValue::Integer(_) => "integer",
        FieldValue::Double(_) => "double",
        FieldValue::String(_) => "string",
        FieldValue::Timestamp(_) => "timestamp",
        FieldValue::Array(_) => "array",
        FieldValue::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LENGTH;
    use crate::models::{DecryptedField, RawRecord, StoreTimestamp};
    use chrono::{FixedOffset, Utc};

    fn at(date: &str) -> StoreTimestamp {
        let dt = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        StoreTimestamp::from(dt)
    }

    fn timestamped(id: &str, date: &str) -> DecryptedRecord {
        DecryptedRecord::passthrough(RawRecord::new(id).with_field("prescriptionDate", at(date)))
    }

    // ── Bucketing ──────────────────────────────────────────────────

    #[test]
    fn two_mondays_and_a_wednesday() {
        // 2024-03-04 and 2024-03-11 are Mondays, 2024-03-06 a Wednesday.
        let records = vec![
            timestamped("rx-1", "2024-03-04"),
            timestamped("rx-2", "2024-03-06"),
            timestamped("rx-3", "2024-03-11"),
        ];
        let histogram = aggregate_by_weekday(&records, &TimestampDate::new("prescriptionDate", Utc));

        let expected: Vec<(String, u32)> = [
            ("Monday", 2),
            ("Tuesday", 0),
            ("Wednesday", 1),
            ("Thursday", 0),
            ("Friday", 0),
            ("Saturday", 0),
            ("Sunday", 0),
        ]
        .iter()
        .map(|(d, c)| (d.to_string(), *c))
        .collect();
        let actual: Vec<(String, u32)> = histogram
            .buckets()
            .into_iter()
            .map(|b| (b.weekday, b.count))
            .collect();
        assert_eq!(actual, expected);
        assert_eq!(histogram.skipped, 0);
    }

    #[test]
    fn empty_input_yields_seven_zero_buckets() {
        let histogram = aggregate_by_weekday(&[], &TimestampDate::new("prescriptionDate", Utc));
        let buckets = histogram.buckets();
        assert_eq!(buckets.len(), 7);
        assert!(buckets.iter().all(|b| b.count == 0));
        assert_eq!(buckets[0].weekday, "Monday");
        assert_eq!(buckets[6].weekday, "Sunday");
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let forward = vec![timestamped("a", "2024-03-10"), timestamped("b", "2024-03-05")];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();
        let extractor = TimestampDate::new("prescriptionDate", Utc);
        assert_eq!(
            aggregate_by_weekday(&forward, &extractor).buckets(),
            aggregate_by_weekday(&reversed, &extractor).buckets()
        );
    }

    #[test]
    fn bad_dates_are_skipped_and_total_never_exceeds_input() {
        let mut failed = timestamped("f", "2024-03-04");
        failed.fields.insert("prescriptionDate".into(), DecryptedField::Failed);
        let records = vec![
            timestamped("ok", "2024-03-04"),
            DecryptedRecord::passthrough(RawRecord::new("missing")),
            DecryptedRecord::passthrough(RawRecord::new("string").with_field("prescriptionDate", "soon")),
            failed,
        ];
        let histogram = aggregate_by_weekday(&records, &TimestampDate::new("prescriptionDate", Utc));
        assert_eq!(histogram.total(), 1);
        assert_eq!(histogram.skipped, 3);
        assert!(histogram.total() as usize <= records.len());
    }

    #[test]
    fn timestamp_date_follows_observer_zone() {
        // 2024-03-03T20:00Z is Sunday in UTC but Monday at UTC+05:30.
        let ts = StoreTimestamp { seconds: 1_709_496_000, nanos: 0 };
        let record = DecryptedRecord::passthrough(RawRecord::new("rx").with_field("d", ts));

        let utc = TimestampDate::new("d", Utc).extract(&record).unwrap();
        let colombo = TimestampDate::new("d", FixedOffset::east_opt(5 * 3600 + 1800).unwrap())
            .extract(&record)
            .unwrap();
        assert_eq!(weekday_name(utc), "Sunday");
        assert_eq!(weekday_name(colombo), "Monday");
    }

    // ── Extractor strategies ──────────────────────────────────────

    #[test]
    fn plain_string_extractor_parses_dates() {
        let records = vec![
            DecryptedRecord::passthrough(RawRecord::new("a").with_field("date", "2024-03-06")),
            DecryptedRecord::passthrough(RawRecord::new("b").with_field("date", "2024-03-06T09:15")),
            DecryptedRecord::passthrough(RawRecord::new("c").with_field("date", "not a date")),
        ];
        let histogram = aggregate_by_weekday(&records, &DateStringDate::new("date", Utc));
        assert_eq!(histogram.count(Weekday::Wed), 2);
        assert_eq!(histogram.skipped, 1);
    }

    #[test]
    fn encrypted_string_extractor_decrypts_then_parses() {
        let key = Arc::new(FieldKey::from_bytes([5u8; KEY_LENGTH]));
        let wrong = Arc::new(FieldKey::from_bytes([6u8; KEY_LENGTH]));
        let records = vec![
            DecryptedRecord::passthrough(
                RawRecord::new("a").with_field("date", key.encrypt_text("2024-03-04").unwrap()),
            ),
            DecryptedRecord::passthrough(RawRecord::new("b").with_field("date", "2024-03-04")),
        ];

        let histogram = aggregate_by_weekday(&records, &EncryptedDateString::new("date", key, Utc));
        assert_eq!(histogram.count(Weekday::Mon), 1);
        assert_eq!(histogram.skipped, 1);

        let extractor = EncryptedDateString::new("date", wrong, Utc);
        assert_eq!(extractor.extract(&records[0]), Err(DateError::Undecryptable));
    }

    #[test]
    fn unavailable_extractor_skips_everything() {
        let records = vec![timestamped("a", "2024-03-04")];
        let histogram = aggregate_by_weekday(&records, &ConfiguredExtractor::<Utc>::Unavailable);
        assert_eq!(histogram.total(), 0);
        assert_eq!(histogram.skipped, 1);
    }

    // ── Parsing ────────────────────────────────────────────────────

    #[test]
    fn parse_accepts_common_shapes() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        for text in [
            "2024-03-06",
            "2024-03-06T08:30:00",
            "2024-03-06T08:30:00.250",
            "2024-03-06 08:30:00",
            "2024-03-06T08:30:00Z",
            "Wed, 06 Mar 2024 08:30:00 +0000",
            "03/06/2024",
            "March 6, 2024",
        ] {
            assert_eq!(parse_date_text(text, &Utc), Ok(d), "input {text:?}");
        }
    }

    #[test]
    fn parse_rejects_garbage_and_blank() {
        assert!(matches!(parse_date_text("tomorrow", &Utc), Err(DateError::Unparsable(_))));
        assert_eq!(parse_date_text("   ", &Utc), Err(DateError::Missing));
    }

    #[test]
    fn date_errors_do_not_echo_field_contents() {
        let err = parse_date_text("Nimal Perera", &Utc).unwrap_err();
        assert!(!err.to_string().contains("Nimal"));
        assert_eq!(err, DateError::Unparsable("no known format for 12 characters of text".into()));

        let record = DecryptedRecord::passthrough(RawRecord::new("rx").with_field("d", "Nimal Perera"));
        let err = TimestampDate::new("d", Utc).extract(&record).unwrap_err();
        assert_eq!(err.to_string(), "Malformed date: expected timestamp, found string");
    }

    #[test]
    fn weekday_names_are_long_english() {
        let names: Vec<_> = WEEKDAYS.iter().map(|d| weekday_label(*d)).collect();
        assert_eq!(
            names,
            ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"]
        );
    }
}
