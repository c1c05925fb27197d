//! Fetch → Decrypt → Query.
//!
//! Each stage is a plain function over record snapshots; nothing here holds
//! state between calls.

pub mod aggregate;
pub mod decrypt;
pub mod fetch;
pub mod search;

pub use aggregate::{aggregate_by_weekday, weekday_name, DateExtractor, WeekdayBucket, WeekdayHistogram};
pub use decrypt::{decrypt_all, decrypt_fields, DecryptionPolicy};
pub use fetch::{fetch_collection, fetch_document, fetch_pair};
pub use search::{filter_prescriptions, join_filter, search};
