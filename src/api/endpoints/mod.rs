//! API endpoint handlers.
//!
//! Each module corresponds to one view of the clinic front-end. Handlers are
//! generic over the document store so tests can mount an in-memory one.

pub mod appointments;
pub mod dashboard;
pub mod health;
pub mod prescriptions;
