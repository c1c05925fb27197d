pub mod appointment;
pub mod prescription;
pub mod record;

pub use appointment::*;
pub use prescription::*;
pub use record::*;
