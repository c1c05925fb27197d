//! HTTP JSON surface for the clinic views.
//!
//! Routes are nested under `/api/` and read-only. `api_router()` returns a
//! composable `Router`; `server` binds it and handles shutdown.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;

use std::sync::Arc;

use crate::service::ClinicService;

pub use router::api_router;
pub use server::{serve, ApiServer};

/// Shared state for all API routes.
pub struct ApiContext<S> {
    pub service: Arc<ClinicService<S>>,
}

impl<S> ApiContext<S> {
    pub fn new(service: Arc<ClinicService<S>>) -> Self {
        Self { service }
    }
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for ApiContext<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
