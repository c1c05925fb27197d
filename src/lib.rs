pub mod api;
pub mod config;
pub mod crypto;
pub mod models;
pub mod pipeline;
pub mod refresh;
pub mod service;
pub mod store;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, Settings};
use crate::service::{ClinicError, ClinicService};
use crate::store::{ConfiguredStore, StoreError};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot open document store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Clinic(#[from] ClinicError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Open the configured store, start the API and serve until ctrl-c.
pub async fn run(settings: Settings) -> Result<(), StartupError> {
    tracing::info!("Clinic records starting v{}", config::APP_VERSION);

    let clinic_config = settings.load_clinic_config()?;
    let key = settings.load_field_key()?;
    let store = ConfiguredStore::open(&settings.store)?;
    let service = Arc::new(ClinicService::new(store, clinic_config, key)?);

    let mut server = api::serve(service, settings.bind).await?;
    tracing::info!(addr = %server.addr, "Listening");

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.stopped().await;
    Ok(())
}
