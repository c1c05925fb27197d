//! API server lifecycle: bind → spawn background task → return handle with
//! shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::service::ClinicService;
use crate::store::DocumentStore;

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Ask the server to stop accepting connections.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait until the server task has finished.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!("API server task failed: {e}");
        }
    }
}

/// Bind `addr` and serve the API in a background task.
pub async fn serve<S: DocumentStore + 'static>(
    service: Arc<ClinicService<S>>,
    addr: SocketAddr,
) -> Result<ApiServer, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = api_router(service);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClinicConfig;
    use crate::models::RawRecord;
    use crate::store::MemoryStore;

    fn service() -> Arc<ClinicService<MemoryStore>> {
        let store = MemoryStore::new().with_documents(
            "Appointments",
            vec![RawRecord::new("ap-1").with_field("appointmentNumber", "A-100")],
        );
        Arc::new(ClinicService::new(store, ClinicConfig::default(), None).unwrap())
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let mut server = serve(service(), "127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(server.addr.port() > 0);

        let url = format!("http://{}/api/appointments", server.addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert!(resp.status().is_success());
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["appointments"].as_array().unwrap().len(), 1);

        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_an_error() {
        let server = serve(service(), "127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(serve(service(), server.addr).await.is_err());
    }
}
