//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`. Every response carries
//! `Cache-Control: no-store` since bodies contain patient data.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::ApiContext;
use crate::service::ClinicService;
use crate::store::DocumentStore;

/// Build the API router over a shared service.
pub fn api_router<S: DocumentStore + 'static>(service: Arc<ClinicService<S>>) -> Router {
    build_router(ApiContext::new(service))
}

fn build_router<S: DocumentStore + 'static>(ctx: ApiContext<S>) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/dashboard", get(endpoints::dashboard::show::<S>))
        .route("/appointments", get(endpoints::appointments::list::<S>))
        .route("/prescriptions", get(endpoints::prescriptions::list::<S>))
        .route("/prescriptions/:id", get(endpoints::prescriptions::detail::<S>))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}
