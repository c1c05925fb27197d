//! Dashboard endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::ApiContext;
use crate::service::DashboardData;
use crate::store::DocumentStore;

/// `GET /api/dashboard`: patient and prescription counts plus the weekday chart.
pub async fn show<S: DocumentStore + 'static>(
    State(ctx): State<ApiContext<S>>,
) -> Result<Json<DashboardData>, ApiError> {
    let data = ctx.service.dashboard().await?;
    Ok(Json(data))
}
