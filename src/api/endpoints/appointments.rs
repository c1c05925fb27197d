//! Appointment endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::ApiContext;
use crate::models::AppointmentRow;
use crate::store::DocumentStore;

#[derive(Serialize)]
pub struct AppointmentsResponse {
    pub appointments: Vec<AppointmentRow>,
}

/// `GET /api/appointments`: list appointments.
pub async fn list<S: DocumentStore + 'static>(
    State(ctx): State<ApiContext<S>>,
) -> Result<Json<AppointmentsResponse>, ApiError> {
    let appointments = ctx.service.appointments().await?;
    Ok(Json(AppointmentsResponse { appointments }))
}
