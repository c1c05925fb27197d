//! Prescription endpoints.
//!
//! - `GET /api/prescriptions?q=`: list filtered by search text and joined to appointments
//! - `GET /api/prescriptions/:id`: one prescription card

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::ApiContext;
use crate::models::{PrescriptionDetail, PrescriptionRow};
use crate::store::DocumentStore;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct PrescriptionListResponse {
    pub query: String,
    pub prescriptions: Vec<PrescriptionRow>,
}

/// `GET /api/prescriptions`: search then join.
pub async fn list<S: DocumentStore + 'static>(
    State(ctx): State<ApiContext<S>>,
    Query(params): Query<ListParams>,
) -> Result<Json<PrescriptionListResponse>, ApiError> {
    let list = ctx.service.prescription_list(&params.q).await?;
    Ok(Json(PrescriptionListResponse {
        query: list.query,
        prescriptions: list.rows,
    }))
}

#[derive(Serialize)]
pub struct PrescriptionDetailResponse {
    pub prescription: PrescriptionDetail,
    /// Plain-text rendering of the card.
    pub card: String,
}

/// `GET /api/prescriptions/:id`: prescription card from the detail collection.
pub async fn detail<S: DocumentStore + 'static>(
    State(ctx): State<ApiContext<S>>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionDetailResponse>, ApiError> {
    let prescription = ctx
        .service
        .prescription_detail(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Prescription not found".into()))?;

    Ok(Json(PrescriptionDetailResponse {
        card: prescription.to_string(),
        prescription,
    }))
}
