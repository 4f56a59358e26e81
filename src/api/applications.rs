//! Application API endpoints
//!
//! - POST /api/v1/listings/{id}/applications - Apply (sponsors)
//! - GET /api/v1/listings/{id}/applications - Applications to a listing (owner or admin)
//! - GET /api/v1/applications - Sent (sponsors) or received (creators)
//! - PUT /api/v1/applications/{id}/status - Accept or reject (listing owner)
//! - POST /api/v1/applications/{id}/withdraw - Withdraw (applying sponsor)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Application, ApplicationDetail, ApplicationStatus, CreateApplicationInput};

/// Request body for deciding on an application
#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Serialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<ApplicationDetail>,
}

/// POST /api/v1/listings/{id}/applications
///
/// The pitch is also posted to the sponsor/owner conversation.
pub async fn apply(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(listing_id): Path<i64>,
    Json(body): Json<CreateApplicationInput>,
) -> Result<(StatusCode, Json<Application>), ApiError> {
    let application = state
        .application_service
        .apply(&user.0, listing_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /api/v1/listings/{id}/applications
pub async fn list_for_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(listing_id): Path<i64>,
) -> Result<Json<ApplicationListResponse>, ApiError> {
    let applications = state
        .application_service
        .list_for_listing(&user.0, listing_id)
        .await?;
    Ok(Json(ApplicationListResponse { applications }))
}

/// GET /api/v1/applications
pub async fn list_mine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApplicationListResponse>, ApiError> {
    let applications = state.application_service.list_mine(&user.0).await?;
    Ok(Json(ApplicationListResponse { applications }))
}

/// PUT /api/v1/applications/{id}/status
pub async fn decide(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<DecideRequest>,
) -> Result<Json<ApplicationDetail>, ApiError> {
    let detail = state
        .application_service
        .decide(&user.0, id, body.status)
        .await?;
    Ok(Json(detail))
}

/// POST /api/v1/applications/{id}/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ApplicationDetail>, ApiError> {
    let detail = state.application_service.withdraw(&user.0, id).await?;
    Ok(Json(detail))
}
