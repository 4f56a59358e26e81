//! Profile API endpoints
//!
//! - GET /api/v1/profile - Own profile with interests
//! - PUT /api/v1/profile - Partial profile update
//! - GET /api/v1/users/{id} - Public profile

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::UpdateProfileInput;
use crate::services::profile::{Profile, PublicProfile};

/// Routes for the caller's own profile (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

/// Public user pages
pub fn public_router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_public_profile))
}

/// GET /api/v1/profile
async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Profile>, ApiError> {
    let profile = state.profile_service.get_profile(user.0).await?;
    Ok(Json(profile))
}

/// PUT /api/v1/profile
///
/// Blank strings clear optional fields; `interests` replaces the whole list.
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state.profile_service.update_profile(user.0, body).await?;
    Ok(Json(profile))
}

/// GET /api/v1/users/{id}
async fn get_public_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = state.profile_service.public_profile(id).await?;
    Ok(Json(profile))
}
