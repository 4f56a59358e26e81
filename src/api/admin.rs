//! Admin API endpoints
//!
//! Handles HTTP requests for platform administration. The admin guard runs
//! in middleware, so every handler here already has an admin caller.
//! - GET /api/v1/admin/users - Paginated user list
//! - PUT /api/v1/admin/users/{id}/status - Ban or reinstate
//! - GET /api/v1/admin/stats - Platform counters
//! - POST /api/v1/admin/categories - Create category
//! - PUT /api/v1/admin/categories/{id} - Update category
//! - DELETE /api/v1/admin/categories/{id} - Delete category
//! - POST /api/v1/admin/payments/{id}/refund - Refund a payment

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::payments;
use crate::models::{
    Category, CreateCategoryInput, PagedResult, UpdateCategoryInput, User, UserStatus,
};
use crate::services::AdminStats;

/// Request body for changing a user's status
#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: UserStatus,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/status", put(set_user_status))
        .route("/stats", get(get_stats))
        .route("/categories", post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
        .route("/payments/{id}/refund", post(payments::refund_payment))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<User>>, ApiError> {
    let users = state.user_service.list_users(&query.into()).await?;
    Ok(Json(users))
}

/// PUT /api/v1/admin/users/{id}/status
///
/// Banning also ends every session of the user.
async fn set_user_status(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UserStatusRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .set_status(&admin.0, id, body.status)
        .await?;
    Ok(Json(user))
}

/// GET /api/v1/admin/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    let stats = state.stats_service.collect().await?;
    Ok(Json(stats))
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/v1/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.update(id, body).await?;
    Ok(Json(category))
}

/// DELETE /api/v1/admin/categories/{id}
///
/// Listings in the category move to the default category.
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
