//! Category API endpoints
//!
//! - GET /api/v1/categories - All categories with active listing counts
//! - GET /api/v1/categories/{slug} - Single category
//!
//! Admin writes live in `admin.rs`.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CategoryWithCount};

/// Response for the category list
#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryWithCount>,
}

/// Build the categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{slug}", get(get_category))
}

/// GET /api/v1/categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let categories = state.category_service.list().await?;
    Ok(Json(CategoryListResponse { categories }))
}

/// GET /api/v1/categories/{slug}
async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .category_service
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Category not found: {}", slug)))?;

    Ok(Json(category))
}
