//! Listing API endpoints
//!
//! Handles HTTP requests for sponsorship listings:
//! - GET /api/v1/listings - Public search (active only)
//! - GET /api/v1/listings/{id} - Single listing
//! - GET /api/v1/listings/mine - Caller's listings in every status
//! - POST /api/v1/listings - Create (creators and admins)
//! - PUT /api/v1/listings/{id} - Update (owner or admin)
//! - DELETE /api/v1/listings/{id} - Delete (owner or admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    CreateListingInput, ListParams, Listing, ListingFilter, PagedResult, UpdateListingInput,
};

/// Query parameters for the public listing search
#[derive(Debug, Deserialize)]
pub struct ListListingsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub category: Option<String>,
    pub q: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

impl ListListingsQuery {
    fn split(self) -> (ListingFilter, ListParams) {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        (
            ListingFilter {
                category: non_blank(self.category),
                q: non_blank(self.q),
                location: non_blank(self.location),
                min_price: self.min_price,
                max_price: self.max_price,
            },
            ListParams::new(self.page, self.per_page),
        )
    }
}

/// Response for the caller's own listings
#[derive(Debug, Serialize)]
pub struct MyListingsResponse {
    pub listings: Vec<Listing>,
}

/// GET /api/v1/listings
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListListingsQuery>,
) -> Result<Json<PagedResult<Listing>>, ApiError> {
    let (filter, params) = query.split();
    let result = state.listing_service.list_public(&filter, &params).await?;
    Ok(Json(result))
}

/// GET /api/v1/listings/{id}
///
/// Drafts and closed listings are only visible to their owner and admins.
pub async fn get_listing(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Listing>, ApiError> {
    let listing = state
        .listing_service
        .get_visible(id, viewer.as_ref())
        .await?;
    Ok(Json(listing))
}

/// GET /api/v1/listings/mine
pub async fn my_listings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MyListingsResponse>, ApiError> {
    let listings = state.listing_service.list_mine(&user.0).await?;
    Ok(Json(MyListingsResponse { listings }))
}

/// POST /api/v1/listings
pub async fn create_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateListingInput>,
) -> Result<(StatusCode, Json<Listing>), ApiError> {
    let listing = state.listing_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// PUT /api/v1/listings/{id}
pub async fn update_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateListingInput>,
) -> Result<Json<Listing>, ApiError> {
    let listing = state.listing_service.update(&user.0, id, body).await?;
    Ok(Json(listing))
}

/// DELETE /api/v1/listings/{id}
pub async fn delete_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.listing_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
