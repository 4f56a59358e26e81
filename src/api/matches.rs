//! Matching API endpoints
//!
//! - GET /api/v1/matches - Listings ranked for the calling sponsor
//! - GET /api/v1/sponsor-matches - Sponsors ranked for the calling creator

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::matching::{ListingMatch, MatchQuery, SponsorMatch};

#[derive(Debug, Default, Deserialize)]
pub struct MatchParams {
    pub limit: Option<usize>,
    pub min_score: Option<u32>,
}

impl From<MatchParams> for MatchQuery {
    fn from(params: MatchParams) -> Self {
        MatchQuery::new(params.limit, params.min_score)
    }
}

#[derive(Debug, Serialize)]
pub struct ListingMatchesResponse {
    pub matches: Vec<ListingMatch>,
}

#[derive(Debug, Serialize)]
pub struct SponsorMatchesResponse {
    pub matches: Vec<SponsorMatch>,
}

/// GET /api/v1/matches
pub async fn listing_matches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<MatchParams>,
) -> Result<Json<ListingMatchesResponse>, ApiError> {
    let matches = state
        .matching_service
        .matches_for_sponsor(&user.0, params.into())
        .await?;
    Ok(Json(ListingMatchesResponse { matches }))
}

/// GET /api/v1/sponsor-matches
pub async fn sponsor_matches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<MatchParams>,
) -> Result<Json<SponsorMatchesResponse>, ApiError> {
    let matches = state
        .matching_service
        .matches_for_creator(&user.0, params.into())
        .await?;
    Ok(Json(SponsorMatchesResponse { matches }))
}
