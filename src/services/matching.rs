//! Matching service
//!
//! Heuristic scoring between sponsors and listings (or creators). The
//! scoring functions are pure and work on in-memory slices; the service
//! only loads the candidates and ranks them.
//!
//! Weights (out of 100):
//! - shared category interest: 40
//! - location: 30 for the same place, 15 for a shared word
//! - budget: 20 when the price fits, 10 when it is within 25% above the max
//! - reach (listing audience) or activity (sponsor applications): up to 10

use crate::db::repositories::{ApplicationRepository, ListingRepository, UserRepository};
use crate::models::{Listing, User, UserRole};
use anyhow::Context;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CATEGORY_POINTS: u32 = 40;
const LOCATION_EXACT_POINTS: u32 = 30;
const LOCATION_PARTIAL_POINTS: u32 = 15;
const BUDGET_FIT_POINTS: u32 = 20;
const BUDGET_NEAR_POINTS: u32 = 10;
const MAX_BONUS_POINTS: u32 = 10;
const MAX_SCORE: u32 = 100;

pub const DEFAULT_MATCH_LIMIT: usize = 20;
pub const MAX_MATCH_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum MatchingServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Score in 0..=100 with the reasons that contributed to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchScore {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl MatchScore {
    fn new() -> Self {
        Self {
            score: 0,
            reasons: Vec::new(),
        }
    }

    fn add(&mut self, points: u32, reason: impl Into<String>) {
        if points > 0 {
            self.score = (self.score + points).min(MAX_SCORE);
            self.reasons.push(reason.into());
        }
    }
}

/// Ranking parameters
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery {
    pub limit: usize,
    pub min_score: u32,
}

impl Default for MatchQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MATCH_LIMIT,
            min_score: 0,
        }
    }
}

impl MatchQuery {
    /// Clamp client-supplied values
    pub fn new(limit: Option<usize>, min_score: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_MATCH_LIMIT).clamp(1, MAX_MATCH_LIMIT),
            min_score: min_score.unwrap_or(0).min(MAX_SCORE),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingMatch {
    pub listing: Listing,
    #[serde(flatten)]
    pub score: MatchScore,
}

/// The parts of a sponsor a creator gets to see in match results
#[derive(Debug, Clone, Serialize)]
pub struct SponsorSummary {
    pub id: i64,
    pub name: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub avatar: Option<String>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
}

impl From<&User> for SponsorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            company_name: user.company_name.clone(),
            location: user.location.clone(),
            avatar: user.avatar.clone(),
            budget_min: user.budget_min,
            budget_max: user.budget_max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SponsorMatch {
    pub sponsor: SponsorSummary,
    #[serde(flatten)]
    pub score: MatchScore,
}

// ============================================================================
// Scoring
// ============================================================================

/// How well a listing suits a sponsor
pub fn score_listing_for_sponsor(sponsor: &User, interests: &[i64], listing: &Listing) -> MatchScore {
    let mut score = MatchScore::new();

    if interests.contains(&listing.category_id) {
        score.add(CATEGORY_POINTS, "Matches your interests");
    }

    add_location(&mut score, sponsor.location.as_deref(), listing.location.as_deref());

    match budget_fit(listing.price, sponsor.budget_min, sponsor.budget_max) {
        BudgetFit::Within => score.add(BUDGET_FIT_POINTS, "Within your budget"),
        BudgetFit::Near => score.add(BUDGET_NEAR_POINTS, "Slightly above your budget"),
        BudgetFit::Outside => {}
    }

    score.add(audience_points(listing.audience_size), "Audience reach");

    score
}

/// How well a sponsor suits a creator, judged against the creator's active listings
pub fn score_sponsor_for_creator(
    creator: &User,
    creator_listings: &[Listing],
    sponsor: &User,
    sponsor_interests: &[i64],
    sponsor_application_count: i64,
) -> MatchScore {
    let mut score = MatchScore::new();
    let active: Vec<&Listing> = creator_listings.iter().filter(|l| l.is_active()).collect();

    let categories: HashSet<i64> = active.iter().map(|l| l.category_id).collect();
    if sponsor_interests.iter().any(|c| categories.contains(c)) {
        score.add(CATEGORY_POINTS, "Interested in your categories");
    }

    add_location(&mut score, sponsor.location.as_deref(), creator.location.as_deref());

    let prices: Vec<i64> = active.iter().map(|l| l.price).collect();
    if let Some(median) = median(&prices) {
        if budget_fit(median, sponsor.budget_min, sponsor.budget_max) == BudgetFit::Within {
            score.add(BUDGET_FIT_POINTS, "Budget covers your typical price");
        }
    }

    let activity = (sponsor_application_count.max(0) as u32).saturating_mul(2);
    score.add(activity.min(MAX_BONUS_POINTS), "Active sponsor");

    score
}

fn add_location(score: &mut MatchScore, a: Option<&str>, b: Option<&str>) {
    match location_match(a, b) {
        LocationMatch::Same => score.add(LOCATION_EXACT_POINTS, "Same location"),
        LocationMatch::Nearby => score.add(LOCATION_PARTIAL_POINTS, "Nearby location"),
        LocationMatch::None => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationMatch {
    Same,
    Nearby,
    None,
}

/// Exact (case-insensitive) match, or a shared word of 3+ characters
fn location_match(a: Option<&str>, b: Option<&str>) -> LocationMatch {
    let (a, b) = match (a.map(str::trim), b.map(str::trim)) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => (a.to_lowercase(), b.to_lowercase()),
        _ => return LocationMatch::None,
    };

    if a == b {
        return LocationMatch::Same;
    }

    let words = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 3)
            .map(str::to_string)
            .collect()
    };
    if words(&a).intersection(&words(&b)).next().is_some() {
        LocationMatch::Nearby
    } else {
        LocationMatch::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetFit {
    Within,
    Near,
    Outside,
}

/// Where a price falls against an optional budget range
///
/// Without any budget only free listings fit.
fn budget_fit(price: i64, min: Option<i64>, max: Option<i64>) -> BudgetFit {
    match (min, max) {
        (None, None) => {
            if price == 0 {
                BudgetFit::Within
            } else {
                BudgetFit::Outside
            }
        }
        (min, Some(max)) => {
            if price >= min.unwrap_or(0) && price <= max {
                BudgetFit::Within
            } else if price > max && (price as i128) * 4 <= (max as i128) * 5 {
                // above max by at most 25%
                BudgetFit::Near
            } else {
                BudgetFit::Outside
            }
        }
        (Some(min), None) => {
            if price >= min {
                BudgetFit::Within
            } else {
                BudgetFit::Outside
            }
        }
    }
}

/// `min(10, floor(2 * log10(audience)))`, zero for empty audiences
fn audience_points(audience_size: i64) -> u32 {
    if audience_size < 1 {
        return 0;
    }
    let points = (2.0 * (audience_size as f64).log10()).floor();
    (points.max(0.0) as u32).min(MAX_BONUS_POINTS)
}

/// Median of the values; the mean of the middle two for even counts
fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(sorted[mid - 1] + (sorted[mid] - sorted[mid - 1]) / 2)
    }
}

// ============================================================================
// Ranking
// ============================================================================

/// Rank active listings for a sponsor
///
/// Skips the sponsor's own listings and those already applied to. Sorted by
/// score, then newest listing first.
pub fn rank_listings(
    sponsor: &User,
    interests: &[i64],
    listings: &[Listing],
    applied: &HashSet<i64>,
    query: MatchQuery,
) -> Vec<ListingMatch> {
    let mut matches: Vec<ListingMatch> = listings
        .iter()
        .filter(|l| l.is_active() && l.owner_id != sponsor.id && !applied.contains(&l.id))
        .map(|l| ListingMatch {
            listing: l.clone(),
            score: score_listing_for_sponsor(sponsor, interests, l),
        })
        .filter(|m| m.score.score >= query.min_score)
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .score
            .cmp(&a.score.score)
            .then_with(|| b.listing.created_at.cmp(&a.listing.created_at))
            .then_with(|| b.listing.id.cmp(&a.listing.id))
    });
    matches.truncate(query.limit);
    matches
}

/// Rank sponsors for a creator. Ties break by sponsor id.
pub fn rank_sponsors(
    creator: &User,
    creator_listings: &[Listing],
    sponsors: &[User],
    interests: &HashMap<i64, Vec<i64>>,
    application_counts: &HashMap<i64, i64>,
    query: MatchQuery,
) -> Vec<SponsorMatch> {
    let mut matches: Vec<SponsorMatch> = sponsors
        .iter()
        .filter(|s| s.id != creator.id && s.is_active())
        .map(|s| SponsorMatch {
            sponsor: SponsorSummary::from(s),
            score: score_sponsor_for_creator(
                creator,
                creator_listings,
                s,
                interests.get(&s.id).map(Vec::as_slice).unwrap_or(&[]),
                application_counts.get(&s.id).copied().unwrap_or(0),
            ),
        })
        .filter(|m| m.score.score >= query.min_score)
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .score
            .cmp(&a.score.score)
            .then_with(|| a.sponsor.id.cmp(&b.sponsor.id))
    });
    matches.truncate(query.limit);
    matches
}

// ============================================================================
// Service
// ============================================================================

pub struct MatchingService {
    users: Arc<dyn UserRepository>,
    listings: Arc<dyn ListingRepository>,
    applications: Arc<dyn ApplicationRepository>,
}

impl MatchingService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        listings: Arc<dyn ListingRepository>,
        applications: Arc<dyn ApplicationRepository>,
    ) -> Self {
        Self {
            users,
            listings,
            applications,
        }
    }

    /// Listings ranked for a sponsor
    pub async fn matches_for_sponsor(
        &self,
        sponsor: &User,
        query: MatchQuery,
    ) -> Result<Vec<ListingMatch>, MatchingServiceError> {
        if sponsor.role != UserRole::Sponsor {
            return Err(MatchingServiceError::Forbidden(
                "Listing matches are for sponsors".to_string(),
            ));
        }

        let interests = self
            .users
            .get_interest_ids(sponsor.id)
            .await
            .context("Failed to load interests")?;
        let listings = self
            .listings
            .list_active()
            .await
            .context("Failed to load listings")?;
        let applied = self
            .applications
            .listing_ids_by_sponsor(sponsor.id)
            .await
            .context("Failed to load applications")?;

        Ok(rank_listings(sponsor, &interests, &listings, &applied, query))
    }

    /// Sponsors ranked for a creator
    pub async fn matches_for_creator(
        &self,
        creator: &User,
        query: MatchQuery,
    ) -> Result<Vec<SponsorMatch>, MatchingServiceError> {
        if creator.role != UserRole::Creator {
            return Err(MatchingServiceError::Forbidden(
                "Sponsor matches are for creators".to_string(),
            ));
        }

        let creator_listings = self
            .listings
            .list_by_owner(creator.id)
            .await
            .context("Failed to load listings")?;
        let sponsors = self
            .users
            .list_active_by_role(UserRole::Sponsor)
            .await
            .context("Failed to load sponsors")?;
        let interests = self
            .users
            .interest_map(UserRole::Sponsor)
            .await
            .context("Failed to load sponsor interests")?;
        let counts = self
            .applications
            .count_per_sponsor()
            .await
            .context("Failed to count applications")?;

        Ok(rank_sponsors(
            creator,
            &creator_listings,
            &sponsors,
            &interests,
            &counts,
            query,
        ))
    }
}


#[cfg(test)]
mod property_tests {
    use super::tests::{listing, sponsor};
    use super::*;
    use proptest::prelude::*;

    fn user_strategy() -> impl Strategy<Value = User> {
        (
            prop::option::of("[A-Za-z ,]{0,20}"),
            prop::option::of(0i64..1_000_000),
            prop::option::of(0i64..2_000_000),
        )
            .prop_map(|(location, min, max)| {
                let mut s = sponsor(1);
                s.location = location;
                s.budget_min = min;
                s.budget_max = max;
                s
            })
    }

    fn listings_strategy() -> impl Strategy<Value = Vec<Listing>> {
        prop::collection::vec(
            (1i64..4, 1i64..6, 0i64..2_000_000, 0i64..10_000_000, prop::option::of("[A-Za-z ,]{0,20}")),
            0..15,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (owner, category, price, audience, location))| {
                    let mut l = listing(i as i64 + 1, owner, category, price);
                    l.audience_size = audience;
                    l.location = location;
                    l
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Scores stay within 0..=100
        #[test]
        fn listing_score_bounded(
            s in user_strategy(),
            listings in listings_strategy(),
            interests in prop::collection::vec(1i64..6, 0..5),
        ) {
            for l in &listings {
                let score = score_listing_for_sponsor(&s, &interests, l);
                prop_assert!(score.score <= 100);
            }
        }

        #[test]
        fn sponsor_score_bounded(
            s in user_strategy(),
            listings in listings_strategy(),
            interests in prop::collection::vec(1i64..6, 0..5),
            count in 0i64..1000,
        ) {
            let mut creator = sponsor(2);
            creator.role = UserRole::Creator;
            let score = score_sponsor_for_creator(&creator, &listings, &s, &interests, count);
            prop_assert!(score.score <= 100);
        }

        /// Rankings never include the caller's listings and are sorted descending
        #[test]
        fn ranking_sorted_and_excludes_own(
            s in user_strategy(),
            listings in listings_strategy(),
            interests in prop::collection::vec(1i64..6, 0..5),
            min_score in 0u32..60,
        ) {
            let ranked = rank_listings(&s, &interests, &listings, &HashSet::new(), MatchQuery::new(None, Some(min_score)));

            prop_assert!(ranked.iter().all(|m| m.listing.owner_id != s.id));
            prop_assert!(ranked.iter().all(|m| m.score.score >= min_score));
            prop_assert!(ranked.windows(2).all(|w| w[0].score.score >= w[1].score.score));
            prop_assert!(ranked.len() <= DEFAULT_MATCH_LIMIT);
        }
    }
}
