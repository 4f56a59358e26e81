//! Listing model
//!
//! A listing is a sponsorship opportunity published by a creator: an event,
//! a channel, a team season. Prices are integer cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    /// Creator who published the listing
    pub owner_id: i64,
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub audience_size: i64,
    /// Asking price in cents
    pub price: i64,
    pub status: ListingStatus,
    pub event_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }
}

/// Listing lifecycle. Only active listings are public and accept applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Draft,
    #[default]
    Active,
    Closed,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStatus::Draft => write!(f, "draft"),
            ListingStatus::Active => write!(f, "active"),
            ListingStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for ListingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ListingStatus::Draft),
            "active" => Ok(ListingStatus::Active),
            "closed" => Ok(ListingStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid listing status: {}", s)),
        }
    }
}

/// Input for creating a listing
#[derive(Debug, Clone, Deserialize)]
pub struct CreateListingInput {
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    #[serde(default)]
    pub audience_size: i64,
    pub price: i64,
    pub status: Option<ListingStatus>,
    pub event_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

/// Partial listing update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateListingInput {
    pub category_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub audience_size: Option<i64>,
    pub price: Option<i64>,
    pub status: Option<ListingStatus>,
    pub event_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

/// Public search filters; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    /// Category slug
    pub category: Option<String>,
    /// Case-insensitive text match on title or description
    pub q: Option<String>,
    /// Case-insensitive substring match on location
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters, clamping out-of-range values
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        let per_page = params.per_page.max(1) as i64;
        let total_pages = ((total.max(0) + per_page - 1) / per_page) as u32;
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages,
        }
    }

    /// Convert every item while keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
