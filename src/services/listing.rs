//! Listing service
//!
//! Creators publish listings; everyone browses the active ones.
//! Owners and admins manage them.

use crate::db::repositories::ListingRepository;
use crate::models::{
    CreateListingInput, ListParams, Listing, ListingFilter, ListingStatus, PagedResult,
    UpdateListingInput, User,
};
use crate::services::category::{CategoryService, CategoryServiceError};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_TITLE_LENGTH: usize = 200;

/// Error types for listing service operations
#[derive(Debug, thiserror::Error)]
pub enum ListingServiceError {
    #[error("Listing not found")]
    NotFound,

    /// Caller may not perform this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<CategoryServiceError> for ListingServiceError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::InternalError(e) => ListingServiceError::InternalError(e),
            other => ListingServiceError::ValidationError(other.to_string()),
        }
    }
}

pub struct ListingService {
    repo: Arc<dyn ListingRepository>,
    categories: Arc<CategoryService>,
}

impl ListingService {
    pub fn new(repo: Arc<dyn ListingRepository>, categories: Arc<CategoryService>) -> Self {
        Self { repo, categories }
    }

    /// Public search over active listings, newest first
    pub async fn list_public(
        &self,
        filter: &ListingFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Listing>, ListingServiceError> {
        let (items, total) = self
            .repo
            .list_public(filter, params)
            .await
            .context("Failed to search listings")?;

        Ok(PagedResult::new(items, total, params))
    }

    /// Fetch a listing the viewer is allowed to see
    ///
    /// Non-active listings are only visible to their owner and admins; for
    /// everyone else they do not exist.
    pub async fn get_visible(
        &self,
        id: i64,
        viewer: Option<&User>,
    ) -> Result<Listing, ListingServiceError> {
        let listing = self.get(id).await?;

        let visible = listing.is_active() || viewer.map_or(false, |u| u.can_manage(listing.owner_id));
        if !visible {
            return Err(ListingServiceError::NotFound);
        }

        Ok(listing)
    }

    /// Fetch a listing regardless of status
    pub async fn get(&self, id: i64) -> Result<Listing, ListingServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get listing")?
            .ok_or(ListingServiceError::NotFound)
    }

    /// Publish a new listing. Sponsors cannot create listings.
    pub async fn create(
        &self,
        owner: &User,
        input: CreateListingInput,
    ) -> Result<Listing, ListingServiceError> {
        if owner.is_sponsor() {
            return Err(ListingServiceError::Forbidden(
                "Only creators can publish listings".to_string(),
            ));
        }

        let title = validate_title(&input.title)?;
        let description = validate_description(&input.description)?;
        validate_amounts(input.price, input.audience_size)?;
        self.ensure_category(input.category_id).await?;

        let now = Utc::now();
        let listing = Listing {
            id: 0,
            owner_id: owner.id,
            category_id: input.category_id,
            title,
            description,
            location: input.location.and_then(clearable),
            audience_size: input.audience_size,
            price: input.price,
            status: input.status.unwrap_or(ListingStatus::Active),
            event_date: input.event_date,
            image: input.image.and_then(clearable),
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&listing)
            .await
            .context("Failed to create listing")?;

        self.categories.listing_counts_changed().await;
        tracing::info!(id = created.id, owner_id = owner.id, "Listing created");

        Ok(created)
    }

    /// Partially update a listing (owner or admin)
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateListingInput,
    ) -> Result<Listing, ListingServiceError> {
        let mut listing = self.get(id).await?;
        if !actor.can_manage(listing.owner_id) {
            return Err(ListingServiceError::Forbidden(
                "Only the owner can edit this listing".to_string(),
            ));
        }

        if let Some(title) = input.title {
            listing.title = validate_title(&title)?;
        }
        if let Some(description) = input.description {
            listing.description = validate_description(&description)?;
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            listing.category_id = category_id;
        }
        if let Some(location) = input.location {
            listing.location = clearable(location);
        }
        if let Some(audience_size) = input.audience_size {
            listing.audience_size = audience_size;
        }
        if let Some(price) = input.price {
            listing.price = price;
        }
        validate_amounts(listing.price, listing.audience_size)?;
        if let Some(status) = input.status {
            if status != listing.status {
                tracing::info!(id, from = %listing.status, to = %status, "Listing status changed");
            }
            listing.status = status;
        }
        if input.event_date.is_some() {
            listing.event_date = input.event_date;
        }
        if let Some(image) = input.image {
            listing.image = clearable(image);
        }

        let updated = self
            .repo
            .update(&listing)
            .await
            .context("Failed to update listing")?;

        self.categories.listing_counts_changed().await;
        Ok(updated)
    }

    /// Delete a listing (owner or admin); its applications go with it
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), ListingServiceError> {
        let listing = self.get(id).await?;
        if !actor.can_manage(listing.owner_id) {
            return Err(ListingServiceError::Forbidden(
                "Only the owner can delete this listing".to_string(),
            ));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete listing")?;

        self.categories.listing_counts_changed().await;
        tracing::info!(id, actor_id = actor.id, "Listing deleted");
        Ok(())
    }

    /// The caller's own listings in every status
    pub async fn list_mine(&self, user: &User) -> Result<Vec<Listing>, ListingServiceError> {
        let listings = self
            .repo
            .list_by_owner(user.id)
            .await
            .context("Failed to list own listings")?;

        Ok(listings)
    }

    async fn ensure_category(&self, category_id: i64) -> Result<(), ListingServiceError> {
        if self.categories.get_by_id(category_id).await?.is_none() {
            return Err(ListingServiceError::ValidationError(format!(
                "Category {} does not exist",
                category_id
            )));
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, ListingServiceError> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_LENGTH {
        return Err(ListingServiceError::ValidationError(format!(
            "Title must be 1 to {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> Result<String, ListingServiceError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(ListingServiceError::ValidationError(
            "Description cannot be empty".to_string(),
        ));
    }
    Ok(description.to_string())
}

fn validate_amounts(price: i64, audience_size: i64) -> Result<(), ListingServiceError> {
    if price < 0 {
        return Err(ListingServiceError::ValidationError(
            "Price cannot be negative".to_string(),
        ));
    }
    if audience_size < 0 {
        return Err(ListingServiceError::ValidationError(
            "Audience size cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn clearable(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
