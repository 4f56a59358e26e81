//! Application service
//!
//! Sponsors apply to active listings with an offer and a pitch; the listing
//! owner accepts or rejects; the sponsor may withdraw while pending.

use crate::db::is_unique_violation;
use crate::db::repositories::{ApplicationRepository, ListingRepository};
use crate::models::{
    normalize_message, Application, ApplicationDetail, ApplicationStatus, CreateApplicationInput,
    User, UserRole, MAX_AMOUNT_CENTS, MAX_MESSAGE_LENGTH,
};
use crate::services::messaging::{MessagingService, MessagingServiceError};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Duplicate application or illegal status change
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    listings: Arc<dyn ListingRepository>,
    messaging: Arc<MessagingService>,
}

impl ApplicationService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        listings: Arc<dyn ListingRepository>,
        messaging: Arc<MessagingService>,
    ) -> Self {
        Self {
            applications,
            listings,
            messaging,
        }
    }

    /// Apply to a listing
    ///
    /// The pitch is also posted to the sponsor/owner conversation about the
    /// listing, which is created on first contact.
    pub async fn apply(
        &self,
        sponsor: &User,
        listing_id: i64,
        input: CreateApplicationInput,
    ) -> Result<Application, ApplicationServiceError> {
        if !sponsor.is_sponsor() {
            return Err(ApplicationServiceError::Forbidden(
                "Only sponsors can apply to listings".to_string(),
            ));
        }

        let listing = self
            .listings
            .get_by_id(listing_id)
            .await
            .context("Failed to get listing")?
            .ok_or_else(|| ApplicationServiceError::NotFound("Listing not found".to_string()))?;

        if !listing.is_active() {
            return Err(ApplicationServiceError::ValidationError(
                "Listing is not accepting applications".to_string(),
            ));
        }
        if listing.owner_id == sponsor.id {
            return Err(ApplicationServiceError::ValidationError(
                "You cannot apply to your own listing".to_string(),
            ));
        }
        if input.offer_amount <= 0 {
            return Err(ApplicationServiceError::ValidationError(
                "Offer amount must be positive".to_string(),
            ));
        }
        if input.offer_amount > MAX_AMOUNT_CENTS {
            return Err(ApplicationServiceError::ValidationError(format!(
                "Offer amount must not exceed {} cents",
                MAX_AMOUNT_CENTS
            )));
        }
        let message = normalize_message(&input.message).ok_or_else(|| {
            ApplicationServiceError::ValidationError(format!(
                "Message must be 1 to {} characters",
                MAX_MESSAGE_LENGTH
            ))
        })?;

        if self
            .applications
            .find_by_listing_and_sponsor(listing_id, sponsor.id)
            .await
            .context("Failed to check existing application")?
            .is_some()
        {
            return Err(already_applied());
        }

        let now = Utc::now();
        let application = Application {
            id: 0,
            listing_id,
            sponsor_id: sponsor.id,
            message,
            offer_amount: input.offer_amount,
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let created = match self.applications.create(&application).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => return Err(already_applied()),
            Err(e) => return Err(e.context("Failed to create application").into()),
        };

        tracing::info!(
            id = created.id,
            listing_id,
            sponsor_id = sponsor.id,
            offer = created.offer_amount,
            "Application submitted"
        );

        // The application stands even if the pitch cannot be delivered
        if let Err(e) = self.post_pitch(&created, listing.owner_id).await {
            tracing::warn!(application_id = created.id, "Failed to post pitch message: {}", e);
        }

        Ok(created)
    }

    async fn post_pitch(
        &self,
        application: &Application,
        owner_id: i64,
    ) -> Result<(), MessagingServiceError> {
        let conversation = self
            .messaging
            .find_or_create(application.sponsor_id, owner_id, Some(application.listing_id))
            .await?;
        self.messaging
            .post(application.sponsor_id, conversation.id, &application.message)
            .await?;
        Ok(())
    }

    /// Applications received by a listing (owner or admin)
    pub async fn list_for_listing(
        &self,
        actor: &User,
        listing_id: i64,
    ) -> Result<Vec<ApplicationDetail>, ApplicationServiceError> {
        let listing = self
            .listings
            .get_by_id(listing_id)
            .await
            .context("Failed to get listing")?
            .ok_or_else(|| ApplicationServiceError::NotFound("Listing not found".to_string()))?;

        if !actor.can_manage(listing.owner_id) {
            return Err(ApplicationServiceError::Forbidden(
                "Only the listing owner can see its applications".to_string(),
            ));
        }

        let applications = self
            .applications
            .list_for_listing(listing_id)
            .await
            .context("Failed to list applications")?;

        Ok(applications)
    }

    /// Sent applications for sponsors, received ones for everyone else
    pub async fn list_mine(
        &self,
        user: &User,
    ) -> Result<Vec<ApplicationDetail>, ApplicationServiceError> {
        let applications = match user.role {
            UserRole::Sponsor => self.applications.list_by_sponsor(user.id).await,
            UserRole::Creator | UserRole::Admin => self.applications.list_for_owner(user.id).await,
        }
        .context("Failed to list applications")?;

        Ok(applications)
    }

    /// Accept or reject an application (listing owner only)
    pub async fn decide(
        &self,
        actor: &User,
        id: i64,
        status: ApplicationStatus,
    ) -> Result<ApplicationDetail, ApplicationServiceError> {
        if !matches!(status, ApplicationStatus::Accepted | ApplicationStatus::Rejected) {
            return Err(ApplicationServiceError::ValidationError(
                "Status must be accepted or rejected".to_string(),
            ));
        }

        let detail = self.get_detail(id).await?;
        if detail.owner_id != actor.id {
            return Err(ApplicationServiceError::Forbidden(
                "Only the listing owner can decide on applications".to_string(),
            ));
        }

        self.transition(&detail.application, status).await?;
        self.get_detail(id).await
    }

    /// Withdraw a pending application (applying sponsor only)
    pub async fn withdraw(
        &self,
        actor: &User,
        id: i64,
    ) -> Result<ApplicationDetail, ApplicationServiceError> {
        let detail = self.get_detail(id).await?;
        if detail.application.sponsor_id != actor.id {
            return Err(ApplicationServiceError::Forbidden(
                "Only the applicant can withdraw".to_string(),
            ));
        }

        self.transition(&detail.application, ApplicationStatus::Withdrawn)
            .await?;
        self.get_detail(id).await
    }

    async fn get_detail(&self, id: i64) -> Result<ApplicationDetail, ApplicationServiceError> {
        self.applications
            .get_detail(id)
            .await
            .context("Failed to get application")?
            .ok_or_else(|| ApplicationServiceError::NotFound("Application not found".to_string()))
    }

    /// Checked against the state machine, then applied only if nobody
    /// changed the status in between
    async fn transition(
        &self,
        application: &Application,
        to: ApplicationStatus,
    ) -> Result<(), ApplicationServiceError> {
        let from = application.status;
        if !from.can_transition_to(to) {
            return Err(ApplicationServiceError::Conflict(format!(
                "Cannot change application from {} to {}",
                from, to
            )));
        }

        let applied = self
            .applications
            .transition(application.id, from, to)
            .await
            .context("Failed to update application status")?;
        if !applied {
            return Err(ApplicationServiceError::Conflict(
                "Application status changed concurrently".to_string(),
            ));
        }

        tracing::info!(id = application.id, %from, %to, "Application status changed");
        Ok(())
    }
}

fn already_applied() -> ApplicationServiceError {
    ApplicationServiceError::Conflict("You have already applied to this listing".to_string())
}
