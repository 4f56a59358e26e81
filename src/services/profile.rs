//! Profile service
//!
//! Own-profile reads and partial updates, interest lists and the public view
//! of other users.

use crate::db::repositories::{CategoryRepository, UserRepository};
use crate::models::{Category, UpdateProfileInput, User, UserRole};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

const MAX_NAME_LENGTH: usize = 100;
const MAX_BIO_LENGTH: usize = 2000;

/// Error types for profile operations
#[derive(Debug, thiserror::Error)]
pub enum ProfileServiceError {
    #[error("User not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// The caller's own profile
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub interests: Vec<Category>,
}

/// What other users may see; no email, no account status
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub role: UserRole,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
    pub company_name: Option<String>,
    pub audience_size: i64,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub interests: Vec<Category>,
}

impl PublicProfile {
    fn new(user: User, interests: Vec<Category>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            role: user.role,
            bio: user.bio,
            location: user.location,
            website: user.website,
            avatar: user.avatar,
            company_name: user.company_name,
            audience_size: user.audience_size,
            budget_min: user.budget_min,
            budget_max: user.budget_max,
            created_at: user.created_at,
            interests,
        }
    }
}

pub struct ProfileService {
    user_repo: Arc<dyn UserRepository>,
    category_repo: Arc<dyn CategoryRepository>,
}

impl ProfileService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        category_repo: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            user_repo,
            category_repo,
        }
    }

    /// The user plus their interests
    pub async fn get_profile(&self, user: User) -> Result<Profile, ProfileServiceError> {
        let interests = self
            .user_repo
            .get_interests(user.id)
            .await
            .context("Failed to load interests")?;

        Ok(Profile { user, interests })
    }

    /// Public view of another user; banned users are hidden
    pub async fn public_profile(&self, id: i64) -> Result<PublicProfile, ProfileServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .filter(|u| !u.is_banned())
            .ok_or(ProfileServiceError::NotFound)?;

        let interests = self
            .user_repo
            .get_interests(user.id)
            .await
            .context("Failed to load interests")?;

        Ok(PublicProfile::new(user, interests))
    }

    /// Apply a partial update
    ///
    /// Absent fields are untouched. Blank strings clear optional text fields.
    /// The budget range is checked after merging with the stored values.
    pub async fn update_profile(
        &self,
        user: User,
        input: UpdateProfileInput,
    ) -> Result<Profile, ProfileServiceError> {
        let mut updated = user;

        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ProfileServiceError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            if name.chars().count() > MAX_NAME_LENGTH {
                return Err(ProfileServiceError::ValidationError(format!(
                    "Name must be at most {} characters",
                    MAX_NAME_LENGTH
                )));
            }
            updated.name = name.to_string();
        }

        if let Some(bio) = input.bio {
            if bio.trim().chars().count() > MAX_BIO_LENGTH {
                return Err(ProfileServiceError::ValidationError(format!(
                    "Bio must be at most {} characters",
                    MAX_BIO_LENGTH
                )));
            }
            updated.bio = clearable(bio);
        }
        if let Some(location) = input.location {
            updated.location = clearable(location);
        }
        if let Some(website) = input.website {
            updated.website = clearable(website);
        }
        if let Some(avatar) = input.avatar {
            updated.avatar = clearable(avatar);
        }
        if let Some(company_name) = input.company_name {
            updated.company_name = clearable(company_name);
        }

        if let Some(audience_size) = input.audience_size {
            if audience_size < 0 {
                return Err(ProfileServiceError::ValidationError(
                    "Audience size cannot be negative".to_string(),
                ));
            }
            updated.audience_size = audience_size;
        }

        if let Some(min) = input.budget_min {
            updated.budget_min = Some(min);
        }
        if let Some(max) = input.budget_max {
            updated.budget_max = Some(max);
        }
        validate_budget(updated.budget_min, updated.budget_max)?;

        let interests = match input.interests {
            Some(ids) => Some(self.validated_interests(ids).await?),
            None => None,
        };

        let saved = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update profile")?;

        if let Some(ids) = interests {
            self.user_repo
                .set_interests(saved.id, &ids)
                .await
                .context("Failed to update interests")?;
        }

        self.get_profile(saved).await
    }

    /// Deduplicate and check that every category exists
    async fn validated_interests(&self, ids: Vec<i64>) -> Result<Vec<i64>, ProfileServiceError> {
        let unique: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(unique);
        }

        let existing = self
            .category_repo
            .count_existing(&unique)
            .await
            .context("Failed to check categories")?;
        if existing != unique.len() {
            return Err(ProfileServiceError::ValidationError(
                "Unknown category in interests".to_string(),
            ));
        }

        Ok(unique)
    }
}

/// Trimmed value, or None when blank
fn clearable(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_budget(min: Option<i64>, max: Option<i64>) -> Result<(), ProfileServiceError> {
    if min.map_or(false, |v| v < 0) || max.map_or(false, |v| v < 0) {
        return Err(ProfileServiceError::ValidationError(
            "Budget cannot be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ProfileServiceError::ValidationError(
                "budget_min cannot exceed budget_max".to_string(),
            ));
        }
    }
    Ok(())
}
