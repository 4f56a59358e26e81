//! Category model
//!
//! Categories group listings and describe what sponsors are interested in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slug of the category that can never be deleted and that receives
/// listings from deleted categories.
pub const DEFAULT_CATEGORY_SLUG: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Check if this category is the default "general" category
    pub fn is_default(&self) -> bool {
        self.slug == DEFAULT_CATEGORY_SLUG
    }
}

/// Category with the number of active listings filed under it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub category: Category,
    pub listing_count: i64,
}

/// Input for creating a new category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Generated from the name when absent
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Input for updating a category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}
