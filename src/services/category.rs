//! Category service
//!
//! Implements business logic for category management:
//! - Public category list with active listing counts
//! - Admin create, update and delete
//! - Name and slug uniqueness
//! - Slug generation from name
//! - Listing migration to `general` on deletion
//!
//! The list and slug lookups are cached; every write clears the cache.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::is_unique_violation;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Cache key prefixes
const CACHE_KEY_CATEGORY_BY_SLUG: &str = "categories:slug:";
const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";

const MAX_NAME_LENGTH: usize = 100;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category name already exists
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    /// Category slug already exists
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    /// Category not found
    #[error("Category not found: {0}")]
    NotFound(String),

    /// Cannot delete default category
    #[error("Cannot delete the default category")]
    CannotDeleteDefault,

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing listing categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
    cache_ttl: Duration,
}

impl CategoryService {
    /// Create a new category service using the cache's default TTL
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self::with_cache_ttl(repo, cache, cache_ttl)
    }

    /// Create a new category service with custom cache TTL
    pub fn with_cache_ttl(
        repo: Arc<dyn CategoryRepository>,
        cache: Arc<MemoryCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// Create a new category
    ///
    /// # Errors
    /// - `ValidationError` for a blank name or malformed slug
    /// - `DuplicateName` if a category with the same name already exists
    /// - `DuplicateSlug` if a category with the same slug already exists
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;

        if self
            .repo
            .name_taken(&name, None)
            .await
            .context("Failed to check name uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => validate_slug(slug)?,
            None => generate_slug(&name),
        };
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Cannot derive a slug from this name; provide one".to_string(),
            ));
        }

        if self
            .repo
            .slug_taken(&slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let category = Category {
            id: 0,
            slug,
            name,
            description: clean_description(input.description),
            created_at: Utc::now(),
        };

        let created = match self.repo.create(&category).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(CategoryServiceError::DuplicateName(category.name));
            }
            Err(e) => return Err(e.context("Failed to create category").into()),
        };

        self.invalidate_cache().await;
        tracing::info!(id = created.id, slug = %created.slug, "Category created");

        Ok(created)
    }

    /// Get category by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category by ID")?;

        Ok(category)
    }

    /// Get category by slug (cached)
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_SLUG, slug);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(Some(category));
        }

        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?;

        if let Some(ref cat) = category {
            if let Err(e) = self.cache.set(&cache_key, cat, self.cache_ttl).await {
                tracing::warn!("Failed to cache category {}: {}", slug, e);
            }
        }

        Ok(category)
    }

    /// All categories ordered by name with active listing counts (cached)
    pub async fn list(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<CategoryWithCount>>(CACHE_KEY_CATEGORY_LIST)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let list = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list categories")?;

        if let Err(e) = self.cache.set(CACHE_KEY_CATEGORY_LIST, &list, self.cache_ttl).await {
            tracing::warn!("Failed to cache category list: {}", e);
        }

        Ok(list)
    }

    /// Update a category
    ///
    /// # Errors
    /// - `NotFound` if the category doesn't exist
    /// - `DuplicateName` if the new name already exists
    /// - `DuplicateSlug` if the new slug already exists
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("Category with ID {} not found", id)))?;

        if let Some(ref new_name) = input.name {
            let new_name = validate_name(new_name)?;
            if new_name != category.name {
                if self
                    .repo
                    .name_taken(&new_name, Some(id))
                    .await
                    .context("Failed to check name uniqueness")?
                {
                    return Err(CategoryServiceError::DuplicateName(new_name));
                }
                category.name = new_name;
            }
        }

        if let Some(ref new_slug) = input.slug {
            let new_slug = validate_slug(new_slug.trim())?;
            if new_slug != category.slug {
                if category.is_default() {
                    return Err(CategoryServiceError::ValidationError(
                        "The default category's slug cannot change".to_string(),
                    ));
                }
                if self
                    .repo
                    .slug_taken(&new_slug, Some(id))
                    .await
                    .context("Failed to check slug uniqueness")?
                {
                    return Err(CategoryServiceError::DuplicateSlug(new_slug));
                }
                category.slug = new_slug;
            }
        }

        if input.description.is_some() {
            category.description = clean_description(input.description);
        }

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        self.invalidate_cache().await;

        Ok(updated)
    }

    /// Delete a category
    ///
    /// Listings filed under it move to the default category first.
    ///
    /// # Errors
    /// - `NotFound` if the category doesn't exist
    /// - `CannotDeleteDefault` if trying to delete the default category
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("Category with ID {} not found", id)))?;

        if category.is_default() {
            return Err(CategoryServiceError::CannotDeleteDefault);
        }

        let default_category = self
            .repo
            .get_default()
            .await
            .context("Failed to get default category")?
            .ok_or_else(|| CategoryServiceError::NotFound("Default category not found".to_string()))?;

        self.repo
            .delete_reassigning(id, default_category.id)
            .await
            .context("Failed to delete category")?;

        self.invalidate_cache().await;
        tracing::info!(id, slug = %category.slug, "Category deleted");

        Ok(())
    }

    /// Listing counts in the cached list are stale after any listing write
    pub async fn listing_counts_changed(&self) {
        if let Err(e) = self.cache.delete(CACHE_KEY_CATEGORY_LIST).await {
            tracing::warn!("Failed to drop cached category list: {}", e);
        }
    }

    /// Invalidate all category-related cache entries
    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern("categories:*").await {
            tracing::warn!("Failed to invalidate category cache: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// A slug must already be in canonical form
fn validate_slug(slug: &str) -> Result<String, CategoryServiceError> {
    if slug.is_empty() || generate_slug(slug) != slug {
        return Err(CategoryServiceError::ValidationError(format!(
            "Invalid slug '{}': use lowercase letters, digits and single hyphens",
            slug
        )));
    }
    Ok(slug.to_string())
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Generate a URL-friendly slug from a name
///
/// Lowercases ASCII letters and digits; every other run of characters
/// becomes a single hyphen. `&` reads as "and".
pub fn generate_slug(name: &str) -> String {
    let mut result = String::new();
    let mut prev_hyphen = false;

    for c in name.to_lowercase().replace('&', " and ").chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let repo = SqlxCategoryRepository::boxed(pool.clone());
        let cache = create_cache(&CacheConfig::default());
        let service = CategoryService::new(repo, cache);

        (pool, service)
    }

    fn input(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            slug: None,
            description: None,
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Food & Drink"), "food-and-drink");
        assert_eq!(generate_slug("  Local   Sports  "), "local-sports");
        assert_eq!(generate_slug("E-Sports_2024!"), "e-sports-2024");
        assert_eq!(generate_slug("Café"), "caf");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[tokio::test]
    async fn test_create_category_success() {
        let (_pool, service) = setup_test_service().await;

        let category = service.create(input("Outdoor Cinema")).await.unwrap();

        assert_eq!(category.slug, "outdoor-cinema");
        assert!(category.id > 0);
        assert!(service.get_by_slug("outdoor-cinema").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_category_with_custom_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service
            .create(CreateCategoryInput {
                slug: Some("cinema".to_string()),
                ..input("Outdoor Cinema")
            })
            .await
            .unwrap();
        assert_eq!(category.slug, "cinema");

        let bad = service
            .create(CreateCategoryInput {
                slug: Some("Not A Slug".to_string()),
                ..input("Other")
            })
            .await;
        assert!(matches!(bad, Err(CategoryServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_category_duplicates_fail() {
        let (_pool, service) = setup_test_service().await;

        // seeded by migrations
        let by_name = service.create(input("music")).await;
        assert!(matches!(by_name, Err(CategoryServiceError::DuplicateName(_))));

        let by_slug = service
            .create(CreateCategoryInput {
                slug: Some("music".to_string()),
                ..input("Live Music")
            })
            .await;
        assert!(matches!(by_slug, Err(CategoryServiceError::DuplicateSlug(_))));
    }

    #[tokio::test]
    async fn test_create_category_empty_name_fails() {
        let (_pool, service) = setup_test_service().await;
        let result = service.create(input("   ")).await;
        assert!(matches!(result, Err(CategoryServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_category() {
        let (_pool, service) = setup_test_service().await;
        let category = service.create(input("Gaming")).await.unwrap();

        let updated = service
            .update(
                category.id,
                UpdateCategoryInput {
                    name: Some("Video Games".to_string()),
                    slug: Some("video-games".to_string()),
                    description: Some("Tournaments and streams".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Video Games");
        assert_eq!(updated.slug, "video-games");
        assert!(service.get_by_slug("gaming").await.unwrap().is_none());

        let clash = service
            .update(
                category.id,
                UpdateCategoryInput {
                    name: Some("Sports".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(CategoryServiceError::DuplicateName(_))));

        let missing = service.update(9999, UpdateCategoryInput::default()).await;
        assert!(matches!(missing, Err(CategoryServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_default_category_fails() {
        let (_pool, service) = setup_test_service().await;
        let general = service.get_by_slug("general").await.unwrap().unwrap();

        let result = service.delete(general.id).await;
        assert!(matches!(result, Err(CategoryServiceError::CannotDeleteDefault)));
    }

    #[tokio::test]
    async fn test_delete_category() {
        let (_pool, service) = setup_test_service().await;
        let category = service.create(input("Temporary")).await.unwrap();

        service.delete(category.id).await.unwrap();

        assert!(service.get_by_id(category.id).await.unwrap().is_none());
        assert!(matches!(
            service.delete(category.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_invalidation_on_create() {
        let (_pool, service) = setup_test_service().await;

        let before = service.list().await.unwrap().len();
        service.create(input("Film")).await.unwrap();
        let after = service.list().await.unwrap();

        assert_eq!(after.len(), before + 1);
        // ordered by name
        let names: Vec<_> = after.iter().map(|c| c.category.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_cache_invalidation_on_delete() {
        let (_pool, service) = setup_test_service().await;
        let category = service.create(input("Pop-up")).await.unwrap();
        assert!(service.get_by_slug("pop-up").await.unwrap().is_some());

        service.delete(category.id).await.unwrap();

        assert!(service.get_by_slug("pop-up").await.unwrap().is_none());
        assert!(service
            .list()
            .await
            .unwrap()
            .iter()
            .all(|c| c.category.id != category.id));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Generated slugs are canonical: lowercase alphanumerics joined by single hyphens
        #[test]
        fn generated_slug_is_canonical(name in "[ -~]{0,40}") {
            let slug = generate_slug(&name);
            prop_assert_eq!(generate_slug(&slug), slug.clone());
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}
