//! Category repository
//!
//! Database operations for categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Category, CategoryWithCount, DEFAULT_CATEGORY_SLUG};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str = "id, slug, name, description, created_at";

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List all categories ordered by name, with their active listing count
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    /// Update a category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Move the category's listings to `fallback_id`, then delete it
    async fn delete_reassigning(&self, id: i64, fallback_id: i64) -> Result<()>;

    /// Check if a category name is taken by a category other than `except_id`
    async fn name_taken(&self, name: &str, except_id: Option<i64>) -> Result<bool>;

    /// Check if a category slug is taken by a category other than `except_id`
    async fn slug_taken(&self, slug: &str, except_id: Option<i64>) -> Result<bool>;

    /// How many of the given ids refer to existing categories
    async fn count_existing(&self, ids: &[i64]) -> Result<usize>;

    /// Get the default category ("general")
    async fn get_default(&self) -> Result<Option<Category>>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let id = on_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO categories (slug, name, description, created_at) VALUES (?, ?, ?, ?)")
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(now)
                .execute(conn)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create category")?;

        Ok(Category {
            id,
            created_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let category = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Category>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get category by ID")?;

        Ok(category)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let category = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Category>(&sql).bind(slug).fetch_optional(conn).await
        })
        .context("Failed to get category by slug")?;

        Ok(category)
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let sql = r#"
            SELECT c.id, c.slug, c.name, c.description, c.created_at, COUNT(l.id) AS listing_count
            FROM categories c
            LEFT JOIN listings l ON l.category_id = c.id AND l.status = 'active'
            GROUP BY c.id, c.slug, c.name, c.description, c.created_at
            ORDER BY c.name
        "#;
        let categories = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, CategoryWithCount>(sql).fetch_all(conn).await
        })
        .context("Failed to list categories")?;

        Ok(categories)
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE categories SET slug = ?, name = ?, description = ? WHERE id = ?")
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.id)
                .execute(conn)
                .await
                .map(|_| ())
        })
        .context("Failed to update category")?;

        Ok(category.clone())
    }

    async fn delete_reassigning(&self, id: i64, fallback_id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            async {
                let mut tx = conn.begin().await?;
                sqlx::query("UPDATE listings SET category_id = ? WHERE category_id = ?")
                    .bind(fallback_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM categories WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await
            }
            .await
        })
        .context("Failed to delete category")?;

        Ok(())
    }

    async fn name_taken(&self, name: &str, except_id: Option<i64>) -> Result<bool> {
        let count: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM categories WHERE LOWER(name) = LOWER(?) AND (? IS NULL OR id <> ?)",
            )
            .bind(name)
            .bind(except_id)
            .bind(except_id)
            .fetch_one(conn)
            .await
        })
        .context("Failed to check category name")?;

        Ok(count > 0)
    }

    async fn slug_taken(&self, slug: &str, except_id: Option<i64>) -> Result<bool> {
        let count: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM categories WHERE slug = ? AND (? IS NULL OR id <> ?)",
            )
            .bind(slug)
            .bind(except_id)
            .bind(except_id)
            .fetch_one(conn)
            .await
        })
        .context("Failed to check category slug")?;

        Ok(count > 0)
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM categories WHERE id IN ({})",
            placeholders
        );
        let count: i64 = on_pool!(self.pool, conn => {
            let mut query = sqlx::query_scalar(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query.fetch_one(conn).await
        })
        .context("Failed to count categories")?;

        Ok(count as usize)
    }

    async fn get_default(&self) -> Result<Option<Category>> {
        self.get_by_slug(DEFAULT_CATEGORY_SLUG).await
    }
}
