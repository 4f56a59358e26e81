//! Listing repository
//!
//! Database operations for sponsorship listings.

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ListParams, Listing, ListingFilter, ListingStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const LISTING_COLUMNS: &str = "id, owner_id, category_id, title, description, location, \
     audience_size, price, status, event_date, image, created_at, updated_at";

/// Escape character for LIKE patterns; `\` is itself an escape in MySQL literals
const LIKE_ESCAPE: char = '!';

/// Shared WHERE clause for public search. Each optional filter is bound
/// twice (or three times for `q`) so a NULL disables it.
const PUBLIC_FILTER: &str = r#"
    status = 'active'
    AND (? IS NULL OR category_id = (SELECT c.id FROM categories c WHERE c.slug = ?))
    AND (? IS NULL OR (LOWER(title) LIKE ? ESCAPE '!' OR LOWER(description) LIKE ? ESCAPE '!'))
    AND (? IS NULL OR LOWER(location) LIKE ? ESCAPE '!')
    AND (? IS NULL OR price >= ?)
    AND (? IS NULL OR price <= ?)
"#;

/// Listing repository trait
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Create a new listing
    async fn create(&self, listing: &Listing) -> Result<Listing>;

    /// Get listing by ID regardless of status
    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>>;

    /// Update a listing
    async fn update(&self, listing: &Listing) -> Result<Listing>;

    /// Delete a listing
    async fn delete(&self, id: i64) -> Result<()>;

    /// Search active listings, newest first
    async fn list_public(
        &self,
        filter: &ListingFilter,
        params: &ListParams,
    ) -> Result<(Vec<Listing>, i64)>;

    /// All listings of an owner in every status, newest first
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Listing>>;

    /// Every active listing, newest first
    async fn list_active(&self) -> Result<Vec<Listing>>;

    /// Number of listings per status
    async fn count_by_status(&self) -> Result<HashMap<ListingStatus, i64>>;
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: i64,
    owner_id: i64,
    category_id: i64,
    title: String,
    description: String,
    location: Option<String>,
    audience_size: i64,
    price: i64,
    status: String,
    event_date: Option<DateTime<Utc>>,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = anyhow::Error;

    fn try_from(row: ListingRow) -> Result<Self> {
        Ok(Listing {
            id: row.id,
            owner_id: row.owner_id,
            category_id: row.category_id,
            title: row.title,
            description: row.description,
            location: row.location,
            audience_size: row.audience_size,
            price: row.price,
            status: row.status.parse()?,
            event_date: row.event_date,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_listings(rows: Vec<ListingRow>) -> Result<Vec<Listing>> {
    rows.into_iter().map(Listing::try_from).collect()
}

/// `%term%` substring pattern with LIKE metacharacters escaped, or None
/// for a blank term
///
/// Only ASCII is folded, matching SQLite's `LOWER()`. Non-ASCII letters
/// must match case exactly on SQLite; MySQL collations fold them anyway.
fn like_pattern(term: &Option<String>) -> Option<String> {
    let term = term.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c.to_ascii_lowercase());
    }
    pattern.push('%');
    Some(pattern)
}

/// SQLx-based listing repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxListingRepository {
    pool: DynDatabasePool,
}

impl SqlxListingRepository {
    /// Create a new SQLx listing repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ListingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ListingRepository for SqlxListingRepository {
    async fn create(&self, listing: &Listing) -> Result<Listing> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO listings (owner_id, category_id, title, description, location,
                audience_size, price, status, event_date, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(listing.owner_id)
                .bind(listing.category_id)
                .bind(&listing.title)
                .bind(&listing.description)
                .bind(&listing.location)
                .bind(listing.audience_size)
                .bind(listing.price)
                .bind(listing.status.to_string())
                .bind(listing.event_date)
                .bind(&listing.image)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create listing")?;

        Ok(Listing {
            id,
            created_at: now,
            updated_at: now,
            ..listing.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>> {
        let sql = format!("SELECT {} FROM listings WHERE id = ?", LISTING_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ListingRow>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get listing by ID")?;

        row.map(Listing::try_from).transpose()
    }

    async fn update(&self, listing: &Listing) -> Result<Listing> {
        let now = Utc::now();
        let sql = r#"
            UPDATE listings
            SET category_id = ?, title = ?, description = ?, location = ?, audience_size = ?,
                price = ?, status = ?, event_date = ?, image = ?, updated_at = ?
            WHERE id = ?
        "#;

        on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(listing.category_id)
                .bind(&listing.title)
                .bind(&listing.description)
                .bind(&listing.location)
                .bind(listing.audience_size)
                .bind(listing.price)
                .bind(listing.status.to_string())
                .bind(listing.event_date)
                .bind(&listing.image)
                .bind(now)
                .bind(listing.id)
                .execute(conn)
                .await
                .map(|_| ())
        })
        .context("Failed to update listing")?;

        Ok(Listing {
            updated_at: now,
            ..listing.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM listings WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .map(|_| ())
        })
        .context("Failed to delete listing")?;

        Ok(())
    }

    async fn list_public(
        &self,
        filter: &ListingFilter,
        params: &ListParams,
    ) -> Result<(Vec<Listing>, i64)> {
        let category = filter
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let q = like_pattern(&filter.q);
        let location = like_pattern(&filter.location);

        let sql = format!(
            "SELECT {} FROM listings WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            LISTING_COLUMNS, PUBLIC_FILTER
        );
        let count_sql = format!("SELECT COUNT(*) FROM listings WHERE {}", PUBLIC_FILTER);

        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ListingRow>(&sql)
                .bind(&category)
                .bind(&category)
                .bind(&q)
                .bind(&q)
                .bind(&q)
                .bind(&location)
                .bind(&location)
                .bind(filter.min_price)
                .bind(filter.min_price)
                .bind(filter.max_price)
                .bind(filter.max_price)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
        })
        .context("Failed to search listings")?;

        let total: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar(&count_sql)
                .bind(&category)
                .bind(&category)
                .bind(&q)
                .bind(&q)
                .bind(&q)
                .bind(&location)
                .bind(&location)
                .bind(filter.min_price)
                .bind(filter.min_price)
                .bind(filter.max_price)
                .bind(filter.max_price)
                .fetch_one(conn)
                .await
        })
        .context("Failed to count listings")?;

        Ok((rows_to_listings(rows)?, total))
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
            LISTING_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ListingRow>(&sql).bind(owner_id).fetch_all(conn).await
        })
        .context("Failed to list listings by owner")?;

        rows_to_listings(rows)
    }

    async fn list_active(&self) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE status = 'active' ORDER BY created_at DESC, id DESC",
            LISTING_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ListingRow>(&sql).fetch_all(conn).await
        })
        .context("Failed to list active listings")?;

        rows_to_listings(rows)
    }

    async fn count_by_status(&self) -> Result<HashMap<ListingStatus, i64>> {
        let rows: Vec<(String, i64)> = on_pool!(self.pool, conn => {
            sqlx::query_as("SELECT status, COUNT(*) FROM listings GROUP BY status")
                .fetch_all(conn)
                .await
        })
        .context("Failed to count listings by status")?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            counts.insert(status.parse::<ListingStatus>()?, count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    async fn setup() -> (SqlxListingRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let owner = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "creator@example.com".to_string(),
                "Creator".to_string(),
                "hash".to_string(),
                UserRole::Creator,
            ))
            .await
            .expect("Failed to create owner");

        (SqlxListingRepository::new(pool), owner.id)
    }

    fn new_listing(owner_id: i64, title: &str, category_id: i64, price: i64) -> Listing {
        let now = Utc::now();
        Listing {
            id: 0,
            owner_id,
            category_id,
            title: title.to_string(),
            description: format!("{} description", title),
            location: Some("Austin, TX".to_string()),
            audience_size: 500,
            price,
            status: ListingStatus::Active,
            event_date: None,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, owner_id) = setup().await;

        let created = repo
            .create(&new_listing(owner_id, "Spring Fair", 1, 25_000))
            .await
            .unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Spring Fair");
        assert_eq!(found.price, 25_000);
        assert_eq!(found.status, ListingStatus::Active);
        assert!(repo.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (repo, owner_id) = setup().await;
        let mut listing = repo
            .create(&new_listing(owner_id, "Spring Fair", 1, 25_000))
            .await
            .unwrap();

        listing.status = ListingStatus::Closed;
        listing.price = 30_000;
        repo.update(&listing).await.unwrap();
        let found = repo.get_by_id(listing.id).await.unwrap().unwrap();
        assert_eq!(found.status, ListingStatus::Closed);
        assert_eq!(found.price, 30_000);

        repo.delete(listing.id).await.unwrap();
        assert!(repo.get_by_id(listing.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_public_only_active() {
        let (repo, owner_id) = setup().await;
        repo.create(&new_listing(owner_id, "Visible", 1, 100))
            .await
            .unwrap();
        let mut draft = new_listing(owner_id, "Hidden", 1, 100);
        draft.status = ListingStatus::Draft;
        repo.create(&draft).await.unwrap();

        let (items, total) = repo
            .list_public(&ListingFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "Visible");

        assert_eq!(repo.list_by_owner(owner_id).await.unwrap().len(), 2);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_public_filters() {
        let (repo, owner_id) = setup().await;
        // category 2 = sports, 3 = music in seed order
        repo.create(&new_listing(owner_id, "Marathon Sponsorship", 2, 50_000))
            .await
            .unwrap();
        repo.create(&new_listing(owner_id, "Jazz Night", 3, 10_000))
            .await
            .unwrap();
        let mut remote = new_listing(owner_id, "Podcast Ads", 3, 5_000);
        remote.location = Some("Denver, CO".to_string());
        repo.create(&remote).await.unwrap();

        let by_category = ListingFilter {
            category: Some("music".to_string()),
            ..Default::default()
        };
        let (_, total) = repo
            .list_public(&by_category, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 2);

        let by_text = ListingFilter {
            q: Some("MARATHON".to_string()),
            ..Default::default()
        };
        let (items, _) = repo.list_public(&by_text, &ListParams::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Marathon Sponsorship");

        let by_location = ListingFilter {
            location: Some("denver".to_string()),
            ..Default::default()
        };
        let (items, _) = repo
            .list_public(&by_location, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let by_price = ListingFilter {
            min_price: Some(6_000),
            max_price: Some(20_000),
            ..Default::default()
        };
        let (items, _) = repo.list_public(&by_price, &ListParams::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Jazz Night");

        let unknown_category = ListingFilter {
            category: Some("nope".to_string()),
            ..Default::default()
        };
        let (items, _) = repo
            .list_public(&unknown_category, &ListParams::default())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(&None), None);
        assert_eq!(like_pattern(&Some("  ".to_string())), None);
        assert_eq!(like_pattern(&Some(" Jazz ".to_string())), Some("%jazz%".to_string()));
        assert_eq!(
            like_pattern(&Some("50%_off!".to_string())),
            Some("%50!%!_off!!%".to_string())
        );
        assert_eq!(like_pattern(&Some("CAFÉ".to_string())), Some("%cafÉ%".to_string()));
    }

    #[tokio::test]
    async fn test_list_public_text_is_literal() {
        let (repo, owner_id) = setup().await;
        repo.create(&new_listing(owner_id, "Jazz Night", 3, 10_000))
            .await
            .unwrap();
        repo.create(&new_listing(owner_id, "Summer Cup", 2, 10_000))
            .await
            .unwrap();
        repo.create(&new_listing(owner_id, "100% Local_Fest!", 1, 10_000))
            .await
            .unwrap();
        repo.create(&new_listing(owner_id, "CAFÉ Crawl", 1, 10_000))
            .await
            .unwrap();

        let search = |q: &str| ListingFilter {
            q: Some(q.to_string()),
            ..Default::default()
        };
        let params = ListParams::default();

        let (items, _) = repo.list_public(&search("_"), &params).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "100% Local_Fest!");

        let (_, total) = repo.list_public(&search("z_n"), &params).await.unwrap();
        assert_eq!(total, 0);

        let (_, total) = repo.list_public(&search("%"), &params).await.unwrap();
        assert_eq!(total, 1);

        let (_, total) = repo.list_public(&search("fest!"), &params).await.unwrap();
        assert_eq!(total, 1);

        // non-ASCII text finds itself
        let (items, _) = repo.list_public(&search("CAFÉ"), &params).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "CAFÉ Crawl");
        let (_, total) = repo.list_public(&search("cafÉ crawl"), &params).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_list_public_pagination_newest_first() {
        let (repo, owner_id) = setup().await;
        for i in 0..5 {
            repo.create(&new_listing(owner_id, &format!("Listing {}", i), 1, 100))
                .await
                .unwrap();
        }

        let (items, total) = repo
            .list_public(&ListingFilter::default(), &ListParams::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Listing 4");
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let (repo, owner_id) = setup().await;
        repo.create(&new_listing(owner_id, "A", 1, 100)).await.unwrap();
        let mut closed = new_listing(owner_id, "B", 1, 100);
        closed.status = ListingStatus::Closed;
        repo.create(&closed).await.unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&ListingStatus::Active), Some(&1));
        assert_eq!(counts.get(&ListingStatus::Closed), Some(&1));
    }
}
