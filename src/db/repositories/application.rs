//! Application repository
//!
//! Database operations for sponsor applications to listings.

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Application, ApplicationDetail, ApplicationStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const APPLICATION_COLUMNS: &str =
    "id, listing_id, sponsor_id, message, offer_amount, status, created_at, updated_at";

const DETAIL_SELECT: &str = r#"
    SELECT a.id, a.listing_id, a.sponsor_id, a.message, a.offer_amount, a.status,
        a.created_at, a.updated_at, l.title AS listing_title, l.owner_id,
        u.name AS sponsor_name, u.company_name AS sponsor_company
    FROM applications a
    INNER JOIN listings l ON l.id = a.listing_id
    INNER JOIN users u ON u.id = a.sponsor_id
"#;

/// Application repository trait
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Create a new application
    async fn create(&self, application: &Application) -> Result<Application>;

    /// Get application by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Application>>;

    /// Get application with listing and sponsor details
    async fn get_detail(&self, id: i64) -> Result<Option<ApplicationDetail>>;

    /// Find the application a sponsor sent to a listing
    async fn find_by_listing_and_sponsor(
        &self,
        listing_id: i64,
        sponsor_id: i64,
    ) -> Result<Option<Application>>;

    /// Applications to one listing, newest first
    async fn list_for_listing(&self, listing_id: i64) -> Result<Vec<ApplicationDetail>>;

    /// Applications sent by a sponsor, newest first
    async fn list_by_sponsor(&self, sponsor_id: i64) -> Result<Vec<ApplicationDetail>>;

    /// Applications received on any listing of an owner, newest first
    async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<ApplicationDetail>>;

    /// Move an application from `from` to `to`.
    ///
    /// Returns false when the row was no longer in `from`, so concurrent
    /// transitions cannot both succeed.
    async fn transition(
        &self,
        id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool>;

    /// Listing ids a sponsor has applied to
    async fn listing_ids_by_sponsor(&self, sponsor_id: i64) -> Result<HashSet<i64>>;

    /// Number of applications sent, per sponsor
    async fn count_per_sponsor(&self) -> Result<HashMap<i64, i64>>;

    /// Number of applications per status
    async fn count_by_status(&self) -> Result<HashMap<ApplicationStatus, i64>>;
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    listing_id: i64,
    sponsor_id: i64,
    message: String,
    offer_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = anyhow::Error;

    fn try_from(row: ApplicationRow) -> Result<Self> {
        Ok(Application {
            id: row.id,
            listing_id: row.listing_id,
            sponsor_id: row.sponsor_id,
            message: row.message,
            offer_amount: row.offer_amount,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationDetailRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    listing_title: String,
    owner_id: i64,
    sponsor_name: String,
    sponsor_company: Option<String>,
}

impl TryFrom<ApplicationDetailRow> for ApplicationDetail {
    type Error = anyhow::Error;

    fn try_from(row: ApplicationDetailRow) -> Result<Self> {
        Ok(ApplicationDetail {
            application: row.application.try_into()?,
            listing_title: row.listing_title,
            owner_id: row.owner_id,
            sponsor_name: row.sponsor_name,
            sponsor_company: row.sponsor_company,
        })
    }
}

fn rows_to_details(rows: Vec<ApplicationDetailRow>) -> Result<Vec<ApplicationDetail>> {
    rows.into_iter().map(ApplicationDetail::try_from).collect()
}

/// SQLx-based application repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxApplicationRepository {
    pool: DynDatabasePool,
}

impl SqlxApplicationRepository {
    /// Create a new SQLx application repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApplicationRepository> {
        Arc::new(Self::new(pool))
    }

    async fn details_where(&self, clause: &str, id: i64) -> Result<Vec<ApplicationDetail>> {
        let sql = format!(
            "{} WHERE {} ORDER BY a.created_at DESC, a.id DESC",
            DETAIL_SELECT, clause
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ApplicationDetailRow>(&sql).bind(id).fetch_all(conn).await
        })
        .context("Failed to list applications")?;

        rows_to_details(rows)
    }
}

#[async_trait]
impl ApplicationRepository for SqlxApplicationRepository {
    async fn create(&self, application: &Application) -> Result<Application> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO applications (listing_id, sponsor_id, message, offer_amount, status,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(application.listing_id)
                .bind(application.sponsor_id)
                .bind(&application.message)
                .bind(application.offer_amount)
                .bind(application.status.to_string())
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create application")?;

        Ok(Application {
            id,
            created_at: now,
            updated_at: now,
            ..application.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Application>> {
        let sql = format!(
            "SELECT {} FROM applications WHERE id = ?",
            APPLICATION_COLUMNS
        );
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ApplicationRow>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get application by ID")?;

        row.map(Application::try_from).transpose()
    }

    async fn get_detail(&self, id: i64) -> Result<Option<ApplicationDetail>> {
        let sql = format!("{} WHERE a.id = ?", DETAIL_SELECT);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ApplicationDetailRow>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get application detail")?;

        row.map(ApplicationDetail::try_from).transpose()
    }

    async fn find_by_listing_and_sponsor(
        &self,
        listing_id: i64,
        sponsor_id: i64,
    ) -> Result<Option<Application>> {
        let sql = format!(
            "SELECT {} FROM applications WHERE listing_id = ? AND sponsor_id = ?",
            APPLICATION_COLUMNS
        );
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ApplicationRow>(&sql)
                .bind(listing_id)
                .bind(sponsor_id)
                .fetch_optional(conn)
                .await
        })
        .context("Failed to find application")?;

        row.map(Application::try_from).transpose()
    }

    async fn list_for_listing(&self, listing_id: i64) -> Result<Vec<ApplicationDetail>> {
        self.details_where("a.listing_id = ?", listing_id).await
    }

    async fn list_by_sponsor(&self, sponsor_id: i64) -> Result<Vec<ApplicationDetail>> {
        self.details_where("a.sponsor_id = ?", sponsor_id).await
    }

    async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<ApplicationDetail>> {
        self.details_where("l.owner_id = ?", owner_id).await
    }

    async fn transition(
        &self,
        id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool> {
        let affected = on_pool!(self.pool, conn => {
            sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.to_string())
                .bind(Utc::now())
                .bind(id)
                .bind(from.to_string())
                .execute(conn)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to update application status")?;

        Ok(affected > 0)
    }

    async fn listing_ids_by_sponsor(&self, sponsor_id: i64) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = on_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT listing_id FROM applications WHERE sponsor_id = ?")
                .bind(sponsor_id)
                .fetch_all(conn)
                .await
        })
        .context("Failed to list applied listings")?;

        Ok(ids.into_iter().collect())
    }

    async fn count_per_sponsor(&self) -> Result<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = on_pool!(self.pool, conn => {
            sqlx::query_as("SELECT sponsor_id, COUNT(*) FROM applications GROUP BY sponsor_id")
                .fetch_all(conn)
                .await
        })
        .context("Failed to count applications per sponsor")?;

        Ok(rows.into_iter().collect())
    }

    async fn count_by_status(&self) -> Result<HashMap<ApplicationStatus, i64>> {
        let rows: Vec<(String, i64)> = on_pool!(self.pool, conn => {
            sqlx::query_as("SELECT status, COUNT(*) FROM applications GROUP BY status")
                .fetch_all(conn)
                .await
        })
        .context("Failed to count applications by status")?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            counts.insert(status.parse::<ApplicationStatus>()?, count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ListingRepository, SqlxListingRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Listing, ListingStatus, User, UserRole};

    struct Fixture {
        repo: SqlxApplicationRepository,
        creator_id: i64,
        sponsor_id: i64,
        listing_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let creator = users
            .create(&User::new(
                "creator@example.com".to_string(),
                "Creator".to_string(),
                "hash".to_string(),
                UserRole::Creator,
            ))
            .await
            .unwrap();
        let mut sponsor = User::new(
            "sponsor@example.com".to_string(),
            "Sponsor".to_string(),
            "hash".to_string(),
            UserRole::Sponsor,
        );
        sponsor.company_name = Some("Corner Bakery".to_string());
        let sponsor = users.create(&sponsor).await.unwrap();

        let now = Utc::now();
        let listing = SqlxListingRepository::new(pool.clone())
            .create(&Listing {
                id: 0,
                owner_id: creator.id,
                category_id: 1,
                title: "Spring Fair".to_string(),
                description: "Local fair".to_string(),
                location: None,
                audience_size: 100,
                price: 10_000,
                status: ListingStatus::Active,
                event_date: None,
                image: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        Fixture {
            repo: SqlxApplicationRepository::new(pool),
            creator_id: creator.id,
            sponsor_id: sponsor.id,
            listing_id: listing.id,
        }
    }

    fn new_application(listing_id: i64, sponsor_id: i64) -> Application {
        let now = Utc::now();
        Application {
            id: 0,
            listing_id,
            sponsor_id,
            message: "We'd love to sponsor".to_string(),
            offer_amount: 8_000,
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let f = setup().await;

        let created = f
            .repo
            .create(&new_application(f.listing_id, f.sponsor_id))
            .await
            .unwrap();
        assert!(created.id > 0);

        let found = f
            .repo
            .find_by_listing_and_sponsor(f.listing_id, f.sponsor_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_is_unique_violation() {
        let f = setup().await;
        let application = new_application(f.listing_id, f.sponsor_id);
        f.repo.create(&application).await.unwrap();

        let err = f.repo.create(&application).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_detail_lists() {
        let f = setup().await;
        let created = f
            .repo
            .create(&new_application(f.listing_id, f.sponsor_id))
            .await
            .unwrap();

        let detail = f.repo.get_detail(created.id).await.unwrap().unwrap();
        assert_eq!(detail.listing_title, "Spring Fair");
        assert_eq!(detail.owner_id, f.creator_id);
        assert_eq!(detail.sponsor_company.as_deref(), Some("Corner Bakery"));

        assert_eq!(f.repo.list_for_listing(f.listing_id).await.unwrap().len(), 1);
        assert_eq!(f.repo.list_by_sponsor(f.sponsor_id).await.unwrap().len(), 1);
        assert_eq!(f.repo.list_for_owner(f.creator_id).await.unwrap().len(), 1);
        assert!(f.repo.list_for_owner(f.sponsor_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let f = setup().await;
        let created = f
            .repo
            .create(&new_application(f.listing_id, f.sponsor_id))
            .await
            .unwrap();

        assert!(f
            .repo
            .transition(created.id, ApplicationStatus::Pending, ApplicationStatus::Accepted)
            .await
            .unwrap());
        // a second transition from pending no longer matches
        assert!(!f
            .repo
            .transition(created.id, ApplicationStatus::Pending, ApplicationStatus::Rejected)
            .await
            .unwrap());

        let found = f.repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.status, ApplicationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_counts() {
        let f = setup().await;
        f.repo
            .create(&new_application(f.listing_id, f.sponsor_id))
            .await
            .unwrap();

        let applied = f.repo.listing_ids_by_sponsor(f.sponsor_id).await.unwrap();
        assert!(applied.contains(&f.listing_id));

        let per_sponsor = f.repo.count_per_sponsor().await.unwrap();
        assert_eq!(per_sponsor.get(&f.sponsor_id), Some(&1));

        let by_status = f.repo.count_by_status().await.unwrap();
        assert_eq!(by_status.get(&ApplicationStatus::Pending), Some(&1));
    }
}
