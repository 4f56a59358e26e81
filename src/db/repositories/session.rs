//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL

use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete all sessions for a user except `keep_id`
    async fn delete_others(&self, user_id: i64, keep_id: &str) -> Result<u64>;

    /// Delete expired sessions
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        on_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(conn)
            .await
            .map(|_| ())
        })
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let session = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Session>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
        })
        .context("Failed to get session")?;

        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .map(|_| ())
        })
        .context("Failed to delete session")?;

        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let deleted = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(conn)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete user sessions")?;

        Ok(deleted)
    }

    async fn delete_others(&self, user_id: i64, keep_id: &str) -> Result<u64> {
        let deleted = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id <> ?")
                .bind(user_id)
                .bind(keep_id)
                .execute(conn)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete other sessions")?;

        Ok(deleted)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let deleted = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(Utc::now())
                .execute(conn)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete expired sessions")?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new(
                "session@example.com".to_string(),
                "Session".to_string(),
                "hash".to_string(),
                UserRole::Sponsor,
            ))
            .await
            .expect("Failed to create user");

        (SqlxSessionRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (repo, user_id) = setup().await;
        let session = Session::issue(user_id, 7);

        repo.create(&session).await.unwrap();
        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();

        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (repo, user_id) = setup().await;
        let session = Session::issue(user_id, 7);
        repo.create(&session).await.unwrap();

        repo.delete(&session.id).await.unwrap();

        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user_and_others() {
        let (repo, user_id) = setup().await;
        let keep = Session::issue(user_id, 7);
        repo.create(&keep).await.unwrap();
        for _ in 0..2 {
            repo.create(&Session::issue(user_id, 7)).await.unwrap();
        }

        assert_eq!(repo.delete_others(user_id, &keep.id).await.unwrap(), 2);
        assert!(repo.get_by_id(&keep.id).await.unwrap().is_some());

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 1);
        assert!(repo.get_by_id(&keep.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (repo, user_id) = setup().await;
        let mut expired = Session::issue(user_id, 7);
        expired.expires_at = Utc::now() - Duration::hours(1);
        let live = Session::issue(user_id, 7);
        repo.create(&expired).await.unwrap();
        repo.create(&live).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&expired.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }
}
