//! User repository
//!
//! Database operations for users and their category interests.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Category, ListParams, User, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, email, name, password_hash, role, status, bio, location, \
     website, avatar, company_name, audience_size, budget_min, budget_max, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (expects the normalized lowercase form)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update every mutable column of a user
    async fn update(&self, user: &User) -> Result<User>;

    /// Set only the account status
    async fn set_status(&self, id: i64, status: UserStatus) -> Result<bool>;

    /// List all users, newest first
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Active users with the given role
    async fn list_active_by_role(&self, role: UserRole) -> Result<Vec<User>>;

    /// Number of users per role
    async fn count_by_role(&self) -> Result<HashMap<UserRole, i64>>;

    /// Categories a user is interested in, ordered by name
    async fn get_interests(&self, user_id: i64) -> Result<Vec<Category>>;

    /// Category ids of a user's interests
    async fn get_interest_ids(&self, user_id: i64) -> Result<Vec<i64>>;

    /// Interest category ids for every user with the given role
    async fn interest_map(&self, role: UserRole) -> Result<HashMap<i64, Vec<i64>>>;

    /// Replace a user's interests
    async fn set_interests(&self, user_id: i64, category_ids: &[i64]) -> Result<()>;
}

/// Raw `users` row; role and status are text columns
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    status: String,
    bio: Option<String>,
    location: Option<String>,
    website: Option<String>,
    avatar: Option<String>,
    company_name: Option<String>,
    audience_size: i64,
    budget_min: Option<i64>,
    budget_max: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            status: row.status.parse()?,
            bio: row.bio,
            location: row.location,
            website: row.website,
            avatar: row.avatar,
            company_name: row.company_name,
            audience_size: row.audience_size,
            budget_min: row.budget_min,
            budget_max: row.budget_max,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_users(rows: Vec<UserRow>) -> Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO users (email, name, password_hash, role, status, bio, location, website,
                avatar, company_name, audience_size, budget_min, budget_max, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&user.email)
                .bind(&user.name)
                .bind(&user.password_hash)
                .bind(user.role.to_string())
                .bind(user.status.to_string())
                .bind(&user.bio)
                .bind(&user.location)
                .bind(&user.website)
                .bind(&user.avatar)
                .bind(&user.company_name)
                .bind(user.audience_size)
                .bind(user.budget_min)
                .bind(user.budget_max)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create user")?;

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get user by ID")?;

        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql).bind(email).fetch_optional(conn).await
        })
        .context("Failed to get user by email")?;

        row.map(User::try_from).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let sql = r#"
            UPDATE users
            SET email = ?, name = ?, password_hash = ?, role = ?, status = ?, bio = ?,
                location = ?, website = ?, avatar = ?, company_name = ?, audience_size = ?,
                budget_min = ?, budget_max = ?, updated_at = ?
            WHERE id = ?
        "#;

        on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&user.email)
                .bind(&user.name)
                .bind(&user.password_hash)
                .bind(user.role.to_string())
                .bind(user.status.to_string())
                .bind(&user.bio)
                .bind(&user.location)
                .bind(&user.website)
                .bind(&user.avatar)
                .bind(&user.company_name)
                .bind(user.audience_size)
                .bind(user.budget_min)
                .bind(user.budget_max)
                .bind(now)
                .bind(user.id)
                .execute(conn)
                .await
                .map(|_| ())
        })
        .context("Failed to update user")?;

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    async fn set_status(&self, id: i64, status: UserStatus) -> Result<bool> {
        let affected = on_pool!(self.pool, conn => {
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.to_string())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to update user status")?;

        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
        })
        .context("Failed to list users")?;

        let total: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(conn).await
        })
        .context("Failed to count users")?;

        Ok((rows_to_users(rows)?, total))
    }

    async fn list_active_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = ? AND status = 'active' ORDER BY id",
            USER_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(role.to_string())
                .fetch_all(conn)
                .await
        })
        .context("Failed to list users by role")?;

        rows_to_users(rows)
    }

    async fn count_by_role(&self) -> Result<HashMap<UserRole, i64>> {
        let rows: Vec<(String, i64)> = on_pool!(self.pool, conn => {
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
                .fetch_all(conn)
                .await
        })
        .context("Failed to count users by role")?;

        let mut counts = HashMap::new();
        for (role, count) in rows {
            counts.insert(role.parse::<UserRole>()?, count);
        }
        Ok(counts)
    }

    async fn get_interests(&self, user_id: i64) -> Result<Vec<Category>> {
        let sql = r#"
            SELECT c.id, c.slug, c.name, c.description, c.created_at
            FROM categories c
            INNER JOIN user_interests ui ON ui.category_id = c.id
            WHERE ui.user_id = ?
            ORDER BY c.name
        "#;
        let categories = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Category>(sql).bind(user_id).fetch_all(conn).await
        })
        .context("Failed to get user interests")?;

        Ok(categories)
    }

    async fn get_interest_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids = on_pool!(self.pool, conn => {
            sqlx::query_scalar(
                "SELECT category_id FROM user_interests WHERE user_id = ? ORDER BY category_id",
            )
            .bind(user_id)
            .fetch_all(conn)
            .await
        })
        .context("Failed to get user interest ids")?;

        Ok(ids)
    }

    async fn interest_map(&self, role: UserRole) -> Result<HashMap<i64, Vec<i64>>> {
        let sql = r#"
            SELECT ui.user_id, ui.category_id
            FROM user_interests ui
            INNER JOIN users u ON u.id = ui.user_id
            WHERE u.role = ?
        "#;
        let pairs: Vec<(i64, i64)> = on_pool!(self.pool, conn => {
            sqlx::query_as(sql).bind(role.to_string()).fetch_all(conn).await
        })
        .context("Failed to load interests")?;

        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for (user_id, category_id) in pairs {
            map.entry(user_id).or_default().push(category_id);
        }
        Ok(map)
    }

    async fn set_interests(&self, user_id: i64, category_ids: &[i64]) -> Result<()> {
        on_pool!(self.pool, conn => {
            async {
                let mut tx = conn.begin().await?;
                sqlx::query("DELETE FROM user_interests WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                for category_id in category_ids {
                    sqlx::query("INSERT INTO user_interests (user_id, category_id) VALUES (?, ?)")
                        .bind(user_id)
                        .bind(*category_id)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await
            }
            .await
        })
        .context("Failed to set user interests")?;

        Ok(())
    }
}
