//! Database migrations module
//!
//! All migrations are embedded in the binary as SQL strings, one variant for
//! SQLite and one for MySQL, and applied in version order at startup.
//!
//! # Usage
//!
//! ```ignore
//! use blitz::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is a `Migration` struct containing:
//! - `version`: Unique version number for ordering
//! - `name`: Human-readable migration name
//! - `up_sqlite`: SQL for SQLite database
//! - `up_mysql`: SQL for MySQL database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All schema migrations, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'sponsor',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                bio TEXT,
                location VARCHAR(255),
                website VARCHAR(255),
                avatar VARCHAR(500),
                company_name VARCHAR(255),
                audience_size BIGINT NOT NULL DEFAULT 0,
                budget_min BIGINT,
                budget_max BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'sponsor',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                bio TEXT,
                location VARCHAR(255),
                website VARCHAR(255),
                avatar VARCHAR(500),
                company_name VARCHAR(255),
                audience_size BIGINT NOT NULL DEFAULT 0,
                budget_min BIGINT,
                budget_max BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT OR IGNORE INTO categories (slug, name, description) VALUES
                ('general', 'General', 'Opportunities that do not fit another category'),
                ('sports', 'Sports', 'Teams, tournaments and athletic events'),
                ('music', 'Music', 'Concerts, festivals and artists'),
                ('arts', 'Arts', 'Exhibitions, theatre and creative projects'),
                ('community', 'Community', 'Local gatherings, charities and clubs'),
                ('education', 'Education', 'Workshops, schools and courses'),
                ('food-drink', 'Food & Drink', 'Markets, tastings and food creators'),
                ('technology', 'Technology', 'Meetups, hackathons and tech creators');
            CREATE TABLE IF NOT EXISTS user_interests (
                user_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, category_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT IGNORE INTO categories (slug, name, description) VALUES
                ('general', 'General', 'Opportunities that do not fit another category'),
                ('sports', 'Sports', 'Teams, tournaments and athletic events'),
                ('music', 'Music', 'Concerts, festivals and artists'),
                ('arts', 'Arts', 'Exhibitions, theatre and creative projects'),
                ('community', 'Community', 'Local gatherings, charities and clubs'),
                ('education', 'Education', 'Workshops, schools and courses'),
                ('food-drink', 'Food & Drink', 'Markets, tastings and food creators'),
                ('technology', 'Technology', 'Meetups, hackathons and tech creators');
            CREATE TABLE IF NOT EXISTS user_interests (
                user_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (user_id, category_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_listings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                location VARCHAR(255),
                audience_size BIGINT NOT NULL DEFAULT 0,
                price BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                event_date TIMESTAMP,
                image VARCHAR(500),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            CREATE INDEX IF NOT EXISTS idx_listings_owner_id ON listings(owner_id);
            CREATE INDEX IF NOT EXISTS idx_listings_category_id ON listings(category_id);
            CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS listings (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                location VARCHAR(255),
                audience_size BIGINT NOT NULL DEFAULT 0,
                price BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                event_date DATETIME NULL,
                image VARCHAR(500),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            CREATE INDEX idx_listings_owner_id ON listings(owner_id);
            CREATE INDEX idx_listings_category_id ON listings(category_id);
            CREATE INDEX idx_listings_status ON listings(status);
        "#,
    },
    Migration {
        version: 5,
        name: "create_applications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id INTEGER NOT NULL,
                sponsor_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                offer_amount BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (listing_id, sponsor_id),
                FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE CASCADE,
                FOREIGN KEY (sponsor_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_applications_sponsor_id ON applications(sponsor_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS applications (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                listing_id BIGINT NOT NULL,
                sponsor_id BIGINT NOT NULL,
                message TEXT NOT NULL,
                offer_amount BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_applications_listing_sponsor (listing_id, sponsor_id),
                FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE CASCADE,
                FOREIGN KEY (sponsor_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_applications_sponsor_id ON applications(sponsor_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_conversations",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS participants (
                conversation_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                last_read_message_id BIGINT NOT NULL DEFAULT 0,
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (conversation_id, user_id),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_participants_user_id ON participants(user_id);
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                sender_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id, id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                listing_id BIGINT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS participants (
                conversation_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                last_read_message_id BIGINT NOT NULL DEFAULT 0,
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (conversation_id, user_id),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_participants_user_id ON participants(user_id);
            CREATE TABLE IF NOT EXISTS messages (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                conversation_id BIGINT NOT NULL,
                sender_id BIGINT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_messages_conversation_id ON messages(conversation_id, id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_payments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL,
                payer_id INTEGER NOT NULL,
                payee_id INTEGER NOT NULL,
                amount BIGINT NOT NULL,
                platform_fee BIGINT NOT NULL,
                processing_fee BIGINT NOT NULL,
                total_charged BIGINT NOT NULL,
                payout_amount BIGINT NOT NULL,
                currency VARCHAR(10) NOT NULL DEFAULT 'usd',
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                processor_ref VARCHAR(255),
                failure_reason TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP,
                FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE,
                FOREIGN KEY (payer_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (payee_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_payments_application_id ON payments(application_id);
            CREATE INDEX IF NOT EXISTS idx_payments_payer_id ON payments(payer_id);
            CREATE INDEX IF NOT EXISTS idx_payments_payee_id ON payments(payee_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS payments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                application_id BIGINT NOT NULL,
                payer_id BIGINT NOT NULL,
                payee_id BIGINT NOT NULL,
                amount BIGINT NOT NULL,
                platform_fee BIGINT NOT NULL,
                processing_fee BIGINT NOT NULL,
                total_charged BIGINT NOT NULL,
                payout_amount BIGINT NOT NULL,
                currency VARCHAR(10) NOT NULL DEFAULT 'usd',
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                processor_ref VARCHAR(255),
                failure_reason TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME NULL,
                FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE,
                FOREIGN KEY (payer_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (payee_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_payments_application_id ON payments(application_id);
            CREATE INDEX idx_payments_payer_id ON payments(payer_id);
            CREATE INDEX idx_payments_payee_id ON payments(payee_id);
        "#,
    },
];

/// Run all pending migrations
///
/// Creates the `_migrations` tracking table if needed, then applies every
/// migration that has not been recorded yet, in version order.
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Get list of already applied migrations
pub async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let sql = "SELECT version, name, applied_at FROM _migrations ORDER BY version";
    let records = on_pool!(pool, conn => {
        sqlx::query_as::<_, MigrationRecord>(sql).fetch_all(conn).await
    })
    .context("Failed to read applied migrations")?;

    Ok(records)
}

/// Apply a single migration and record it
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    on_pool!(pool, conn => {
        sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(conn)
            .await
            .map(|_| ())
    })
    .context("Failed to record migration")?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::Row;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &DynDatabasePool, email: &str, role: &str) -> i64 {
        sqlx::query("INSERT INTO users (email, name, password_hash, role) VALUES (?, ?, ?, ?)")
            .bind(email)
            .bind("Test")
            .bind("hash")
            .bind(role)
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to insert user")
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_applied_migrations_recorded_in_order() {
        let pool = migrated_pool().await;
        let records = get_applied_migrations(&pool).await.unwrap();

        let versions: Vec<i64> = records.iter().map(|r| r.version).collect();
        let expected: Vec<i64> = MIGRATIONS.iter().map(|m| m.version as i64).collect();
        assert_eq!(versions, expected);
        assert_eq!(records[0].name, "create_users");
    }

    #[tokio::test]
    async fn test_default_categories_seeded() {
        let pool = migrated_pool().await;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM categories WHERE slug = 'general'")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 1);

        let row = sqlx::query("SELECT COUNT(*) AS n FROM categories")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 8);
    }

    #[tokio::test]
    async fn test_unique_email() {
        let pool = migrated_pool().await;
        insert_user(&pool, "a@example.com", "sponsor").await;

        let result = sqlx::query(
            "INSERT INTO users (email, name, password_hash, role) VALUES (?, ?, ?, ?)",
        )
        .bind("a@example.com")
        .bind("Other")
        .bind("hash")
        .bind("creator")
        .execute(pool.as_sqlite().unwrap())
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_foreign_key_constraints() {
        let pool = migrated_pool().await;

        let result = sqlx::query(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, datetime('now', '+1 day'))",
        )
        .bind("session123")
        .bind(999i64)
        .execute(pool.as_sqlite().unwrap())
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_one_application_per_sponsor_and_listing() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let creator = insert_user(&pool, "creator@example.com", "creator").await;
        let sponsor = insert_user(&pool, "sponsor@example.com", "sponsor").await;

        let listing_id = sqlx::query(
            "INSERT INTO listings (owner_id, category_id, title, description, price) VALUES (?, 1, 'Gig', 'Desc', 1000)",
        )
        .bind(creator)
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();

        let insert = move || {
            sqlx::query(
                "INSERT INTO applications (listing_id, sponsor_id, message, offer_amount) VALUES (?, ?, 'hi', 500)",
            )
            .bind(listing_id)
            .bind(sponsor)
            .execute(sqlite)
        };

        insert().await.expect("first application should insert");
        assert!(insert().await.is_err());
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_sessions() {
        let pool = migrated_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let user = insert_user(&pool, "gone@example.com", "sponsor").await;

        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ('s1', ?, datetime('now', '+1 day'))")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(sqlite)
            .await
            .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n  -- just a comment\n;\nCREATE TABLE b (id INT)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- comment\n   -- another"));
        assert!(!is_comment_only("-- comment\nSELECT 1"));
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
    }
}
