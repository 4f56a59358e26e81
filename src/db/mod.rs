//! Database layer
//!
//! Storage for users, listings, applications, conversations and payments.
//! Two backends are supported behind the `DatabasePool` trait:
//! - SQLite (default, single file next to the binary)
//! - MySQL (for larger deployments)
//!
//! # Usage
//!
//! ```ignore
//! use blitz::config::DatabaseConfig;
//! use blitz::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

/// Run the same query code against whichever backend the pool wraps.
///
/// `$conn` is bound to the concrete `SqlitePool` or `MySqlPool`, and `$body`
/// is expanded once per backend so sqlx can type-check each arm. Must be used
/// inside a function returning `anyhow::Result`.
macro_rules! on_pool {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| anyhow::anyhow!("SQLite pool is not available"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool
                    .as_mysql()
                    .ok_or_else(|| anyhow::anyhow!("MySQL pool is not available"))?;
                $body
            }
        }
    };
}

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, InsertId, MysqlDatabase,
    SqliteDatabase,
};

/// Whether a database error is a unique-constraint violation
///
/// Used to turn races on unique columns into conflicts instead of
/// internal errors.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
    })
}
