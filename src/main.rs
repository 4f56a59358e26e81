//! Blitz - A sponsorship marketplace

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blitz::{
    api::{self, AppState},
    config::Config,
    db,
};

/// Env vars for the bootstrap admin account
const ADMIN_EMAIL_ENV: &str = "BLITZ_ADMIN_EMAIL";
const ADMIN_PASSWORD_ENV: &str = "BLITZ_ADMIN_PASSWORD";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blitz=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Blitz...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Build application state
    let state = AppState::new(pool, &config);

    // Bootstrap admin account
    match (
        std::env::var(ADMIN_EMAIL_ENV),
        std::env::var(ADMIN_PASSWORD_ENV),
    ) {
        (Ok(email), Ok(password)) => {
            if state.user_service.ensure_admin(&email, &password).await? {
                tracing::info!("Admin account created for {}", email);
            }
        }
        _ => tracing::debug!("No bootstrap admin configured"),
    }

    // Start rate limiter cleanup task (runs every 5 minutes)
    {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    // Start expired session cleanup task (runs hourly)
    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                if let Err(e) = user_service.cleanup_expired_sessions().await {
                    tracing::warn!("Session cleanup failed: {}", e);
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
