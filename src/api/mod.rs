//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints of the marketplace.
//! It includes:
//! - Auth and profile endpoints
//! - Category, listing and application endpoints
//! - Matching endpoints
//! - Messaging endpoints
//! - Payment endpoints
//! - Upload, admin and health endpoints

pub mod admin;
pub mod applications;
pub mod auth;
pub mod categories;
pub mod common;
pub mod conversations;
pub mod health;
pub mod listings;
pub mod matches;
pub mod middleware;
pub mod payments;
pub mod profile;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser, RequestStats};

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let upload_limit = usize::try_from(state.upload_config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/profile", profile::protected_router())
        .nest(
            "/upload",
            upload::router().layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/listings", post(listings::create_listing))
        .route("/listings/mine", get(listings::my_listings))
        .route(
            "/listings/{id}",
            put(listings::update_listing).delete(listings::delete_listing),
        )
        .route(
            "/listings/{id}/applications",
            post(applications::apply).get(applications::list_for_listing),
        )
        .route("/applications", get(applications::list_mine))
        .route("/applications/{id}/status", put(applications::decide))
        .route("/applications/{id}/withdraw", post(applications::withdraw))
        .route("/matches", get(matches::listing_matches))
        .route("/sponsor-matches", get(matches::sponsor_matches))
        .route(
            "/conversations",
            post(conversations::start_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversations::list_messages).post(conversations::post_message),
        )
        .route("/messages/unread-count", get(conversations::unread_count))
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/{id}", get(payments::get_payment))
        .route("/payments/{id}/confirm", post(payments::confirm_payment))
        .route("/payments/{id}/cancel", post(payments::cancel_payment))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes that show more to a logged-in owner
    let viewer_routes = Router::new()
        .route("/listings/{id}", get(listings::get_listing))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    // Public routes
    Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::public_router())
        .nest("/categories", categories::router())
        .nest("/users", profile::public_router())
        .route("/listings", get(listings::list_listings))
        .route("/payments/quote", get(payments::quote))
        .merge(viewer_routes)
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // Credentialed CORS needs an exact origin
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}, cross-origin requests disabled", cors_origin);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/uploads", ServeDir::new(&state.upload_config.path))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}
