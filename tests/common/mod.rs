//! Shared helpers for HTTP integration tests.

#![allow(dead_code)]

use axum_test::TestServer;
use serde_json::{json, Value};

use blitz::api::{build_router, AppState};
use blitz::config::Config;
use blitz::db::{create_test_pool, migrations::run_migrations};

pub const PASSWORD: &str = "correct-horse-battery";
pub const ADMIN_EMAIL: &str = "admin@blitz.test";

/// A server over a fresh in-memory database with a bootstrap admin
pub async fn test_server() -> TestServer {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let state = AppState::new(pool, &Config::default());
    state
        .user_service
        .ensure_admin(ADMIN_EMAIL, PASSWORD)
        .await
        .unwrap();

    TestServer::new(build_router(state, "http://localhost:3000")).unwrap()
}

/// Register an account and return (user id, session token)
pub async fn register(server: &TestServer, email: &str, role: &str) -> (i64, String) {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "email": email,
            "name": email.split('@').next().unwrap_or(email),
            "password": PASSWORD,
            "role": role,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: Value = response.json();
    (
        body["user"]["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

pub async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["token"].as_str().unwrap().to_string()
}

/// Publish an active listing in the first seeded category
pub async fn create_listing(server: &TestServer, token: &str, price: i64) -> i64 {
    let response = server
        .post("/api/v1/listings")
        .authorization_bearer(token)
        .json(&json!({
            "category_id": 1,
            "title": "Summer street festival",
            "description": "Two days of music on the waterfront",
            "location": "Portland, OR",
            "audience_size": 5000,
            "price": price,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

pub async fn apply(server: &TestServer, token: &str, listing_id: i64, offer: i64) -> i64 {
    let response = server
        .post(&format!("/api/v1/listings/{}/applications", listing_id))
        .authorization_bearer(token)
        .json(&json!({ "offer_amount": offer, "message": "We would love to sponsor the main stage." }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}
