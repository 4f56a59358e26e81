//! Health endpoint
//!
//! - GET /api/v1/health - Liveness, database reachability and request stats

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::middleware::AppState;

/// App version constant - update when releasing
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Whether the database answered a ping
    pub database: bool,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub uptime: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

/// GET /api/v1/health
///
/// Always 200 while the process serves requests; check `database` for the
/// storage side.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.pool.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            false
        }
    };

    let uptime_seconds = state.request_stats.uptime_seconds();

    Json(HealthResponse {
        status: "ok",
        database,
        version: APP_VERSION,
        uptime_seconds,
        uptime: format_uptime(uptime_seconds),
        total_requests: state.request_stats.total_requests(),
        avg_response_time_ms: state.request_stats.avg_response_time_ms(),
    })
}

/// Format uptime to human readable string
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_uptime(2 * 86400 + 3600 + 120), "2d 1h 2m");
    }
}
