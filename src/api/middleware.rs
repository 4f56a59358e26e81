//! API middleware
//!
//! Contains middleware and shared plumbing for:
//! - Authentication (session token validation)
//! - Authorization (admin guard)
//! - Request statistics
//! - The JSON error envelope and service error mapping

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::create_cache;
use crate::config::{Config, UploadConfig};
use crate::db::repositories::{
    SqlxApplicationRepository, SqlxCategoryRepository, SqlxConversationRepository,
    SqlxListingRepository, SqlxPaymentRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use crate::services::{
    ApplicationService, ApplicationServiceError, CategoryService, CategoryServiceError,
    FeeSchedule, ListingService, ListingServiceError, LoginRateLimiter, MatchingService,
    MatchingServiceError, MessagingService, MessagingServiceError, PaymentService,
    PaymentServiceError, ProfileService, ProfileServiceError, SimulatedProcessor, StatsService,
    UserService, UserServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in milliseconds
    pub fn avg_response_time_ms(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64 / 1000.0
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub profile_service: Arc<ProfileService>,
    pub category_service: Arc<CategoryService>,
    pub listing_service: Arc<ListingService>,
    pub application_service: Arc<ApplicationService>,
    pub matching_service: Arc<MatchingService>,
    pub messaging_service: Arc<MessagingService>,
    pub payment_service: Arc<PaymentService>,
    pub stats_service: Arc<StatsService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub upload_config: Arc<UploadConfig>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: DynDatabasePool, config: &Config) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let listing_repo = SqlxListingRepository::boxed(pool.clone());
        let application_repo = SqlxApplicationRepository::boxed(pool.clone());
        let conversation_repo = SqlxConversationRepository::boxed(pool.clone());
        let payment_repo = SqlxPaymentRepository::boxed(pool.clone());

        let cache = create_cache(&config.cache);

        let user_service = Arc::new(UserService::with_session_expiration(
            user_repo.clone(),
            session_repo,
            config.auth.session_days,
        ));
        let category_service = Arc::new(CategoryService::new(category_repo.clone(), cache));
        let messaging_service = Arc::new(MessagingService::new(
            conversation_repo,
            user_repo.clone(),
            listing_repo.clone(),
        ));

        Self {
            user_service,
            profile_service: Arc::new(ProfileService::new(user_repo.clone(), category_repo)),
            listing_service: Arc::new(ListingService::new(
                listing_repo.clone(),
                category_service.clone(),
            )),
            application_service: Arc::new(ApplicationService::new(
                application_repo.clone(),
                listing_repo.clone(),
                messaging_service.clone(),
            )),
            matching_service: Arc::new(MatchingService::new(
                user_repo.clone(),
                listing_repo.clone(),
                application_repo.clone(),
            )),
            payment_service: Arc::new(PaymentService::new(
                payment_repo.clone(),
                application_repo.clone(),
                Arc::new(SimulatedProcessor),
                FeeSchedule::from_config(&config.payments),
            )),
            stats_service: Arc::new(StatsService::new(
                user_repo,
                listing_repo,
                application_repo,
                payment_repo,
            )),
            category_service,
            messaging_service,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            upload_config: Arc::new(config.upload.clone()),
            request_stats: Arc::new(RequestStats::new()),
            pool,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// User set by `optional_auth`, if the request carried a valid session
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|user| user.0.clone()),
        ))
    }
}

/// Best-effort client address for rate limiting
///
/// Proxy headers win over the socket address.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|ip| ip.trim().parse().ok());
        let real_ip = || {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .and_then(|ip| ip.trim().parse().ok())
        };
        let socket = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        };

        Ok(ClientIp(forwarded.or_else(real_ip).or_else(socket)))
    }
}

// ============================================================================
// Error Envelope
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

// ============================================================================
// Service Error Mapping
// ============================================================================

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::UserBanned => ApiError::new("USER_BANNED", "Account is banned"),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ProfileServiceError> for ApiError {
    fn from(err: ProfileServiceError) -> Self {
        match err {
            ProfileServiceError::NotFound => ApiError::not_found("User not found"),
            ProfileServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ProfileServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            e @ (CategoryServiceError::DuplicateName(_)
            | CategoryServiceError::DuplicateSlug(_)) => ApiError::conflict(e.to_string()),
            e @ CategoryServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            e @ CategoryServiceError::CannotDeleteDefault => {
                ApiError::validation_error(e.to_string())
            }
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ListingServiceError> for ApiError {
    fn from(err: ListingServiceError) -> Self {
        match err {
            ListingServiceError::NotFound => ApiError::not_found("Listing not found"),
            ListingServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ListingServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ListingServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ApplicationServiceError> for ApiError {
    fn from(err: ApplicationServiceError) -> Self {
        match err {
            ApplicationServiceError::NotFound(msg) => ApiError::not_found(msg),
            ApplicationServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ApplicationServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ApplicationServiceError::Conflict(msg) => ApiError::conflict(msg),
            ApplicationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MatchingServiceError> for ApiError {
    fn from(err: MatchingServiceError) -> Self {
        match err {
            MatchingServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            MatchingServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MessagingServiceError> for ApiError {
    fn from(err: MessagingServiceError) -> Self {
        match err {
            MessagingServiceError::NotFound(msg) => ApiError::not_found(msg),
            MessagingServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            MessagingServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MessagingServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<PaymentServiceError> for ApiError {
    fn from(err: PaymentServiceError) -> Self {
        match err {
            PaymentServiceError::NotFound(msg) => ApiError::not_found(msg),
            PaymentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            PaymentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PaymentServiceError::Conflict(msg) => ApiError::conflict(msg),
            PaymentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Extract session token from request
///
/// `Authorization: Bearer` wins over the `session` cookie.
pub(crate) fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
///
/// Attaches the user when the token is valid and lets everyone else through.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Optional session check failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware; must run after `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if user.0.role != UserRole::Admin {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us);

    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LoginInput, RegisterInput};
    use axum::body::Body;
    use axum::http::{HeaderMap, HeaderValue};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let map = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&map).is_none());
        let map = headers(&[(header::COOKIE, "session=")]);
        assert!(extract_session_token(&map).is_none());
    }

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::new("USER_BANNED", "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::rate_limited("x", 60).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::new("SOMETHING_ELSE", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_details() {
        let error = ApiError::rate_limited("Slow down", 900);
        assert_eq!(error.error.details, Some(serde_json::json!({"retry_after": 900})));
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let error: ApiError = UserServiceError::InternalError(anyhow::anyhow!("db password=x")).into();
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("password"));
    }

    #[test]
    fn test_banned_maps_to_user_banned() {
        let error: ApiError = UserServiceError::UserBanned.into();
        assert_eq!(error.error.code, "USER_BANNED");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
    }

    async fn guarded_app() -> (Router, AppState) {
        let pool = crate::db::create_test_pool().await.unwrap();
        crate::db::migrations::run_migrations(&pool).await.unwrap();
        let state = AppState::new(pool, &Config::default());

        let app = Router::new()
            .route(
                "/admin",
                get(|user: AuthenticatedUser| async move { user.0.email }),
            )
            .route_layer(axum::middleware::from_fn(require_admin))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                require_auth,
            ))
            .with_state(state.clone());
        (app, state)
    }

    fn get_with_token(uri: &str, token: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_admin_guard_layers() {
        let (app, state) = guarded_app().await;

        let response = app.clone().oneshot(get_with_token("/admin", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(get_with_token("/admin", Some("no-such-session")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (_, session) = state
            .user_service
            .register(RegisterInput::new(
                "creator@example.com",
                "Creator",
                "password123",
                UserRole::Creator,
            ))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(get_with_token("/admin", Some(&session.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        state
            .user_service
            .ensure_admin("admin@example.com", "password123")
            .await
            .unwrap();
        let (_, session) = state
            .user_service
            .login(LoginInput::new("admin@example.com", "password123"))
            .await
            .unwrap();
        let response = app
            .oneshot(get_with_token("/admin", Some(&session.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_ms(), 0.0);

        stats.record(1000);
        stats.record(3000);

        assert_eq!(stats.total_requests(), 2);
        assert!((stats.avg_response_time_ms() - 2.0).abs() < f64::EPSILON);
    }
}
