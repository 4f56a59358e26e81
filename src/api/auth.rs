//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - Registration (auto-login)
//! - POST /api/v1/auth/login - Login
//! - POST /api/v1/auth/logout - Logout
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/password - Change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser, ClientIp};
use crate::models::{Session, User, UserRole};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

const IP_RETRY_AFTER_SECS: u64 = 60;
const EMAIL_RETRY_AFTER_SECS: u64 = 15 * 60;

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for changing password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/password", put(change_password))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

fn session_cookie(session: &Session) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        session.max_age_seconds()
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(ApiError::internal)?,
    );
    Ok(headers)
}

/// POST /api/v1/auth/register - User registration
///
/// Creates the account and logs it in.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = RegisterInput::new(body.email, body.name, body.password, body.role);

    let (user, session) = state.user_service.register(input).await?;
    let headers = session_cookie(&session)?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login - User login
///
/// Rate limited per IP (10/min) and per email (5 failures/15 min).
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Login IP rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many login requests, try again later",
                IP_RETRY_AFTER_SECS,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_email_limited(&body.email).await {
        tracing::warn!(email = %body.email, "Login email rate limit exceeded");
        return Err(ApiError::rate_limited(
            "Too many failed attempts, try again in 15 minutes",
            EMAIL_RETRY_AFTER_SECS,
        ));
    }

    let input = LoginInput::new(body.email.clone(), body.password);

    let (user, session) = match state.user_service.login(input).await {
        Ok(result) => result,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failed_attempt(&body.email).await;
            }
            return Err(e.into());
        }
    };

    state.rate_limiter.clear_email_attempts(&body.email).await;
    let headers = session_cookie(&session)?;

    Ok((
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// PUT /api/v1/auth/password - Change current user's password
///
/// Every other session of the user is revoked.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let current_token = extract_session_token(&headers);

    state
        .user_service
        .change_password(
            &user.0,
            &body.current_password,
            &body.new_password,
            current_token.as_deref(),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
