//! User service
//!
//! Accounts and sessions:
//! - Registration (sponsor or creator, auto-login)
//! - Login/logout and session validation
//! - Password changes
//! - Admin bootstrap and moderation (list, ban, unban)

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{ListParams, PagedResult, Session, User, UserRole, UserStatus};
use crate::services::password::{hash_password, is_strong_enough, verify_password, MIN_PASSWORD_LENGTH};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Same message for unknown email and wrong password
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Account is banned
    #[error("Account is banned")]
    UserBanned,

    #[error("User not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new sponsor or creator and log them in
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed email, blank name, short password
    ///   or a role that cannot be self-assigned
    /// - `UserExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<(User, Session), UserServiceError> {
        let input = input.normalized();
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.email.clone(), input.name, password_hash, input.role);

        // Two concurrent registrations can both pass the lookup above
        let created_user = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    input.email
                )));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = created_user.id, role = %created_user.role, "User registered");

        let session = self.create_session(created_user.id).await?;
        Ok((created_user, session))
    }

    /// Login with email and password
    ///
    /// The password is checked before the ban, so a ban is only revealed to
    /// someone who knows the password.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let email = normalize_email(&input.email);

        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()))?;

        let is_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !is_valid {
            return Err(UserServiceError::AuthenticationError(
                INVALID_CREDENTIALS.to_string(),
            ));
        }

        if user.is_banned() {
            return Err(UserServiceError::UserBanned);
        }

        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    /// Logout by deleting the session. Unknown tokens are not an error.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Validate session token and return the associated user
    ///
    /// Returns `None` when the session doesn't exist, is expired (it is
    /// deleted on the way) or belongs to a banned user.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| !u.is_banned()))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by id")?;

        Ok(user)
    }

    /// Change a user's password, signing out every other session
    ///
    /// `keep_session` is the session making the request, if known.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
        keep_session: Option<&str>,
    ) -> Result<(), UserServiceError> {
        if !is_strong_enough(new_password) {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let is_valid = verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !is_valid {
            return Err(UserServiceError::ValidationError(
                "Current password is incorrect".to_string(),
            ));
        }

        let mut updated = user.clone();
        updated.password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to update password")?;

        let removed = match keep_session {
            Some(keep) => self.session_repo.delete_others(user.id, keep).await,
            None => self.session_repo.delete_by_user(user.id).await,
        }
        .context("Failed to revoke sessions")?;

        tracing::info!(user_id = user.id, revoked = removed, "Password changed");
        Ok(())
    }

    /// Delete all expired sessions
    ///
    /// This is a maintenance operation that should be called periodically.
    ///
    /// # Returns
    ///
    /// The number of sessions deleted
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    /// Create the bootstrap admin account if the email is not registered yet
    ///
    /// Returns true when an account was created. An existing account is left
    /// untouched whatever its role.
    pub async fn ensure_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, UserServiceError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError(
                "Invalid admin email".to_string(),
            ));
        }
        if !is_strong_enough(password) {
            return Err(UserServiceError::ValidationError(format!(
                "Admin password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        if let Some(existing) = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check admin email")?
        {
            if !existing.is_admin() {
                tracing::warn!("Bootstrap admin email belongs to a non-admin account");
            }
            return Ok(false);
        }

        let password_hash = hash_password(password).context("Failed to hash password")?;
        let user = User::new(email, "Admin".to_string(), password_hash, UserRole::Admin);
        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create admin")?;

        tracing::info!(user_id = created.id, "Bootstrap admin created");
        Ok(true)
    }

    /// Paginated list of all users, newest first
    pub async fn list_users(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(params)
            .await
            .context("Failed to list users")?;

        Ok(PagedResult::new(users, total, params))
    }

    /// Ban or unban a user
    ///
    /// Banning signs the user out everywhere. Admins cannot ban themselves.
    pub async fn set_status(
        &self,
        actor: &User,
        user_id: i64,
        status: UserStatus,
    ) -> Result<User, UserServiceError> {
        if actor.id == user_id && status == UserStatus::Banned {
            return Err(UserServiceError::ValidationError(
                "You cannot ban yourself".to_string(),
            ));
        }

        let updated = self
            .user_repo
            .set_status(user_id, status)
            .await
            .context("Failed to update user status")?;
        if !updated {
            return Err(UserServiceError::NotFound);
        }

        if status == UserStatus::Banned {
            let revoked = self
                .session_repo
                .delete_by_user(user_id)
                .await
                .context("Failed to revoke sessions")?;
            tracing::info!(user_id, revoked, "User banned");
        } else {
            tracing::info!(user_id, "User reactivated");
        }

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to reload user")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Create a new session for a user
    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::issue(user_id, self.session_expiration_days);

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

/// Trimmed, lowercase form used for storage and lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.][^\s@]*\.[^\s@]*[^\s@.]$").expect("email pattern compiles")
});

/// Something before the `@`, and a dot inside the domain
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Validate registration input (expects the normalized form)
fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    if !is_valid_email(&input.email) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }

    if input.name.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Name cannot be empty".to_string(),
        ));
    }

    if !is_strong_enough(&input.password) {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    if !input.role.is_self_assignable() {
        return Err(UserServiceError::ValidationError(
            "Role must be sponsor or creator".to_string(),
        ));
    }

    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
}

impl RegisterInput {
    /// Create a new registration input
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        password: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password: password.into(),
            role,
        }
    }

    fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            name: self.name.trim().to_string(),
            ..self
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        setup_with_expiration(DEFAULT_SESSION_EXPIRATION_DAYS).await
    }

    async fn setup_with_expiration(days: i64) -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::with_session_expiration(user_repo, session_repo, days);

        (pool, service)
    }

    fn sponsor_input() -> RegisterInput {
        RegisterInput::new("Shop@Example.com ", "Corner Shop", "password123", UserRole::Sponsor)
    }

    // ========================================================================
    // Registration tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_normalizes_and_logs_in() {
        let (_pool, service) = setup_test_service().await;

        let (user, session) = service.register(sponsor_input()).await.unwrap();

        assert_eq!(user.email, "shop@example.com");
        assert_eq!(user.role, UserRole::Sponsor);
        assert_eq!(session.user_id, user.id);
        assert!(service.validate_session(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_fails() {
        let (_pool, service) = setup_test_service().await;
        service.register(sponsor_input()).await.unwrap();

        let result = service
            .register(RegisterInput::new(
                "shop@example.com",
                "Other",
                "password123",
                UserRole::Creator,
            ))
            .await;

        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        let cases = [
            RegisterInput::new("no-at-sign", "Name", "password123", UserRole::Sponsor),
            RegisterInput::new("a@nodot", "Name", "password123", UserRole::Sponsor),
            RegisterInput::new("a@b.co", "   ", "password123", UserRole::Sponsor),
            RegisterInput::new("a@b.co", "Name", "short", UserRole::Sponsor),
            RegisterInput::new("a@b.co", "Name", "password123", UserRole::Admin),
        ];

        for input in cases {
            let result = service.register(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    // ========================================================================
    // Login tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_success() {
        let (_pool, service) = setup_test_service().await;
        service.register(sponsor_input()).await.unwrap();

        let (user, session) = service
            .login(LoginInput::new("SHOP@example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(user.email, "shop@example.com");
        assert_eq!(session.user_id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_share_a_message() {
        let (_pool, service) = setup_test_service().await;
        service.register(sponsor_input()).await.unwrap();

        let wrong_password = service
            .login(LoginInput::new("shop@example.com", "wrong-password"))
            .await;
        let unknown_email = service
            .login(LoginInput::new("nobody@example.com", "password123"))
            .await;

        match (wrong_password, unknown_email) {
            (
                Err(UserServiceError::AuthenticationError(a)),
                Err(UserServiceError::AuthenticationError(b)),
            ) => assert_eq!(a, b),
            other => panic!("unexpected results: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login_and_loses_sessions() {
        let (_pool, service) = setup_test_service().await;
        assert!(service.ensure_admin("admin@example.com", "adminpass1").await.unwrap());
        let (admin, _) = service
            .login(LoginInput::new("admin@example.com", "adminpass1"))
            .await
            .unwrap();
        let (user, session) = service.register(sponsor_input()).await.unwrap();

        let banned = service
            .set_status(&admin, user.id, UserStatus::Banned)
            .await
            .unwrap();
        assert!(banned.is_banned());

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        let result = service
            .login(LoginInput::new("shop@example.com", "password123"))
            .await;
        assert!(matches!(result, Err(UserServiceError::UserBanned)));

        service
            .set_status(&admin, user.id, UserStatus::Active)
            .await
            .unwrap();
        assert!(service
            .login(LoginInput::new("shop@example.com", "password123"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_admin_cannot_ban_self() {
        let (_pool, service) = setup_test_service().await;
        service.ensure_admin("admin@example.com", "adminpass1").await.unwrap();
        let (admin, _) = service
            .login(LoginInput::new("admin@example.com", "adminpass1"))
            .await
            .unwrap();

        let result = service.set_status(&admin, admin.id, UserStatus::Banned).await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));

        let missing = service.set_status(&admin, 9999, UserStatus::Banned).await;
        assert!(matches!(missing, Err(UserServiceError::NotFound)));
    }

    // ========================================================================
    // Session tests
    // ========================================================================

    #[tokio::test]
    async fn test_validate_session_nonexistent_returns_none() {
        let (_pool, service) = setup_test_service().await;
        let result = service.validate_session("no-such-token").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_validate_expired_session_returns_none() {
        // -1 day expiration: every session is born expired
        let (_pool, service) = setup_with_expiration(-1).await;

        let (_, session) = service.register(sponsor_input()).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        // deleted on the way, so cleanup finds nothing left
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (_pool, service) = setup_with_expiration(-1).await;
        service.register(sponsor_input()).await.unwrap();
        service
            .login(LoginInput::new("shop@example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        let (_, session) = service.register(sponsor_input()).await.unwrap();

        service.logout(&session.id).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        // logging out twice is fine
        service.logout(&session.id).await.unwrap();
    }

    // ========================================================================
    // Password change tests
    // ========================================================================

    #[tokio::test]
    async fn test_change_password_revokes_other_sessions() {
        let (_pool, service) = setup_test_service().await;
        let (user, current) = service.register(sponsor_input()).await.unwrap();
        let (_, other) = service
            .login(LoginInput::new("shop@example.com", "password123"))
            .await
            .unwrap();

        service
            .change_password(&user, "password123", "new-password", Some(&current.id))
            .await
            .unwrap();

        assert!(service.validate_session(&current.id).await.unwrap().is_some());
        assert!(service.validate_session(&other.id).await.unwrap().is_none());
        assert!(service
            .login(LoginInput::new("shop@example.com", "new-password"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_checks_current_and_length() {
        let (_pool, service) = setup_test_service().await;
        let (user, _) = service.register(sponsor_input()).await.unwrap();

        let wrong = service
            .change_password(&user, "not-it", "new-password", None)
            .await;
        assert!(matches!(wrong, Err(UserServiceError::ValidationError(_))));

        let short = service
            .change_password(&user, "password123", "short", None)
            .await;
        assert!(matches!(short, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let (_pool, service) = setup_test_service().await;

        assert!(service.ensure_admin("root@example.com", "adminpass1").await.unwrap());
        assert!(!service.ensure_admin("root@example.com", "adminpass1").await.unwrap());

        let page = service.list_users(&ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0].is_admin());
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("a@b@c.co"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Normalizing twice changes nothing
        #[test]
        fn normalize_email_idempotent(email in "[ A-Za-z0-9@.]{0,30}") {
            let once = normalize_email(&email);
            prop_assert_eq!(normalize_email(&once), once.clone());
            prop_assert_eq!(once.trim(), once.as_str());
        }

        /// Well-formed addresses are accepted
        #[test]
        fn simple_addresses_are_valid(
            local in "[a-z0-9]{1,12}",
            host in "[a-z0-9]{1,12}",
            tld in "[a-z]{2,6}",
        ) {
            let email = format!("{}@{}.{}", local, host, tld);
            prop_assert!(is_valid_email(&email));
        }
    }
}
