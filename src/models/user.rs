//! User model
//!
//! Users are sponsors (businesses looking to fund something), creators
//! (people and organisers publishing listings) or admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered marketplace account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Email address (unique, stored lowercase)
    pub email: String,
    /// Display name
    pub name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
    /// Business name, mostly used by sponsors
    pub company_name: Option<String>,
    /// Followers or expected attendance, mostly used by creators
    pub audience_size: i64,
    /// Sponsorship budget range in cents
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// The password must already be hashed; see `services::password::hash_password()`.
    pub fn new(email: String, name: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            name,
            password_hash,
            role,
            status: UserStatus::Active,
            bio: None,
            location: None,
            website: None,
            avatar: None,
            company_name: None,
            audience_size: 0,
            budget_min: None,
            budget_max: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_sponsor(&self) -> bool {
        self.role == UserRole::Sponsor
    }

    pub fn is_creator(&self) -> bool {
        self.role == UserRole::Creator
    }

    /// Admins may manage anything; everyone else only what they own
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Business funding listings
    #[default]
    Sponsor,
    /// Publishes listings and receives offers
    Creator,
    /// Platform operator
    Admin,
}

impl UserRole {
    /// Roles a visitor may pick for themselves at registration
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, UserRole::Sponsor | UserRole::Creator)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Sponsor => write!(f, "sponsor"),
            UserRole::Creator => write!(f, "creator"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sponsor" => Ok(UserRole::Sponsor),
            "creator" => Ok(UserRole::Creator),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Account status. Banned users cannot log in and disappear from public views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Banned,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Banned => write!(f, "banned"),
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

/// Partial profile update. `None` leaves a field untouched; for optional
/// text fields `Some("")` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
    pub company_name: Option<String>,
    pub audience_size: Option<i64>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    /// Replaces the full interest list when present
    pub interests: Option<Vec<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User::new(
            "someone@example.com".to_string(),
            "Someone".to_string(),
            "hash".to_string(),
            role,
        )
    }

    #[test]
    fn test_user_new() {
        let u = user(UserRole::Creator);

        assert_eq!(u.id, 0);
        assert_eq!(u.email, "someone@example.com");
        assert_eq!(u.status, UserStatus::Active);
        assert_eq!(u.audience_size, 0);
        assert!(u.budget_min.is_none());
    }

    #[test]
    fn test_role_predicates() {
        assert!(user(UserRole::Sponsor).is_sponsor());
        assert!(user(UserRole::Creator).is_creator());
        assert!(user(UserRole::Admin).is_admin());
        assert!(!user(UserRole::Sponsor).is_admin());
    }

    #[test]
    fn test_can_manage() {
        let mut admin = user(UserRole::Admin);
        admin.id = 1;
        let mut creator = user(UserRole::Creator);
        creator.id = 2;

        assert!(admin.can_manage(2));
        assert!(admin.can_manage(999));
        assert!(creator.can_manage(2));
        assert!(!creator.can_manage(1));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user(UserRole::Sponsor)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "sponsor");
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("sponsor").unwrap(), UserRole::Sponsor);
        assert_eq!(UserRole::from_str("CREATOR").unwrap(), UserRole::Creator);
        assert_eq!(UserRole::from_str("Admin").unwrap(), UserRole::Admin);
        assert!(UserRole::from_str("author").is_err());
    }

    #[test]
    fn test_self_assignable_roles() {
        assert!(UserRole::Sponsor.is_self_assignable());
        assert!(UserRole::Creator.is_self_assignable());
        assert!(!UserRole::Admin.is_self_assignable());
    }

    #[test]
    fn test_user_status_roundtrip() {
        for status in [UserStatus::Active, UserStatus::Banned] {
            assert_eq!(UserStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(UserStatus::from_str("deleted").is_err());
    }
}
