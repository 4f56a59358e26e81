//! Application model
//!
//! A sponsor applies to a listing with an offer and a pitch. The listing
//! owner accepts or rejects; the sponsor may withdraw while it is pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub listing_id: i64,
    pub sponsor_id: i64,
    /// Pitch sent to the listing owner
    pub message: String,
    /// Offered amount in cents
    pub offer_amount: i64,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Application joined with the listing and sponsor it refers to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub listing_title: String,
    /// Owner of the listing, i.e. the creator receiving the application
    pub owner_id: i64,
    pub sponsor_name: String,
    pub sponsor_company: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    /// Only pending applications move, and only once.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (
                ApplicationStatus::Pending,
                ApplicationStatus::Accepted
                    | ApplicationStatus::Rejected
                    | ApplicationStatus::Withdrawn
            )
        )
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }

    pub fn all() -> [ApplicationStatus; 4] {
        [
            ApplicationStatus::Pending,
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Withdrawn,
        ]
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationStatus::Pending => write!(f, "pending"),
            ApplicationStatus::Accepted => write!(f, "accepted"),
            ApplicationStatus::Rejected => write!(f, "rejected"),
            ApplicationStatus::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApplicationStatus::Pending),
            "accepted" => Ok(ApplicationStatus::Accepted),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "withdrawn" => Ok(ApplicationStatus::Withdrawn),
            _ => Err(anyhow::anyhow!("Invalid application status: {}", s)),
        }
    }
}

/// Input for applying to a listing
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplicationInput {
    pub offer_amount: i64,
    pub message: String,
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = ApplicationStatus> {
        prop_oneof![
            Just(ApplicationStatus::Pending),
            Just(ApplicationStatus::Accepted),
            Just(ApplicationStatus::Rejected),
            Just(ApplicationStatus::Withdrawn),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A legal transition always leaves Pending for a final state
        #[test]
        fn transitions_only_leave_pending(from in any_status(), to in any_status()) {
            if from.can_transition_to(to) {
                prop_assert_eq!(from, ApplicationStatus::Pending);
                prop_assert!(to.is_final());
            }
        }

        #[test]
        fn display_parse_roundtrip(status in any_status()) {
            prop_assert_eq!(status.to_string().parse::<ApplicationStatus>().unwrap(), status);
        }
    }
}
