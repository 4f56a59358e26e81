//! Admin dashboard statistics

use crate::db::repositories::{
    ApplicationRepository, ListingRepository, PaymentRepository, UserRepository,
};
use crate::models::{ApplicationStatus, ListingStatus, PaymentTotals, UserRole};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

/// Platform-wide counters
///
/// Every known role and status is present, with zero when nothing matches.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub users_by_role: BTreeMap<String, i64>,
    pub listings_by_status: BTreeMap<String, i64>,
    pub applications_by_status: BTreeMap<String, i64>,
    pub payments: PaymentTotals,
}

pub struct StatsService {
    users: Arc<dyn UserRepository>,
    listings: Arc<dyn ListingRepository>,
    applications: Arc<dyn ApplicationRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl StatsService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        listings: Arc<dyn ListingRepository>,
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            users,
            listings,
            applications,
            payments,
        }
    }

    pub async fn collect(&self) -> Result<AdminStats> {
        let (users, listings, applications, payments) = tokio::try_join!(
            self.users.count_by_role(),
            self.listings.count_by_status(),
            self.applications.count_by_status(),
            self.payments.completed_totals(),
        )
        .context("Failed to collect admin stats")?;

        Ok(AdminStats {
            users_by_role: fill(
                [UserRole::Sponsor, UserRole::Creator, UserRole::Admin],
                &users,
            ),
            listings_by_status: fill(
                [ListingStatus::Draft, ListingStatus::Active, ListingStatus::Closed],
                &listings,
            ),
            applications_by_status: fill(ApplicationStatus::all(), &applications),
            payments,
        })
    }
}

fn fill<K, const N: usize>(keys: [K; N], counts: &HashMap<K, i64>) -> BTreeMap<String, i64>
where
    K: Eq + Hash + ToString,
{
    keys.into_iter()
        .map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            (key.to_string(), count)
        })
        .collect()
}
