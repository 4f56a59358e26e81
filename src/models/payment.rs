//! Payment model
//!
//! Payments settle an accepted application. All amounts are in cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub application_id: i64,
    /// Sponsor paying for the deal
    pub payer_id: i64,
    /// Creator receiving the payout
    pub payee_id: i64,
    /// Agreed deal amount
    pub amount: i64,
    /// Kept by the platform, deducted from the payout
    pub platform_fee: i64,
    /// Charged on top of the amount to cover processing
    pub processing_fee: i64,
    pub total_charged: i64,
    pub payout_amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Reference returned by the processor on success
    pub processor_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Whether `user_id` is the payer or the payee
    pub fn involves(&self, user_id: i64) -> bool {
        self.payer_id == user_id || self.payee_id == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Completed | PaymentStatus::Failed
            ) | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }

    /// Pending and completed payments block another payment for the same application
    pub fn blocks_new_payment(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Completed)
    }

    pub fn all() -> [PaymentStatus; 4] {
        [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ]
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(anyhow::anyhow!("Invalid payment status: {}", s)),
        }
    }
}

/// Largest deal amount accepted anywhere money is entered (1 billion in cents)
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Fee split for a given deal amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub amount: i64,
    pub platform_fee: i64,
    pub processing_fee: i64,
    pub total_charged: i64,
    pub payout_amount: i64,
}

/// Totals over completed payments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTotals {
    pub completed_count: i64,
    /// Sum of deal amounts
    pub gross_volume: i64,
    /// Sum of platform fees kept
    pub platform_fees: i64,
}
