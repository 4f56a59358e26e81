//! Payment service
//!
//! Simulated payment flow for accepted applications:
//! - Fee arithmetic in integer cents (`FeeSchedule`)
//! - Pending -> Completed/Failed via a `PaymentProcessor`
//! - Completed -> Refunded by an admin
//!
//! No money moves. `SimulatedProcessor` approves every positive charge.

use crate::config::PaymentsConfig;
use crate::db::repositories::{ApplicationRepository, PaymentRepository};
use crate::models::{
    ApplicationStatus, FeeBreakdown, Payment, PaymentStatus, User, MAX_AMOUNT_CENTS,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const BPS_DENOMINATOR: i128 = 10_000;
const CANCELLED_REASON: &str = "cancelled by payer";

#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Duplicate payment or illegal status change
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

// ============================================================================
// Fees
// ============================================================================

/// Fee rates in basis points plus a fixed processing fee
///
/// The sponsor pays the processing fee on top of the amount; the platform
/// fee comes out of the creator's payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub platform_fee_bps: i64,
    pub processing_fee_bps: i64,
    pub processing_fee_fixed_cents: i64,
    pub currency: String,
}

impl FeeSchedule {
    /// Build from configuration; rates are clamped to 0..=100%
    pub fn from_config(config: &PaymentsConfig) -> Self {
        Self {
            platform_fee_bps: config.platform_fee_bps.clamp(0, BPS_DENOMINATOR as i64),
            processing_fee_bps: config.processing_fee_bps.clamp(0, BPS_DENOMINATOR as i64),
            processing_fee_fixed_cents: config.processing_fee_fixed_cents.max(0),
            currency: config.currency.to_lowercase(),
        }
    }

    /// Split an amount (cents). Percentages round half up.
    ///
    /// Returns None when the total does not fit in an i64.
    pub fn breakdown(&self, amount: i64) -> Option<FeeBreakdown> {
        let platform_fee = apply_bps(amount, self.platform_fee_bps);
        let processing_fee = apply_bps(amount, self.processing_fee_bps)
            .checked_add(self.processing_fee_fixed_cents)?;

        Some(FeeBreakdown {
            amount,
            platform_fee,
            processing_fee,
            total_charged: amount.checked_add(processing_fee)?,
            payout_amount: amount - platform_fee,
        })
    }

    /// Breakdown for a user-supplied amount, 1..=`MAX_AMOUNT_CENTS`
    pub fn quote(&self, amount: i64) -> Result<FeeBreakdown, PaymentServiceError> {
        if amount <= 0 {
            return Err(PaymentServiceError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if amount > MAX_AMOUNT_CENTS {
            return Err(PaymentServiceError::ValidationError(format!(
                "Amount must not exceed {} cents",
                MAX_AMOUNT_CENTS
            )));
        }
        self.breakdown(amount).ok_or_else(|| {
            PaymentServiceError::ValidationError("Amount is too large".to_string())
        })
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::from_config(&PaymentsConfig::default())
    }
}

/// `round(amount * bps / 10000)`, half up, for non-negative amounts
fn apply_bps(amount: i64, bps: i64) -> i64 {
    let scaled = amount as i128 * bps as i128;
    ((scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR) as i64
}

// ============================================================================
// Processor
// ============================================================================

/// What the processor said about a charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// Charges a payment's `total_charged`
///
/// An `Err` means the processor could not be reached; the payment stays
/// pending and may be confirmed again.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, payment: &Payment) -> Result<ChargeOutcome>;
}

/// Approves every positive charge with a `sim_<uuid>` reference
#[derive(Debug, Default)]
pub struct SimulatedProcessor;

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn charge(&self, payment: &Payment) -> Result<ChargeOutcome> {
        if payment.total_charged <= 0 {
            return Ok(ChargeOutcome::Declined {
                reason: "Charge amount must be positive".to_string(),
            });
        }

        Ok(ChargeOutcome::Approved {
            reference: format!("sim_{}", Uuid::new_v4().simple()),
        })
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    applications: Arc<dyn ApplicationRepository>,
    processor: Arc<dyn PaymentProcessor>,
    fees: FeeSchedule,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        applications: Arc<dyn ApplicationRepository>,
        processor: Arc<dyn PaymentProcessor>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            payments,
            applications,
            processor,
            fees,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Start paying for an accepted application
    ///
    /// # Errors
    /// - `NotFound` for an unknown application
    /// - `Forbidden` unless the caller is the applying sponsor
    /// - `ValidationError` unless the application is accepted
    /// - `Conflict` if a pending or completed payment already exists
    pub async fn create(
        &self,
        payer: &User,
        application_id: i64,
    ) -> Result<Payment, PaymentServiceError> {
        let detail = self
            .applications
            .get_detail(application_id)
            .await
            .context("Failed to get application")?
            .ok_or_else(|| PaymentServiceError::NotFound("Application not found".to_string()))?;
        let application = &detail.application;

        if application.sponsor_id != payer.id {
            return Err(PaymentServiceError::Forbidden(
                "Only the sponsor can pay for this application".to_string(),
            ));
        }
        if application.status != ApplicationStatus::Accepted {
            return Err(PaymentServiceError::ValidationError(
                "Only accepted applications can be paid".to_string(),
            ));
        }

        if let Some(existing) = self
            .payments
            .find_open_for_application(application_id)
            .await
            .context("Failed to check existing payments")?
        {
            return Err(PaymentServiceError::Conflict(format!(
                "Application already has a {} payment",
                existing.status
            )));
        }

        let fees = self.fees.quote(application.offer_amount)?;
        let now = Utc::now();
        let payment = Payment {
            id: 0,
            application_id,
            payer_id: payer.id,
            payee_id: detail.owner_id,
            amount: fees.amount,
            platform_fee: fees.platform_fee,
            processing_fee: fees.processing_fee,
            total_charged: fees.total_charged,
            payout_amount: fees.payout_amount,
            currency: self.fees.currency.clone(),
            status: PaymentStatus::Pending,
            processor_ref: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let created = self
            .payments
            .create(&payment)
            .await
            .context("Failed to create payment")?;

        tracing::info!(
            id = created.id,
            application_id,
            amount = created.amount,
            "Payment created"
        );
        Ok(created)
    }

    /// Charge a pending payment (payer only)
    pub async fn confirm(&self, payer: &User, id: i64) -> Result<Payment, PaymentServiceError> {
        let payment = self.get_pending_for_payer(payer, id).await?;

        let outcome = self
            .processor
            .charge(&payment)
            .await
            .context("Payment processor unavailable")?;

        let applied = match &outcome {
            ChargeOutcome::Approved { reference } => self
                .payments
                .mark_completed(id, reference)
                .await
                .context("Failed to complete payment")?,
            ChargeOutcome::Declined { reason } => self
                .payments
                .mark_failed(id, reason)
                .await
                .context("Failed to fail payment")?,
        };
        if !applied {
            return Err(PaymentServiceError::Conflict(
                "Payment is no longer pending".to_string(),
            ));
        }

        match outcome {
            ChargeOutcome::Approved { .. } => tracing::info!(id, "Payment completed"),
            ChargeOutcome::Declined { reason } => tracing::info!(id, %reason, "Payment declined"),
        }

        self.reload(id).await
    }

    /// Abandon a pending payment (payer only)
    pub async fn cancel(&self, payer: &User, id: i64) -> Result<Payment, PaymentServiceError> {
        self.get_pending_for_payer(payer, id).await?;

        let applied = self
            .payments
            .mark_failed(id, CANCELLED_REASON)
            .await
            .context("Failed to cancel payment")?;
        if !applied {
            return Err(PaymentServiceError::Conflict(
                "Payment is no longer pending".to_string(),
            ));
        }

        tracing::info!(id, "Payment cancelled");
        self.reload(id).await
    }

    /// Refund a completed payment (admin only; enforced by the router)
    pub async fn refund(&self, id: i64) -> Result<Payment, PaymentServiceError> {
        let payment = self.reload(id).await?;
        if !payment.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(PaymentServiceError::Conflict(format!(
                "Cannot refund a {} payment",
                payment.status
            )));
        }

        let applied = self
            .payments
            .mark_refunded(id)
            .await
            .context("Failed to refund payment")?;
        if !applied {
            return Err(PaymentServiceError::Conflict(
                "Payment is no longer completed".to_string(),
            ));
        }

        tracing::info!(id, amount = payment.amount, "Payment refunded");
        self.reload(id).await
    }

    /// Payments where the user pays or gets paid, newest first
    pub async fn list_for_user(&self, user: &User) -> Result<Vec<Payment>, PaymentServiceError> {
        let payments = self
            .payments
            .list_for_user(user.id)
            .await
            .context("Failed to list payments")?;

        Ok(payments)
    }

    /// A payment visible to its payer, its payee and admins
    pub async fn get(&self, viewer: &User, id: i64) -> Result<Payment, PaymentServiceError> {
        let payment = self.reload(id).await?;
        if !viewer.is_admin() && !payment.involves(viewer.id) {
            return Err(PaymentServiceError::Forbidden(
                "You are not part of this payment".to_string(),
            ));
        }
        Ok(payment)
    }

    async fn get_pending_for_payer(
        &self,
        payer: &User,
        id: i64,
    ) -> Result<Payment, PaymentServiceError> {
        let payment = self.reload(id).await?;
        if payment.payer_id != payer.id {
            return Err(PaymentServiceError::Forbidden(
                "Only the payer can do this".to_string(),
            ));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(PaymentServiceError::Conflict(format!(
                "Payment is already {}",
                payment.status
            )));
        }
        Ok(payment)
    }

    async fn reload(&self, id: i64) -> Result<Payment, PaymentServiceError> {
        self.payments
            .get_by_id(id)
            .await
            .context("Failed to get payment")?
            .ok_or_else(|| PaymentServiceError::NotFound("Payment not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ListingRepository, SqlxApplicationRepository, SqlxListingRepository,
        SqlxPaymentRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Application, Listing, ListingStatus, UserRole};

    struct DecliningProcessor;

    #[async_trait]
    impl PaymentProcessor for DecliningProcessor {
        async fn charge(&self, _payment: &Payment) -> Result<ChargeOutcome> {
            Ok(ChargeOutcome::Declined {
                reason: "card declined".to_string(),
            })
        }
    }

    struct Fixture {
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        creator: User,
        sponsor: User,
        admin: User,
        application: Application,
    }

    impl Fixture {
        fn service(&self, processor: Arc<dyn PaymentProcessor>) -> PaymentService {
            PaymentService::new(
                self.payments.clone(),
                self.applications.clone(),
                processor,
                FeeSchedule::default(),
            )
        }

        async fn accept(&self) {
            self.applications
                .transition(
                    self.application.id,
                    ApplicationStatus::Pending,
                    ApplicationStatus::Accepted,
                )
                .await
                .unwrap();
        }
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let listings = SqlxListingRepository::boxed(pool.clone());
        let applications = SqlxApplicationRepository::boxed(pool.clone());
        let payments = SqlxPaymentRepository::boxed(pool);

        let mut made = Vec::new();
        for (email, role) in [
            ("creator@example.com", UserRole::Creator),
            ("sponsor@example.com", UserRole::Sponsor),
            ("admin@example.com", UserRole::Admin),
        ] {
            let user = User::new(email.to_string(), email.to_string(), "hash".to_string(), role);
            made.push(users.create(&user).await.unwrap());
        }
        let admin = made.pop().unwrap();
        let sponsor = made.pop().unwrap();
        let creator = made.pop().unwrap();

        let now = Utc::now();
        let listing = listings
            .create(&Listing {
                id: 0,
                owner_id: creator.id,
                category_id: 1,
                title: "Open mic".to_string(),
                description: "Monthly".to_string(),
                location: None,
                audience_size: 150,
                price: 100_00,
                status: ListingStatus::Active,
                event_date: None,
                image: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        let application = applications
            .create(&Application {
                id: 0,
                listing_id: listing.id,
                sponsor_id: sponsor.id,
                message: "Count us in".to_string(),
                offer_amount: 100_00,
                status: ApplicationStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        Fixture {
            applications,
            payments,
            creator,
            sponsor,
            admin,
            application,
        }
    }

    #[test]
    fn test_default_breakdown() {
        let fees = FeeSchedule::default();
        let b = fees.breakdown(100_00).unwrap();

        // 10% platform, 2.9% + 30c processing
        assert_eq!(b.platform_fee, 10_00);
        assert_eq!(b.processing_fee, 290 + 30);
        assert_eq!(b.total_charged, 100_00 + 320);
        assert_eq!(b.payout_amount, 90_00);
    }

    #[test]
    fn test_half_up_rounding() {
        assert_eq!(apply_bps(5, 1000), 1); // 0.5 -> 1
        assert_eq!(apply_bps(4, 1000), 0); // 0.4 -> 0
        assert_eq!(apply_bps(15, 1000), 2); // 1.5 -> 2
        assert_eq!(apply_bps(1, 290), 0);
        assert_eq!(apply_bps(i64::MAX / 2, 10_000), i64::MAX / 2);
    }

    #[test]
    fn test_quote_rejects_non_positive() {
        let fees = FeeSchedule::default();
        assert!(matches!(fees.quote(0), Err(PaymentServiceError::ValidationError(_))));
        assert!(matches!(fees.quote(-5), Err(PaymentServiceError::ValidationError(_))));
        assert!(fees.quote(1).is_ok());
    }

    #[test]
    fn test_quote_rejects_huge_amounts() {
        let fees = FeeSchedule::default();
        assert!(fees.quote(MAX_AMOUNT_CENTS).is_ok());
        assert!(matches!(
            fees.quote(MAX_AMOUNT_CENTS + 1),
            Err(PaymentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            fees.quote(i64::MAX),
            Err(PaymentServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn test_breakdown_overflow_is_none() {
        let fees = FeeSchedule::default();
        assert!(fees.breakdown(i64::MAX).is_none());
        assert!(fees.breakdown(i64::MAX - 1_000).is_none());

        let flat = FeeSchedule {
            processing_fee_fixed_cents: i64::MAX,
            ..FeeSchedule::default()
        };
        assert!(flat.breakdown(1).is_none());
    }

    #[tokio::test]
    async fn test_simulated_processor() {
        let mut payment = Payment {
            id: 1,
            application_id: 1,
            payer_id: 1,
            payee_id: 2,
            amount: 100,
            platform_fee: 10,
            processing_fee: 33,
            total_charged: 133,
            payout_amount: 90,
            currency: "usd".to_string(),
            status: PaymentStatus::Pending,
            processor_ref: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };

        match SimulatedProcessor.charge(&payment).await.unwrap() {
            ChargeOutcome::Approved { reference } => assert!(reference.starts_with("sim_")),
            other => panic!("unexpected outcome: {:?}", other),
        }

        payment.total_charged = 0;
        assert!(matches!(
            SimulatedProcessor.charge(&payment).await.unwrap(),
            ChargeOutcome::Declined { .. }
        ));
    }

    #[tokio::test]
    async fn test_payment_requires_accepted_application() {
        let f = setup().await;
        let service = f.service(Arc::new(SimulatedProcessor));

        assert!(matches!(
            service.create(&f.sponsor, f.application.id).await,
            Err(PaymentServiceError::ValidationError(_))
        ));

        f.accept().await;
        assert!(matches!(
            service.create(&f.creator, f.application.id).await,
            Err(PaymentServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.create(&f.sponsor, 9999).await,
            Err(PaymentServiceError::NotFound(_))
        ));

        let payment = service.create(&f.sponsor, f.application.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.payee_id, f.creator.id);
        assert_eq!(payment.amount, 100_00);
        assert_eq!(payment.currency, "usd");

        assert!(matches!(
            service.create(&f.sponsor, f.application.id).await,
            Err(PaymentServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_then_refund() {
        let f = setup().await;
        f.accept().await;
        let service = f.service(Arc::new(SimulatedProcessor));
        let payment = service.create(&f.sponsor, f.application.id).await.unwrap();

        assert!(matches!(
            service.confirm(&f.creator, payment.id).await,
            Err(PaymentServiceError::Forbidden(_))
        ));

        let confirmed = service.confirm(&f.sponsor, payment.id).await.unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Completed);
        assert!(confirmed.completed_at.is_some());
        assert!(confirmed.processor_ref.as_deref().unwrap_or("").starts_with("sim_"));

        assert!(matches!(
            service.confirm(&f.sponsor, payment.id).await,
            Err(PaymentServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.cancel(&f.sponsor, payment.id).await,
            Err(PaymentServiceError::Conflict(_))
        ));

        let refunded = service.refund(payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert!(matches!(
            service.refund(payment.id).await,
            Err(PaymentServiceError::Conflict(_))
        ));

        // a refunded payment no longer blocks a new one
        assert!(service.create(&f.sponsor, f.application.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_declined_charge_fails_payment() {
        let f = setup().await;
        f.accept().await;
        let service = f.service(Arc::new(DecliningProcessor));
        let payment = service.create(&f.sponsor, f.application.id).await.unwrap();

        let failed = service.confirm(&f.sponsor, payment.id).await.unwrap();

        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
        assert!(matches!(
            service.refund(payment.id).await,
            Err(PaymentServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_and_visibility() {
        let f = setup().await;
        f.accept().await;
        let service = f.service(Arc::new(SimulatedProcessor));
        let payment = service.create(&f.sponsor, f.application.id).await.unwrap();

        let cancelled = service.cancel(&f.sponsor, payment.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Failed);
        assert_eq!(cancelled.failure_reason.as_deref(), Some(CANCELLED_REASON));

        assert!(service.get(&f.creator, payment.id).await.is_ok());
        assert!(service.get(&f.admin, payment.id).await.is_ok());
        assert!(matches!(
            service.get(&f.admin, 9999).await,
            Err(PaymentServiceError::NotFound(_))
        ));
        let outsider = User {
            id: 4242,
            ..f.sponsor.clone()
        };
        assert!(matches!(
            service.get(&outsider, payment.id).await,
            Err(PaymentServiceError::Forbidden(_))
        ));

        assert_eq!(service.list_for_user(&f.creator).await.unwrap().len(), 1);
        assert_eq!(service.list_for_user(&f.sponsor).await.unwrap().len(), 1);
    }
}
