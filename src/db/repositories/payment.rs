//! Payment repository
//!
//! Database operations for payments. Status changes are conditional
//! updates on the current status so a payment cannot be settled twice.

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Payment, PaymentTotals};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const PAYMENT_COLUMNS: &str = "id, application_id, payer_id, payee_id, amount, platform_fee, \
     processing_fee, total_charged, payout_amount, currency, status, processor_ref, \
     failure_reason, created_at, updated_at, completed_at";

/// Payment repository trait
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Create a new payment
    async fn create(&self, payment: &Payment) -> Result<Payment>;

    /// Get payment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Payment>>;

    /// Pending or completed payment for an application, if any
    async fn find_open_for_application(&self, application_id: i64) -> Result<Option<Payment>>;

    /// Payments where the user is payer or payee, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Payment>>;

    /// Pending -> completed. Returns false if the payment was not pending.
    async fn mark_completed(&self, id: i64, processor_ref: &str) -> Result<bool>;

    /// Pending -> failed. Returns false if the payment was not pending.
    async fn mark_failed(&self, id: i64, reason: &str) -> Result<bool>;

    /// Completed -> refunded. Returns false if the payment was not completed.
    async fn mark_refunded(&self, id: i64) -> Result<bool>;

    /// Count and sums over completed payments
    async fn completed_totals(&self) -> Result<PaymentTotals>;
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    application_id: i64,
    payer_id: i64,
    payee_id: i64,
    amount: i64,
    platform_fee: i64,
    processing_fee: i64,
    total_charged: i64,
    payout_amount: i64,
    currency: String,
    status: String,
    processor_ref: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: row.id,
            application_id: row.application_id,
            payer_id: row.payer_id,
            payee_id: row.payee_id,
            amount: row.amount,
            platform_fee: row.platform_fee,
            processing_fee: row.processing_fee,
            total_charged: row.total_charged,
            payout_amount: row.payout_amount,
            currency: row.currency,
            status: row.status.parse()?,
            processor_ref: row.processor_ref,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

/// SQLx-based payment repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxPaymentRepository {
    pool: DynDatabasePool,
}

impl SqlxPaymentRepository {
    /// Create a new SQLx payment repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PaymentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PaymentRepository for SqlxPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<Payment> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO payments (application_id, payer_id, payee_id, amount, platform_fee,
                processing_fee, total_charged, payout_amount, currency, status, processor_ref,
                failure_reason, created_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(payment.application_id)
                .bind(payment.payer_id)
                .bind(payment.payee_id)
                .bind(payment.amount)
                .bind(payment.platform_fee)
                .bind(payment.processing_fee)
                .bind(payment.total_charged)
                .bind(payment.payout_amount)
                .bind(&payment.currency)
                .bind(payment.status.to_string())
                .bind(&payment.processor_ref)
                .bind(&payment.failure_reason)
                .bind(now)
                .bind(now)
                .bind(payment.completed_at)
                .execute(conn)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create payment")?;

        Ok(Payment {
            id,
            created_at: now,
            updated_at: now,
            ..payment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PaymentRow>(&sql).bind(id).fetch_optional(conn).await
        })
        .context("Failed to get payment by ID")?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_open_for_application(&self, application_id: i64) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE application_id = ? AND status IN ('pending', 'completed') ORDER BY id DESC LIMIT 1",
            PAYMENT_COLUMNS
        );
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PaymentRow>(&sql)
                .bind(application_id)
                .fetch_optional(conn)
                .await
        })
        .context("Failed to find payment for application")?;

        row.map(Payment::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE payer_id = ? OR payee_id = ? ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PaymentRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(conn)
                .await
        })
        .context("Failed to list payments")?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn mark_completed(&self, id: i64, processor_ref: &str) -> Result<bool> {
        let now = Utc::now();
        let affected = on_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE payments SET status = 'completed', processor_ref = ?, completed_at = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
            )
            .bind(processor_ref)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(conn)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to complete payment")?;

        Ok(affected > 0)
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> Result<bool> {
        let affected = on_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE payments SET status = 'failed', failure_reason = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
            )
            .bind(reason)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to fail payment")?;

        Ok(affected > 0)
    }

    async fn mark_refunded(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE payments SET status = 'refunded', updated_at = ? WHERE id = ? AND status = 'completed'",
            )
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to refund payment")?;

        Ok(affected > 0)
    }

    async fn completed_totals(&self) -> Result<PaymentTotals> {
        let sql = r#"
            SELECT COUNT(*) AS completed_count,
                CAST(COALESCE(SUM(amount), 0) AS SIGNED INTEGER) AS gross_volume,
                CAST(COALESCE(SUM(platform_fee), 0) AS SIGNED INTEGER) AS platform_fees
            FROM payments
            WHERE status = 'completed'
        "#;
        let totals = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PaymentTotals>(sql).fetch_one(conn).await
        })
        .context("Failed to compute payment totals")?;

        Ok(totals)
    }
}
