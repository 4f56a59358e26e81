//! Payment API endpoints
//!
//! Simulated settlement of accepted applications:
//! - GET /api/v1/payments/quote?amount= - Fee breakdown (public)
//! - POST /api/v1/payments - Start a payment (applying sponsor)
//! - POST /api/v1/payments/{id}/confirm - Charge (payer)
//! - POST /api/v1/payments/{id}/cancel - Abandon (payer)
//! - GET /api/v1/payments - Caller's payments
//! - GET /api/v1/payments/{id} - Single payment (payer, payee or admin)
//! - POST /api/v1/admin/payments/{id}/refund - Refund (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{FeeBreakdown, Payment};

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub fees: FeeBreakdown,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub application_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<Payment>,
}

/// GET /api/v1/payments/quote
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let schedule = state.payment_service.fees();
    let fees = schedule.quote(query.amount)?;

    Ok(Json(QuoteResponse {
        fees,
        currency: schedule.currency.clone(),
    }))
}

/// POST /api/v1/payments
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = state
        .payment_service
        .create(&user.0, body.application_id)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /api/v1/payments/{id}/confirm
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payment_service.confirm(&user.0, id).await?;
    Ok(Json(payment))
}

/// POST /api/v1/payments/{id}/cancel
pub async fn cancel_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payment_service.cancel(&user.0, id).await?;
    Ok(Json(payment))
}

/// GET /api/v1/payments
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let payments = state.payment_service.list_for_user(&user.0).await?;
    Ok(Json(PaymentListResponse { payments }))
}

/// GET /api/v1/payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payment_service.get(&user.0, id).await?;
    Ok(Json(payment))
}

/// POST /api/v1/admin/payments/{id}/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payment_service.refund(id).await?;
    tracing::info!(admin_id = user.0.id, payment_id = id, "Refund issued");
    Ok(Json(payment))
}
