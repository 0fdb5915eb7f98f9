//! Transaction HTTP handlers - the HTTP ingress adapter onto the
//! Transaction Processor.
//!
//! - `POST /api/v1/transactions` - submit a transfer
//! - `GET /api/v1/transactions/:id` - look up a transaction by id
//!
//! This is one of potentially several ingress adapters (a bus consumer is
//! the other, see `crate::consumer`) that normalize their own wire format
//! into a `TransferRequest` and hand it to the same `TransactionProcessor`.
//! Neither adapter scopes transactions by caller identity - the engine's
//! invariants (idempotency key, account locking) are caller-agnostic; the
//! API key only gates who may submit requests at all.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::transaction::{TransactionResponse, TransactionStatus, TransferRequest},
    services::processor::TransactionProcessor,
    store,
};

/// Submit a transfer.
///
/// Always returns 200 with a `TransactionResponse` body for both outcomes
/// the Processor can reach synchronously: a `COMPLETED` transfer and a
/// `FAILED` business rejection are both normal, successfully-processed
/// requests from the ingress adapter's point of view - only a `FAILED`
/// rejection gets HTTP 422 instead of 200, distinguishing "we rejected
/// your transfer" from "here is what happened to your transfer". Anything
/// that prevents a Transaction row from existing at all (malformed body,
/// unresolvable transient conflict) surfaces as an `AppError`.
pub async fn create_transaction(
    State(processor): State<std::sync::Arc<TransactionProcessor>>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = processor.process(request).await?;
    let status = match transaction.status {
        TransactionStatus::Failed => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    let response: TransactionResponse = transaction.into();
    Ok((status, Json(response)))
}

/// Look up a transaction by id.
pub async fn get_transaction(
    State(pool): State<crate::db::DbPool>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = store::transactions::find_by_id(&pool, transaction_id)
        .await?
        .ok_or(AppError::TransactionNotFound)?;

    Ok(Json(transaction.into()))
}
