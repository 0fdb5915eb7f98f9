//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! Business rejections (insufficient balance, inactive account, currency
//! mismatch, self-transfer) are *not* represented here - per spec §7 they
//! are committed as a `FAILED` Transaction row and returned as a normal
//! (200-shaped) payload with HTTP 422, not as an error. `AppError` covers
//! everything that prevents a Transaction row from ever being written:
//! malformed input, authentication, not-found, invariant violations, and
//! infrastructure failure. See `crate::services::processor::ValidationFailure`
//! for the business-rejection vocabulary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: any `sqlx::Error` from database operations that
///   isn't one of the two classified-transient kinds the Processor retries
/// - **Authentication Errors**: invalid or missing API keys
/// - **Resource Errors**: requested resources not found
/// - **Invariant Violations**: duplicate keys under different payloads - a
///   caller contract violation, not retried, surfaced to the operator
/// - **Validation Errors**: malformed request data (never reaches the store)
/// - **Unavailable**: transient store conflict survived every configured
///   retry attempt
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Requested account does not exist.
    ///
    /// Returns HTTP 404 Not Found. Used by the account-lookup admin
    /// endpoints, not by the Processor (whose "account missing" case is a
    /// business rejection, not an error - see module docs).
    #[error("Account not found")]
    AccountNotFound,

    /// Requested transaction does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Requested webhook endpoint does not exist or isn't owned by the caller.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Webhook endpoint not found")]
    WebhookNotFound,

    /// Webhook URL failed validation (scheme, length).
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    /// Request body or parameters are structurally invalid - missing field,
    /// non-positive amount, amount scale exceeding 4 fractional digits,
    /// malformed currency tag. The request never reaches the store.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A transaction row already exists for the requested `transactionId`
    /// under a *different* idempotency key than this request carries - a
    /// caller contract violation (spec §4.1 tie-breaks).
    ///
    /// Returns HTTP 409 Conflict. Not retried; requires operator attention
    /// (spec §7 "Invariant violation" - no automatic reconciliation).
    #[error("transactionId {0} already exists under a different idempotency key")]
    TransactionIdConflict(uuid::Uuid),

    /// The idempotency key was reused with a request body that does not
    /// match the one the key originally resolved to.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("idempotency key {0} was reused with a different request body")]
    IdempotencyPayloadConflict(String),

    /// A transient store conflict (serialization failure, deadlock, or
    /// optimistic version mismatch) survived every configured retry attempt.
    ///
    /// Returns HTTP 503 Service Unavailable - the caller should retry; no
    /// side effects were committed.
    #[error("store temporarily unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::AccountNotFound => {
                (StatusCode::NOT_FOUND, "account_not_found", self.to_string())
            }
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::WebhookNotFound => {
                (StatusCode::NOT_FOUND, "webhook_not_found", self.to_string())
            }
            AppError::InvalidWebhookUrl(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_webhook_url", msg.clone())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::TransactionIdConflict(_) => (
                StatusCode::CONFLICT,
                "transaction_id_conflict",
                self.to_string(),
            ),
            AppError::IdempotencyPayloadConflict(_) => (
                StatusCode::CONFLICT,
                "idempotency_payload_conflict",
                self.to_string(),
            ),
            AppError::Unavailable(ref msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Returns true if `err` is a Postgres serialization failure (`40001`) or
/// deadlock (`40P01`) - the two transient classes the Processor retries
/// with backoff (spec §4.1 "Retry policy").
pub fn is_transient_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("40001") | Some("40P01")
    )
}

/// Returns true if `err` is a Postgres unique-violation (`23505`) - used to
/// distinguish a racing idempotency-key or transaction-id insert from any
/// other database error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_never_transient() {
        // is_transient_conflict/is_unique_violation only make sense on sqlx::Error;
        // this just documents that a non-db AppError never gets routed through them.
        let err = AppError::InvalidRequest("amount must be positive".into());
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
