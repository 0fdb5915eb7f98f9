//! Transaction data models and the ingress/egress wire shapes.
//!
//! This module defines:
//! - `Transaction`: database entity written exactly once, terminally, per request
//! - `TransactionType` / `TransactionStatus`: the entity's closed vocabularies
//! - `TransferRequest`: the normalized shape every ingress adapter maps onto
//! - `TransactionResponse`: the shape returned to callers and published downstream

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of money movement a request represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Payment,
    Transfer,
    Refund,
    Withdrawal,
}

/// Terminal or in-flight state of a transaction row.
///
/// Only `Completed` and `Failed` are terminal outcomes the Processor commits
/// (spec §4.1 step 4/5); `Pending`, `Processing` and `Cancelled` are carried
/// in the vocabulary per §3 but are not reachable through the `process`
/// operation as specified - they exist for forward compatibility with
/// deadline cancellation (§5) and manual operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. `idempotency_key` is unique across the
/// table (spec §3); `id` is the caller-supplied `transactionId`, never
/// generated server-side, so that a caller's retried request can be matched
/// back to the row it originally addressed (spec §4.1 tie-breaks).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub idempotency_key: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Normalized transfer request every ingress adapter (HTTP, bus consumer) maps
/// its own wire format onto before calling `TransactionProcessor::process`.
///
/// Field names follow the wire shape in spec §6 (`camelCase`); the HTTP
/// handler deserializes request bodies directly into this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub event_id: Uuid,
    pub transaction_id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Response returned to ingress callers and embedded as the Relay's
/// downstream event payload (spec §6 - same JSON shape in both places).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub idempotency_key: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.id,
            idempotency_key: t.idempotency_key,
            from_account_id: t.from_account_id,
            to_account_id: t.to_account_id,
            amount: t.amount,
            currency: t.currency,
            transaction_type: t.transaction_type,
            status: t.status,
            failure_reason: t.failure_reason,
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}
