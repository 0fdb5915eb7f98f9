//! Outbox event model.
//!
//! A store-resident queue of events committed atomically with business state
//! (spec §3, §9 "dual-write problem"), later drained by the Outbox Relay to
//! the downstream bus. Created `PENDING` in the same commit as the
//! `Transaction` it describes; mutated only by the Relay thereafter.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

/// Event type stamped on every Relay-published ledger event (spec §6).
pub const TRANSACTION_COMPLETED: &str = "TRANSACTION_COMPLETED";
