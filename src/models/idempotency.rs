//! Idempotency record model.
//!
//! An `IdempotencyRecord` binds a client-supplied key to the response it
//! resolved to, written in the same commit as the `Transaction` it describes
//! (spec §3, §4.2). It is the durable, restart-surviving, cross-worker-visible
//! gate that turns at-least-once ingress into at-most-once state change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub transaction_id: Uuid,
    pub response_snapshot: serde_json::Value,
    /// Digest of the `TransferRequest` that first bound this key, compared on
    /// every subsequent `peek` (spec §4.5 "409 on uniqueness conflict with a
    /// different request body under the same key").
    pub request_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// A record with `now > expires_at` must be treated as absent (spec §4.2) -
    /// the engine never deletes it synchronously, so every read site calls this
    /// rather than trusting row presence.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The cached response returned by `IdempotencyLayer::peek` on a non-expired hit.
#[derive(Debug, Clone, Serialize)]
pub struct CachedResponse {
    pub transaction_id: Uuid,
    pub snapshot: serde_json::Value,
}
