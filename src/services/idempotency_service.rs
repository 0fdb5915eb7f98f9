//! Idempotency Layer (spec §4.2): the deduplication gate that turns
//! at-least-once ingress into at-most-once state change while returning a
//! stable response to retries.
//!
//! Database-backed rather than in-memory on purpose: the record must survive
//! a process restart, be visible to every worker instance, and be written
//! atomically with the Transaction it describes. A cache outside the
//! transaction would re-introduce the dual-write problem (spec §4.2).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::idempotency::CachedResponse;
use crate::store;

/// Outcome of a `peek`, distinguishing "no record" from "record, but for a
/// different request body" (spec §4.5): the latter must surface as HTTP 409,
/// never as a silent replay of the original response.
pub enum PeekOutcome {
    Absent,
    Match(CachedResponse),
    Conflict,
}

/// Read-only lookup. `Absent` covers both no record existing and one that has
/// expired (spec §4.2) - either way the caller proceeds to process the
/// request as new. `Conflict` means the key is bound to a request whose
/// fingerprint doesn't match `request_fingerprint`.
pub async fn peek(
    pool: &PgPool,
    key: &str,
    request_fingerprint: &str,
) -> Result<PeekOutcome, sqlx::Error> {
    let now = Utc::now();
    let Some(record) = store::idempotency::find_by_key(pool, key).await? else {
        return Ok(PeekOutcome::Absent);
    };
    if record.is_expired(now) {
        return Ok(PeekOutcome::Absent);
    }
    if record.request_fingerprint != request_fingerprint {
        return Ok(PeekOutcome::Conflict);
    }
    Ok(PeekOutcome::Match(CachedResponse {
        transaction_id: record.transaction_id,
        snapshot: record.response_snapshot,
    }))
}

/// Bind `key` to the transaction it resolved to. Must be called inside the
/// same transaction that produced the `Transaction` row (spec §4.2) - the
/// unique index on `idempotency_key` makes a losing concurrent admission
/// abort here, which the Processor surfaces as a retry into `peek`.
pub async fn bind(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
    transaction_id: Uuid,
    response_snapshot: serde_json::Value,
    request_fingerprint: &str,
    window_hours: i64,
) -> Result<DateTime<Utc>, sqlx::Error> {
    let expires_at = Utc::now() + ChronoDuration::hours(window_hours);
    store::idempotency::bind(
        tx,
        key,
        transaction_id,
        response_snapshot,
        request_fingerprint,
        expires_at,
    )
    .await?;
    Ok(expires_at)
}
