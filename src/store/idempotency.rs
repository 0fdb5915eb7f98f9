//! Idempotency record access (spec §4.2).

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::idempotency::IdempotencyRecord;

/// Read-only lookup by key. Returns the row even if expired - callers decide
/// absence via `IdempotencyRecord::is_expired`, since the engine never
/// deletes expired rows synchronously (spec §4.2).
pub async fn find_by_key(
    pool: &sqlx::PgPool,
    key: &str,
) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
    sqlx::query_as::<_, IdempotencyRecord>(
        "SELECT id, idempotency_key, transaction_id, response_snapshot, request_fingerprint,
                created_at, expires_at
         FROM idempotency_records WHERE idempotency_key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

/// Bind a key to the transaction it resolved to, inside the same commit that
/// produced the `COMPLETED` Transaction row (spec §4.2). Uniqueness on `key`
/// means a losing concurrent admission aborts here with a unique violation -
/// the Processor surfaces that as a retry that then finds the winner's row
/// on the next `find_by_key`.
#[allow(clippy::too_many_arguments)]
pub async fn bind(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
    transaction_id: Uuid,
    response_snapshot: serde_json::Value,
    request_fingerprint: &str,
    expires_at: DateTime<Utc>,
) -> Result<IdempotencyRecord, sqlx::Error> {
    sqlx::query_as::<_, IdempotencyRecord>(
        r#"
        INSERT INTO idempotency_records (idempotency_key, transaction_id, response_snapshot, request_fingerprint, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, idempotency_key, transaction_id, response_snapshot, request_fingerprint,
                  created_at, expires_at
        "#,
    )
    .bind(key)
    .bind(transaction_id)
    .bind(response_snapshot)
    .bind(request_fingerprint)
    .bind(expires_at)
    .fetch_one(&mut **tx)
    .await
}
