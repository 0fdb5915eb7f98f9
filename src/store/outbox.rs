//! Outbox event access (spec §4.3, §4.4).

use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::outbox::OutboxEvent;

/// Write a `PENDING` event in the caller's open transaction - always inside
/// the commit that created the Transaction row it describes (spec §3).
pub async fn insert_pending(
    tx: &mut Transaction<'_, Postgres>,
    event_type: &str,
    aggregate_id: &str,
    payload: serde_json::Value,
) -> Result<OutboxEvent, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(
        r#"
        INSERT INTO outbox_events (event_type, aggregate_id, payload, status)
        VALUES ($1, $2, $3, 'PENDING')
        RETURNING id, event_type, aggregate_id, payload, status, created_at, published_at, retry_count, error_message
        "#,
    )
    .bind(event_type)
    .bind(aggregate_id)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await
}

/// Read up to `batch_size` oldest `PENDING` rows, served by the
/// `(status, created_at)` index (spec §3, §4.3).
pub async fn drain_pending(
    pool: &sqlx::PgPool,
    batch_size: i64,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(
        r#"
        SELECT id, event_type, aggregate_id, payload, status, created_at, published_at, retry_count, error_message
        FROM outbox_events
        WHERE status = 'PENDING'
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(batch_size)
    .fetch_all(pool)
    .await
}

pub async fn mark_published(pool: &sqlx::PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox_events SET status = 'PUBLISHED', published_at = $2 WHERE id = $1")
        .bind(id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failed publish attempt. Returns the row's new retry count so the
/// Relay can decide whether the ceiling has been exceeded.
pub async fn record_retry(
    pool: &sqlx::PgPool,
    id: Uuid,
    error_message: &str,
) -> Result<i32, sqlx::Error> {
    let (retry_count,): (i32,) = sqlx::query_as(
        r#"
        UPDATE outbox_events
        SET retry_count = retry_count + 1, error_message = $2
        WHERE id = $1
        RETURNING retry_count
        "#,
    )
    .bind(id)
    .bind(error_message)
    .fetch_one(pool)
    .await?;
    Ok(retry_count)
}

/// Move an event to the terminal `FAILED` state after it exceeds the
/// configured retry ceiling - requires operator intervention (spec §4.3).
pub async fn mark_failed(pool: &sqlx::PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox_events SET status = 'FAILED' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
