//! Transaction row access.

use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::transaction::TransactionType;
use crate::models::transaction::Transaction as TransactionRow;

pub async fn find_by_id(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> Result<Option<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(SELECT_COLUMNS_WHERE_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_idempotency_key(
    pool: &sqlx::PgPool,
    key: &str,
) -> Result<Option<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(SELECT_COLUMNS_WHERE_KEY)
        .bind(key)
        .fetch_optional(pool)
        .await
}

const SELECT_COLUMNS_WHERE_ID: &str = r#"
    SELECT id, idempotency_key, from_account_id, to_account_id, amount, currency,
           transaction_type, status, failure_reason, created_at, completed_at, version
    FROM transactions
    WHERE id = $1
"#;

const SELECT_COLUMNS_WHERE_KEY: &str = r#"
    SELECT id, idempotency_key, from_account_id, to_account_id, amount, currency,
           transaction_type, status, failure_reason, created_at, completed_at, version
    FROM transactions
    WHERE idempotency_key = $1
"#;

/// Insert a terminally `COMPLETED` transaction row. Called once, inside the
/// same commit as the balance deltas, the outbox row and the idempotency
/// record (spec §3 "atomic quartet").
#[allow(clippy::too_many_arguments)]
pub async fn insert_completed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    idempotency_key: &str,
    from_account_id: Uuid,
    to_account_id: Uuid,
    amount: Decimal,
    currency: &str,
    transaction_type: TransactionType,
) -> Result<TransactionRow, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, idempotency_key, from_account_id, to_account_id, amount, currency,
            transaction_type, status, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'COMPLETED', NOW())
        RETURNING id, idempotency_key, from_account_id, to_account_id, amount, currency,
                  transaction_type, status, failure_reason, created_at, completed_at, version
        "#,
    )
    .bind(id)
    .bind(idempotency_key)
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(amount)
    .bind(currency)
    .bind(transaction_type)
    .fetch_one(&mut **tx)
    .await
}

/// Insert a terminally `FAILED` transaction row. No outbox event and no
/// idempotency record accompany it (spec §4.1 step 4) - the client may
/// retry the same key after fixing the rejected condition.
#[allow(clippy::too_many_arguments)]
pub async fn insert_failed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    idempotency_key: &str,
    from_account_id: Uuid,
    to_account_id: Uuid,
    amount: Decimal,
    currency: &str,
    transaction_type: TransactionType,
    failure_reason: &str,
) -> Result<TransactionRow, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, idempotency_key, from_account_id, to_account_id, amount, currency,
            transaction_type, status, failure_reason
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'FAILED', $8)
        RETURNING id, idempotency_key, from_account_id, to_account_id, amount, currency,
                  transaction_type, status, failure_reason, created_at, completed_at, version
        "#,
    )
    .bind(id)
    .bind(idempotency_key)
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(amount)
    .bind(currency)
    .bind(transaction_type)
    .bind(failure_reason)
    .fetch_one(&mut **tx)
    .await
}

/// Upgrade a previously `FAILED` row to `COMPLETED` in place, on a later
/// retry under the same idempotency key that now validates successfully.
///
/// This is the one documented exception to "status is set terminally... never
/// mutated afterwards" (spec §3) - see DESIGN.md's resolution of the
/// transactions.idempotency_key permanent-uniqueness tension. `COMPLETED`
/// itself is still never mutated once reached.
///
/// Guarded on `expected_version` (spec §2 "optimistic version check"): a
/// mismatch means the row moved out from under the caller between the read
/// that produced `expected_version` and this update, and surfaces as
/// `sqlx::Error::RowNotFound` - the Processor treats that the same as a
/// deadlock/serialization abort and retries.
pub async fn upgrade_failed_to_completed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    expected_version: i64,
) -> Result<TransactionRow, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET status = 'COMPLETED', failure_reason = NULL, completed_at = NOW(), version = version + 1
        WHERE id = $1 AND status = 'FAILED' AND version = $2
        RETURNING id, idempotency_key, from_account_id, to_account_id, amount, currency,
                  transaction_type, status, failure_reason, created_at, completed_at, version
        "#,
    )
    .bind(id)
    .bind(expected_version)
    .fetch_one(&mut **tx)
    .await
}

/// Refresh the failure reason on a still-`FAILED` row without changing its
/// status, when a resubmission under the same key is rejected again.
///
/// Guarded on `expected_version`, same rationale as
/// `upgrade_failed_to_completed`.
pub async fn refresh_failure_reason(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    failure_reason: &str,
    expected_version: i64,
) -> Result<TransactionRow, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET failure_reason = $2, version = version + 1
        WHERE id = $1 AND status = 'FAILED' AND version = $3
        RETURNING id, idempotency_key, from_account_id, to_account_id, amount, currency,
                  transaction_type, status, failure_reason, created_at, completed_at, version
        "#,
    )
    .bind(id)
    .bind(failure_reason)
    .bind(expected_version)
    .fetch_one(&mut **tx)
    .await
}
