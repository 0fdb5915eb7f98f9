//! Account row access: row-level write locks and balance mutation.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::account::Account;
use rust_decimal::Decimal;

/// Lock an account row `FOR UPDATE` inside the caller's transaction.
///
/// This is the suspension point spec §5 calls out as "lock acquisition on
/// each account row" - callers must acquire both account locks in ascending
/// id order (spec §4.1 "fixed global order") to keep the wait-for graph a
/// DAG under opposing transfers.
pub async fn lock_for_update(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, name, balance, currency, status, created_at, updated_at, version
        FROM accounts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Apply a signed balance delta (positive = credit, negative = debit) to an
/// already-locked account row, bumping `version` and `updated_at`.
///
/// Guarded on `expected_version` (spec §2 "optimistic version check", §4.1
/// retry policy): the row is already held under `FOR UPDATE` by the caller,
/// so this should always match in practice - the guard is a backstop for any
/// write that reaches this path without first taking the lock, and its
/// failure mode (zero rows affected) is the "optimistic version mismatch"
/// case the Processor's retry loop treats the same as a deadlock/
/// serialization abort. Returns the number of rows affected (0 or 1) rather
/// than erroring, since a version mismatch here is not a database error.
///
/// The caller must have validated `balance + delta >= 0` beforehand (spec
/// §3 balance invariant); the accompanying CHECK constraint is the backstop.
pub async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    delta: Decimal,
    expected_version: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = balance + $1,
            updated_at = NOW(),
            version = version + 1
        WHERE id = $2 AND version = $3
        "#,
    )
    .bind(delta)
    .bind(account_id)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

pub async fn find_by_id(
    pool: &sqlx::PgPool,
    account_id: Uuid,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "SELECT id, name, balance, currency, status, created_at, updated_at, version FROM accounts WHERE id = $1",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_all(pool: &sqlx::PgPool) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "SELECT id, name, balance, currency, status, created_at, updated_at, version FROM accounts ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn insert(
    pool: &sqlx::PgPool,
    name: &str,
    currency: &str,
    initial_balance: Decimal,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (name, currency, balance)
        VALUES ($1, $2, $3)
        RETURNING id, name, balance, currency, status, created_at, updated_at, version
        "#,
    )
    .bind(name)
    .bind(currency)
    .bind(initial_balance)
    .fetch_one(pool)
    .await
}
