//! Integration tests for the Transaction Processor (spec.md §8), driven
//! against a disposable Postgres database via `sqlx::test`. Each test gets
//! its own freshly migrated database, so account setup is inline per test.

use chrono::Utc;
use ledger_transfer_engine::error::AppError;
use ledger_transfer_engine::models::transaction::{TransactionStatus, TransactionType, TransferRequest};
use ledger_transfer_engine::services::backoff::Backoff;
use ledger_transfer_engine::services::processor::TransactionProcessor;
use ledger_transfer_engine::store;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

fn processor(pool: PgPool) -> TransactionProcessor {
    TransactionProcessor::new(pool, 24, Backoff::new(100, 2000, 3))
}

fn transfer_request(
    from: Uuid,
    to: Uuid,
    amount: Decimal,
    currency: &str,
    key: &str,
) -> TransferRequest {
    TransferRequest {
        event_id: Uuid::new_v4(),
        transaction_id: Uuid::new_v4(),
        from_account_id: from,
        to_account_id: to,
        amount,
        currency: currency.to_string(),
        transaction_type: TransactionType::Transfer,
        timestamp: Utc::now(),
        idempotency_key: key.to_string(),
    }
}

/// Scenario 1 (spec.md §8): happy path debits one account, credits the
/// other, and leaves a COMPLETED transaction behind.
#[sqlx::test]
async fn happy_path_moves_balance_and_commits(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-001", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-002", "USD", dec!(100.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(100.00), "USD", "k1");
    let txn = proc.process(req).await.expect("happy path should commit");

    assert_eq!(txn.status, TransactionStatus::Completed);

    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    let b_after = store::accounts::find_by_id(&pool, b.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(400.0000));
    assert_eq!(b_after.balance, dec!(200.0000));

    Ok(())
}

/// Scenario 2: an identical duplicate request returns a byte-equal response
/// and moves no further balance.
#[sqlx::test]
async fn duplicate_key_replays_without_double_spending(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-001", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-002", "USD", dec!(100.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(100.00), "USD", "k1");

    let first = proc.process(req.clone()).await.expect("first attempt commits");
    let second = proc.process(req).await.expect("replay returns cached response");

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, second.status);
    assert_eq!(first.amount, second.amount);

    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(400.0000), "balance must not move twice");

    Ok(())
}

/// Reusing an idempotency key with a different request body is rejected as
/// a conflict (spec.md §4.5), never silently replayed.
#[sqlx::test]
async fn reused_key_with_different_body_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-001b", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-002b", "USD", dec!(100.0000)).await?;

    let proc = processor(pool.clone());
    let first = transfer_request(a.id, b.id, dec!(100.0000), "USD", "k1b");
    proc.process(first).await.expect("first attempt commits");

    let second = transfer_request(a.id, b.id, dec!(200.0000), "USD", "k1b");
    let result = proc.process(second).await;

    assert!(matches!(result, Err(AppError::IdempotencyPayloadConflict(_))));

    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(400.0000), "conflicting replay must not move balance again");

    Ok(())
}

/// Scenario 3: insufficient funds commits a FAILED row, leaves balances
/// untouched, and writes neither an outbox event nor an idempotency record.
#[sqlx::test]
async fn insufficient_funds_commits_failed_row_with_no_side_effects(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-003", "USD", dec!(50.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-004", "USD", dec!(0.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(100.0000), "USD", "k2");
    let txn = proc.process(req).await.expect("validation failure still commits a row");

    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(
        txn.failure_reason
            .as_deref()
            .unwrap_or("")
            .contains("insufficient"),
        "reason must mention insufficient funds: {:?}",
        txn.failure_reason
    );

    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(50.0000));

    let idempotency = store::idempotency::find_by_key(&pool, "k2").await?;
    assert!(idempotency.is_none(), "FAILED transactions are not bound for idempotency");

    Ok(())
}

/// Boundary case: amount exactly equal to source balance succeeds and
/// leaves the source account at exactly zero.
#[sqlx::test]
async fn amount_equal_to_balance_succeeds_and_zeroes_source(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-005", "USD", dec!(25.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-006", "USD", dec!(0.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(25.0000), "USD", "k3");
    let txn = proc.process(req).await.expect("exact balance transfer should succeed");

    assert_eq!(txn.status, TransactionStatus::Completed);
    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, Decimal::ZERO);

    Ok(())
}

/// Boundary case: one minor unit over balance is rejected, no state moves.
#[sqlx::test]
async fn amount_one_minor_unit_over_balance_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-007", "USD", dec!(25.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-008", "USD", dec!(0.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(25.0001), "USD", "k4");
    let txn = proc.process(req).await.expect("over-balance should still commit a FAILED row");

    assert_eq!(txn.status, TransactionStatus::Failed);
    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(25.0000));

    Ok(())
}

/// Boundary case: self-transfer is rejected as a validation failure and
/// never attempts to double-lock the same row.
#[sqlx::test]
async fn self_transfer_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-009", "USD", dec!(100.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, a.id, dec!(10.0000), "USD", "k5");
    let txn = proc.process(req).await.expect("self-transfer still commits a FAILED row");

    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(txn.failure_reason.unwrap_or_default().contains("self-transfer"));

    Ok(())
}

/// Currency mismatch between the two accounts is a deterministic business
/// rejection, not an error.
#[sqlx::test]
async fn currency_mismatch_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-010", "USD", dec!(100.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-011", "EUR", dec!(100.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, dec!(10.0000), "USD", "k6");
    let txn = proc.process(req).await.expect("mismatch still commits a FAILED row");

    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(txn.failure_reason.unwrap_or_default().contains("currency"));

    Ok(())
}

/// Scenario 4: concurrent opposing transfers both eventually commit and
/// conserve total value, regardless of which one wins the lock race.
#[sqlx::test]
async fn concurrent_opposing_transfers_conserve_value(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-012", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-013", "USD", dec!(500.0000)).await?;

    let proc_a = std::sync::Arc::new(processor(pool.clone()));
    let proc_b = proc_a.clone();

    let req_ab = transfer_request(a.id, b.id, dec!(30.0000), "USD", "k7");
    let req_ba = transfer_request(b.id, a.id, dec!(40.0000), "USD", "k8");

    let (r1, r2) = tokio::join!(
        proc_a.process(req_ab),
        proc_b.process(req_ba),
    );

    let t1 = r1.expect("A->B should eventually commit");
    let t2 = r2.expect("B->A should eventually commit");
    assert_eq!(t1.status, TransactionStatus::Completed);
    assert_eq!(t2.status, TransactionStatus::Completed);

    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    let b_after = store::accounts::find_by_id(&pool, b.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(510.0000));
    assert_eq!(b_after.balance, dec!(490.0000));
    assert_eq!(a_after.balance + b_after.balance, dec!(1000.0000));

    Ok(())
}

/// Scenario 6: an expired idempotency record is treated as absent, and the
/// request is reprocessed into a brand-new transaction.
#[sqlx::test]
async fn expired_idempotency_record_is_reprocessed(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-014", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-015", "USD", dec!(0.0000)).await?;

    // window_hours = 0 means "already expired" the instant it's bound.
    let proc = TransactionProcessor::new(pool.clone(), 0, Backoff::new(100, 2000, 3));
    let req1 = transfer_request(a.id, b.id, dec!(10.0000), "USD", "k9");
    let first = proc.process(req1).await.expect("first attempt commits");

    let req2 = transfer_request(a.id, b.id, dec!(10.0000), "USD", "k9");
    let second = proc.process(req2).await.expect("second attempt reprocesses");

    assert_ne!(first.id, second.id, "expired record must not replay the old transaction id");
    let a_after = store::accounts::find_by_id(&pool, a.id).await?.unwrap();
    assert_eq!(a_after.balance, dec!(480.0000), "both transfers should have debited the account");

    Ok(())
}

/// A transactionId reused under a different idempotencyKey is an invariant
/// violation (DESIGN.md open-question (ii)), never silently accepted.
#[sqlx::test]
async fn reused_transaction_id_under_different_key_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-016", "USD", dec!(500.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-017", "USD", dec!(0.0000)).await?;

    let proc = processor(pool.clone());
    let req1 = transfer_request(a.id, b.id, dec!(10.0000), "USD", "k10");
    let shared_id = req1.transaction_id;
    let first = proc.process(req1.clone()).await.expect("first commits");
    assert_eq!(first.id, shared_id);

    let mut req2 = transfer_request(a.id, b.id, dec!(10.0000), "USD", "k11");
    req2.transaction_id = shared_id;
    let result = proc.process(req2).await;
    assert!(result.is_err(), "same transactionId under a different key must be rejected");

    Ok(())
}

/// Shape validation never reaches the store: non-positive amounts are
/// rejected before any account lock is attempted.
#[sqlx::test]
async fn non_positive_amount_is_rejected_before_any_lock(pool: PgPool) -> sqlx::Result<()> {
    let a = store::accounts::insert(&pool, "acc-018", "USD", dec!(100.0000)).await?;
    let b = store::accounts::insert(&pool, "acc-019", "USD", dec!(0.0000)).await?;

    let proc = processor(pool.clone());
    let req = transfer_request(a.id, b.id, Decimal::ZERO, "USD", "k12");
    let result = proc.process(req).await;
    assert!(result.is_err());

    Ok(())
}
