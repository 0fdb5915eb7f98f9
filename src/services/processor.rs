//! Transaction Processor (spec §4.1) - the atomic critical section that
//! validates, locks, debits, credits, records, and enqueues the downstream
//! event in a single commit.
//!
//! `process` is effectively idempotent on `idempotencyKey`: repeated
//! invocations return a response byte-equal to the first successful
//! response and perform no further state change.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use sqlx::{Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, is_transient_conflict, is_unique_violation};
use crate::models::account::{Account, AccountStatus};
use crate::models::outbox::TRANSACTION_COMPLETED;
use crate::models::transaction::{
    Transaction, TransactionResponse, TransactionStatus, TransferRequest,
};
use crate::services::backoff::Backoff;
use crate::services::idempotency_service::{self, PeekOutcome};
use crate::store;

/// Reasons a request fails deterministic business validation. Each commits a
/// terminal `FAILED` Transaction row (spec §4.1 step 4) rather than erroring
/// - the row is never retried and never bound in the idempotency table, so a
/// client that fixes the underlying condition can resubmit under the same key.
#[derive(Debug, Clone)]
enum ValidationFailure {
    SelfTransfer,
    AccountNotFound(Uuid),
    AccountInactive(Uuid, AccountStatus),
    CurrencyMismatch,
    InsufficientBalance,
    AmountScaleExceeded,
}

impl ValidationFailure {
    /// Human-readable reason stored on the Transaction row. Scenario 3 in
    /// spec §8 requires the insufficient-funds reason to contain "insufficient".
    fn reason(&self) -> String {
        match self {
            ValidationFailure::SelfTransfer => {
                "self-transfer: fromAccountId and toAccountId must differ".to_string()
            }
            ValidationFailure::AccountNotFound(id) => format!("account {id} not found"),
            ValidationFailure::AccountInactive(id, status) => {
                format!("account {id} is not active (status = {status:?})")
            }
            ValidationFailure::CurrencyMismatch => {
                "currency mismatch between request and account(s)".to_string()
            }
            ValidationFailure::InsufficientBalance => {
                "insufficient balance for requested transfer amount".to_string()
            }
            ValidationFailure::AmountScaleExceeded => {
                "amount exceeds 4 fractional digits of precision".to_string()
            }
        }
    }
}

/// Outcome of acquiring locks and validating against the current account
/// state; `Err` carries the reason a FAILED row should be committed instead.
struct LockedAccounts {
    from: Account,
    to: Account,
}

/// Internal classification the retry loop in `process` dispatches on.
enum ProcessorError {
    /// Serialization failure / deadlock / optimistic version mismatch -
    /// retried by the caller with backoff (spec §4.1 retry policy).
    Transient(String),
    /// Anything else: surfaced to the caller as-is.
    App(AppError),
}

impl From<sqlx::Error> for ProcessorError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_conflict(&err) {
            ProcessorError::Transient(err.to_string())
        } else {
            ProcessorError::App(AppError::Database(err))
        }
    }
}

pub struct TransactionProcessor {
    pool: DbPool,
    idempotency_window_hours: i64,
    backoff: Backoff,
}

impl TransactionProcessor {
    pub fn new(pool: DbPool, idempotency_window_hours: i64, backoff: Backoff) -> Self {
        Self {
            pool,
            idempotency_window_hours,
            backoff,
        }
    }

    /// Public entry point (spec §4.1). Validates request shape, takes the
    /// idempotency short-circuit, then drives the write-transaction retry
    /// loop for transient conflicts.
    pub async fn process(&self, req: TransferRequest) -> Result<Transaction, AppError> {
        validate_shape(&req)?;

        if let Some(txn) = self.resolve_cached(&req).await? {
            return Ok(txn);
        }

        let max_attempts = self.backoff.max_attempts().max(1);
        let mut last_transient = None;
        for attempt in 1..=max_attempts {
            match self.try_process_once(&req).await {
                Ok(txn) => return Ok(txn),
                Err(ProcessorError::App(e)) => return Err(e),
                Err(ProcessorError::Transient(msg)) => {
                    tracing::warn!(
                        transaction_id = %req.transaction_id,
                        attempt,
                        error = %msg,
                        "transient conflict, retrying"
                    );
                    last_transient = Some(msg);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        Err(AppError::Unavailable(last_transient.unwrap_or_else(|| {
            "transient store conflict exhausted all retry attempts".to_string()
        })))
    }

    /// Step 1 of spec §4.1: a read-only lookup outside any write-locking
    /// critical section. `None` means the request must be (re)processed.
    /// Deserializes `CachedResponse.snapshot` directly - no other table is
    /// touched on a cache hit (spec §4.1 step 1). A fingerprint mismatch
    /// (spec §4.5) is an error, not a cache miss.
    async fn resolve_cached(&self, req: &TransferRequest) -> Result<Option<Transaction>, AppError> {
        let fingerprint = request_fingerprint(req);
        match idempotency_service::peek(&self.pool, &req.idempotency_key, &fingerprint).await? {
            PeekOutcome::Absent => Ok(None),
            PeekOutcome::Conflict => Err(AppError::IdempotencyPayloadConflict(
                req.idempotency_key.clone(),
            )),
            PeekOutcome::Match(cached) => {
                let txn: Transaction = serde_json::from_value(cached.snapshot)
                    .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
                Ok(Some(txn))
            }
        }
    }

    /// One full attempt: open a transaction, validate under lock, and commit
    /// either a FAILED or COMPLETED row. Unique-constraint races are resolved
    /// by re-reading the winning row rather than treated as failures.
    async fn try_process_once(&self, req: &TransferRequest) -> Result<Transaction, ProcessorError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        match validate_and_lock(&mut tx, req).await? {
            Err(failure) => self.commit_failed(tx, req, &failure.reason(), None).await,
            Ok(locked) => self.commit_completed(tx, req, locked, None).await,
        }
    }

    /// Re-run validation for a request whose idempotency key already points
    /// at a `FAILED` transaction row (spec §4.1: "the client may retry after
    /// fixing the condition"). See DESIGN.md for why this upgrades the
    /// existing row in place instead of inserting a second one.
    async fn retry_failed_row(
        &self,
        req: &TransferRequest,
        existing_id: Uuid,
        existing_version: i64,
    ) -> Result<Transaction, ProcessorError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        match validate_and_lock(&mut tx, req).await? {
            Err(failure) => {
                self.commit_failed(
                    tx,
                    req,
                    &failure.reason(),
                    Some((existing_id, existing_version)),
                )
                .await
            }
            Ok(locked) => {
                self.commit_completed(tx, req, locked, Some((existing_id, existing_version)))
                    .await
            }
        }
    }

    async fn commit_failed(
        &self,
        mut tx: SqlxTransaction<'_, Postgres>,
        req: &TransferRequest,
        reason: &str,
        upgrade_existing: Option<(Uuid, i64)>,
    ) -> Result<Transaction, ProcessorError> {
        let row = if let Some((existing_id, existing_version)) = upgrade_existing {
            match store::transactions::refresh_failure_reason(
                &mut tx,
                existing_id,
                reason,
                existing_version,
            )
            .await
            {
                Ok(row) => row,
                Err(sqlx::Error::RowNotFound) => {
                    return Err(ProcessorError::Transient(
                        "optimistic version mismatch refreshing failed row, retrying".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let inserted = store::transactions::insert_failed(
                &mut tx,
                req.transaction_id,
                &req.idempotency_key,
                req.from_account_id,
                req.to_account_id,
                req.amount,
                &req.currency,
                req.transaction_type,
                reason,
            )
            .await;
            match inserted {
                Ok(row) => row,
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await.ok();
                    return self.resolve_conflicting_insert(req).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tx.commit().await?;
        tracing::info!(transaction_id = %row.id, status = ?row.status, "transaction committed");
        Ok(row)
    }

    async fn commit_completed(
        &self,
        mut tx: SqlxTransaction<'_, Postgres>,
        req: &TransferRequest,
        locked: LockedAccounts,
        upgrade_existing: Option<(Uuid, i64)>,
    ) -> Result<Transaction, ProcessorError> {
        let from_rows = store::accounts::apply_delta(
            &mut tx,
            locked.from.id,
            -req.amount,
            locked.from.version,
        )
        .await?;
        let to_rows =
            store::accounts::apply_delta(&mut tx, locked.to.id, req.amount, locked.to.version)
                .await?;
        if from_rows == 0 || to_rows == 0 {
            return Err(ProcessorError::Transient(
                "optimistic version mismatch applying account balance delta, retrying".to_string(),
            ));
        }

        let row = if let Some((existing_id, existing_version)) = upgrade_existing {
            match store::transactions::upgrade_failed_to_completed(
                &mut tx,
                existing_id,
                existing_version,
            )
            .await
            {
                Ok(row) => row,
                Err(sqlx::Error::RowNotFound) => {
                    return Err(ProcessorError::Transient(
                        "optimistic version mismatch upgrading failed row, retrying".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let inserted = store::transactions::insert_completed(
                &mut tx,
                req.transaction_id,
                &req.idempotency_key,
                req.from_account_id,
                req.to_account_id,
                req.amount,
                &req.currency,
                req.transaction_type,
            )
            .await;
            match inserted {
                Ok(row) => row,
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await.ok();
                    return self.resolve_conflicting_insert(req).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Outbox payload follows spec §6's public TransactionResponse shape;
        // the idempotency snapshot stores the full row so `resolve_cached`
        // can deserialize it without a second read against `transactions`.
        let response = TransactionResponse::from(row.clone());
        let event_payload = serde_json::to_value(&response)
            .map_err(|e| ProcessorError::App(AppError::InvalidRequest(e.to_string())))?;
        let snapshot_payload = serde_json::to_value(&row)
            .map_err(|e| ProcessorError::App(AppError::InvalidRequest(e.to_string())))?;

        store::outbox::insert_pending(
            &mut tx,
            TRANSACTION_COMPLETED,
            &row.id.to_string(),
            event_payload,
        )
        .await?;
        idempotency_service::bind(
            &mut tx,
            &req.idempotency_key,
            row.id,
            snapshot_payload,
            &request_fingerprint(req),
            self.idempotency_window_hours,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            transaction_id = %row.id,
            from_account_id = %row.from_account_id,
            to_account_id = %row.to_account_id,
            "transaction committed"
        );
        Ok(row)
    }

    /// A unique-constraint violation fired on insert: either a racing
    /// concurrent admission of the same key won first, or this request's
    /// `transactionId` collides with an unrelated prior request.
    async fn resolve_conflicting_insert(
        &self,
        req: &TransferRequest,
    ) -> Result<Transaction, ProcessorError> {
        if let Some(existing_by_id) =
            store::transactions::find_by_id(&self.pool, req.transaction_id).await?
        {
            if existing_by_id.idempotency_key != req.idempotency_key {
                return Err(ProcessorError::App(AppError::TransactionIdConflict(
                    req.transaction_id,
                )));
            }
        }

        match store::transactions::find_by_idempotency_key(&self.pool, &req.idempotency_key)
            .await?
        {
            Some(row) if row.status == TransactionStatus::Completed => Ok(row),
            Some(row) if row.status == TransactionStatus::Failed => {
                self.retry_failed_row(req, row.id, row.version).await
            }
            Some(_) | None => Err(ProcessorError::Transient(
                "idempotency key admitted concurrently, retrying".to_string(),
            )),
        }
    }
}

/// Structural validation that happens before any Transaction row can exist
/// (spec §7 "Malformed input"): non-positive amount, amount scale over 4
/// fractional digits, or a currency tag that isn't a 3-letter uppercase code.
fn validate_shape(req: &TransferRequest) -> Result<(), AppError> {
    if req.amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "amount must be strictly positive".to_string(),
        ));
    }
    if req.amount.scale() > 4 {
        return Err(AppError::InvalidRequest(
            "amount must have a scale of at most 4 fractional digits".to_string(),
        ));
    }
    if !is_valid_currency_tag(&req.currency) {
        return Err(AppError::InvalidRequest(
            "currency must be a 3-letter uppercase tag".to_string(),
        ));
    }
    Ok(())
}

fn is_valid_currency_tag(tag: &str) -> bool {
    tag.len() == 3 && tag.bytes().all(|b| b.is_ascii_uppercase())
}

/// Digest of the fields that define a transfer's business meaning, used to
/// detect an idempotency key reused with a different request body (spec
/// §4.5). `eventId` and `timestamp` are deliberately excluded - they vary
/// across retries of what the caller considers the same request.
fn request_fingerprint(req: &TransferRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.transaction_id.as_bytes());
    hasher.update(req.from_account_id.as_bytes());
    hasher.update(req.to_account_id.as_bytes());
    hasher.update(req.amount.to_string().as_bytes());
    hasher.update(req.currency.as_bytes());
    hasher.update(format!("{:?}", req.transaction_type).as_bytes());
    hex::encode(hasher.finalize())
}

/// Lock both account rows in ascending-id order (spec §4.1: "fixed global
/// order...breaks the deadlock cycle when two transfers go in opposite
/// directions"), then validate existence, status, currency and balance.
async fn validate_and_lock(
    tx: &mut SqlxTransaction<'_, Postgres>,
    req: &TransferRequest,
) -> Result<Result<LockedAccounts, ValidationFailure>, ProcessorError> {
    if req.amount.scale() > 4 {
        return Ok(Err(ValidationFailure::AmountScaleExceeded));
    }
    if req.from_account_id == req.to_account_id {
        return Ok(Err(ValidationFailure::SelfTransfer));
    }

    let (first_id, second_id) = if req.from_account_id < req.to_account_id {
        (req.from_account_id, req.to_account_id)
    } else {
        (req.to_account_id, req.from_account_id)
    };

    let first = store::accounts::lock_for_update(tx, first_id).await?;
    let second = store::accounts::lock_for_update(tx, second_id).await?;

    let from_account = if req.from_account_id == first_id {
        first.clone()
    } else {
        second.clone()
    };
    let to_account = if req.to_account_id == first_id {
        first.clone()
    } else {
        second.clone()
    };

    let Some(from_account) = from_account else {
        return Ok(Err(ValidationFailure::AccountNotFound(req.from_account_id)));
    };
    let Some(to_account) = to_account else {
        return Ok(Err(ValidationFailure::AccountNotFound(req.to_account_id)));
    };

    if !from_account.status.is_active() {
        return Ok(Err(ValidationFailure::AccountInactive(
            from_account.id,
            from_account.status,
        )));
    }
    if !to_account.status.is_active() {
        return Ok(Err(ValidationFailure::AccountInactive(
            to_account.id,
            to_account.status,
        )));
    }

    if from_account.currency != req.currency
        || to_account.currency != req.currency
        || from_account.currency != to_account.currency
    {
        return Ok(Err(ValidationFailure::CurrencyMismatch));
    }

    if from_account.balance < req.amount {
        return Ok(Err(ValidationFailure::InsufficientBalance));
    }

    Ok(Ok(LockedAccounts {
        from: from_account,
        to: to_account,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn req(amount: Decimal, currency: &str, from: Uuid, to: Uuid) -> TransferRequest {
        TransferRequest {
            event_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            from_account_id: from,
            to_account_id: to,
            amount,
            currency: currency.to_string(),
            transaction_type: crate::models::transaction::TransactionType::Transfer,
            timestamp: Utc::now(),
            idempotency_key: "k1".to_string(),
        }
    }

    #[test]
    fn rejects_non_positive_amount() {
        let r = req(Decimal::ZERO, "USD", Uuid::new_v4(), Uuid::new_v4());
        assert!(validate_shape(&r).is_err());
    }

    #[test]
    fn rejects_excess_scale() {
        let r = req(
            "10.00001".parse().unwrap(),
            "USD",
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        assert!(validate_shape(&r).is_err());
    }

    #[test]
    fn accepts_scale_exactly_four() {
        let r = req(
            "10.0001".parse().unwrap(),
            "USD",
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        assert!(validate_shape(&r).is_ok());
    }

    #[test]
    fn rejects_lowercase_currency() {
        let r = req(Decimal::ONE, "usd", Uuid::new_v4(), Uuid::new_v4());
        assert!(validate_shape(&r).is_err());
    }

    #[test]
    fn insufficient_balance_reason_contains_insufficient() {
        let failure = ValidationFailure::InsufficientBalance;
        assert!(failure.reason().contains("insufficient"));
    }
}
