//! Store adapter (spec §4.4).
//!
//! Typed read/write operations on the four tables plus the transactional
//! scope primitives the Transaction Processor composes: row-level write
//! lock on an account by id, unique-constraint-aware inserts, and a batched
//! FIFO read of the oldest `PENDING` outbox rows. Everything here operates
//! either on a borrowed `&DbPool` (for standalone reads) or on a live
//! `&mut sqlx::Transaction<'_, Postgres>` (for anything inside the
//! Processor's critical section) - callers choose atomicity by choosing
//! which one they pass in, the adapter itself never opens or commits a
//! transaction on their behalf.

pub mod accounts;
pub mod idempotency;
pub mod outbox;
pub mod transactions;
