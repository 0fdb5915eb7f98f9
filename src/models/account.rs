//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: database entity the Transaction Processor locks and mutates
//! - `AccountStatus`: the three-state lifecycle a request is validated against
//! - `CreateAccountRequest` / `AccountResponse`: provisioning API shapes
//!
//! Account provisioning and administration are out of scope for the core engine
//! (spec §1) - accounts are created out-of-band. This module's create/list/get
//! handlers exist only as an operator convenience for standing up test and demo
//! accounts; the Transaction Processor never creates or closes an account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an account.
///
/// Only `Active` accounts may participate in a transfer; `Suspended` and
/// `Closed` accounts both fail Processor validation (spec §4.1 step 3), the
/// distinction being administrative (suspension is expected to be lifted;
/// closure is permanent, but the engine never destroys the row - §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn is_active(self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// Represents an account record from the database.
///
/// # Database Table
///
/// Maps to the `accounts` table.
///
/// # Balance Storage
///
/// Balances are `NUMERIC(20,4)` in Postgres, surfaced here as
/// `rust_decimal::Decimal` - fixed-point with scale 4, never floating-point
/// (spec §3). The balance invariant `balance >= 0` is additionally enforced
/// by a database CHECK constraint as a last line of defense behind the
/// Processor's own validation.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Request body for creating a new account.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub initial_balance: Decimal,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Response body for account endpoints.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            balance: account.balance,
            currency: account.currency,
            status: account.status,
            created_at: account.created_at,
            updated_at: account.updated_at,
            version: account.version,
        }
    }
}
