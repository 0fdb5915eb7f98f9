//! Shared axum application state.
//!
//! Handlers extract only the piece they need (`State<DbPool>` or
//! `State<Arc<TransactionProcessor>>`) via `FromRef`, so a handler that only
//! touches the pool doesn't have to know the processor exists.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::db::DbPool;
use crate::services::processor::TransactionProcessor;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub processor: Arc<TransactionProcessor>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<TransactionProcessor> {
    fn from_ref(state: &AppState) -> Self {
        state.processor.clone()
    }
}
