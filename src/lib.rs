//! Library surface for the transaction engine binary and its integration
//! tests. `main.rs` wires these modules into an axum server; `tests/`
//! exercises `services` and `store` directly against a disposable database.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
