//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// API key authentication model
pub mod api_key;
/// Business account model
pub mod account;
/// Transaction (transfer) model and ingress/egress request and response shapes
pub mod transaction;
/// Idempotency record model
pub mod idempotency;
/// Outbox event model
pub mod outbox;
/// Webhook endpoint and delivery models
pub mod webhook;
