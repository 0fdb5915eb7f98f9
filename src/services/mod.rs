//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

/// Exponential backoff with jitter, shared by the Processor's retry loop.
pub mod backoff;

/// Idempotency Layer: deduplication lookups and binds.
pub mod idempotency_service;

/// Outbox Relay: background worker draining pending events to the bus.
pub mod outbox_relay;

/// Transaction Processor: validates, locks, and atomically commits transfers.
pub mod processor;

/// Webhook service for endpoint registration and event delivery.
pub mod webhook_service;
