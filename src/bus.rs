//! The downstream bus the Outbox Relay publishes into (spec §4.3, §4.4).
//!
//! `LedgerPublisher` is the seam between the engine and "whatever system of
//! record or notification sits downstream" - the spec deliberately leaves
//! that external system unspecified. Two implementations ship here: webhook
//! fan-out (the concrete transport this deployment uses) and a logging
//! publisher used in tests and as a safe default when no endpoints exist.

use async_trait::async_trait;
use std::fmt;

use crate::models::outbox::OutboxEvent;

/// Error returned by a failed publish attempt. Carries only a display
/// message - the Relay records it verbatim on the outbox row's
/// `error_message` column (spec §4.3) and never inspects its internals.
#[derive(Debug)]
pub struct PublishError(String);

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PublishError {}

/// A downstream sink the Outbox Relay drains published events into.
///
/// Implementations must not panic on a down or slow endpoint - a single
/// unreachable subscriber must never stall the relay's poll loop (spec
/// §4.3 "one event's delivery failure never blocks another").
#[async_trait]
pub trait LedgerPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError>;
}

/// Publishes every drained event to all registered, active webhook
/// endpoints, HMAC-signing each delivery (spec §9 webhook fan-out).
///
/// A publish attempt only fails the outbox row (and so triggers a retry) if
/// *every* endpoint's delivery failed; a partial fan-out failure - some
/// endpoints reachable, others not - is recorded per-endpoint in
/// `webhook_events` but does not hold up the event as a whole, since a
/// webhook subscriber going down is the subscriber's problem, not the
/// relay's backlog.
pub struct WebhookLedgerPublisher {
    pool: crate::db::DbPool,
}

impl WebhookLedgerPublisher {
    pub fn new(pool: crate::db::DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerPublisher for WebhookLedgerPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        crate::services::webhook_service::deliver_event(&self.pool, event)
            .await
            .map_err(|e| PublishError::new(e.to_string()))
    }
}

/// Publishes by emitting a structured log line. Used by tests and as the
/// default publisher in environments with no webhook endpoints configured -
/// the Relay still runs and the outbox still drains, just with no network
/// side effect.
pub struct LoggingLedgerPublisher;

#[async_trait]
impl LedgerPublisher for LoggingLedgerPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "publishing ledger event"
        );
        Ok(())
    }
}
