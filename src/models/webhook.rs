//! Webhook models for endpoint registration and delivery tracking.
//!
//! Webhooks are one concrete implementation of the downstream bus the Outbox
//! Relay drains into (see `crate::bus`): a registered endpoint is a ledger
//! event subscriber, reached over HTTP with an HMAC-signed body so the
//! receiver can verify authenticity.
//!
//! # Security
//!
//! - Secrets are only shown once during registration
//! - Payloads are signed using HMAC-SHA256
//! - HTTPS is required for production endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::transaction::TransactionResponse;

/// Webhook endpoint registered against an API key.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to register a new webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookEndpointRequest {
    pub url: String,
}

/// Response when registering or retrieving a webhook endpoint.
///
/// The `secret` field is ONLY included when creating a new endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            secret: None,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
        }
    }
}

impl WebhookEndpointResponse {
    /// Create response with secret included (only for registration).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Webhook delivery attempt record, as persisted.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub transaction_id: Uuid,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

/// A delivery attempt about to be recorded - constructed by the sender right
/// before the insert, `sent_at` stamped at construction time.
pub struct NewWebhookEvent {
    pub id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub transaction_id: Uuid,
    pub payload: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

impl NewWebhookEvent {
    pub fn new(
        id: Uuid,
        webhook_endpoint_id: Uuid,
        transaction_id: Uuid,
        payload: serde_json::Value,
        response_status: Option<i32>,
        response_body: Option<String>,
    ) -> Self {
        Self {
            id,
            webhook_endpoint_id,
            transaction_id,
            payload,
            response_status,
            response_body,
        }
    }
}

/// Webhook payload sent to a registered endpoint.
///
/// This is the same JSON shape as the ledger event published to every other
/// downstream bus implementation (spec §6): event type `TRANSACTION_COMPLETED`,
/// keyed by the transaction id.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: WebhookData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookData {
    pub transaction: TransactionResponse,
}

impl WebhookPayload {
    pub fn new(event_id: Uuid, created_at: DateTime<Utc>, transaction: TransactionResponse) -> Self {
        Self {
            event_type: crate::models::outbox::TRANSACTION_COMPLETED.to_string(),
            event_id,
            created_at,
            data: WebhookData { transaction },
        }
    }
}
