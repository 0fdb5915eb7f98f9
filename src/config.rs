//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `LISTEN_PORT` (optional): HTTP server port, defaults to 8081
/// - `IDEMPOTENCY_WINDOW_HOURS` (optional): idempotency record validity window, defaults to 24
/// - `OUTBOX_POLLING_INTERVAL_MS` (optional): Relay poll cadence, defaults to 100
/// - `OUTBOX_BATCH_SIZE` (optional): rows drained per Relay poll, defaults to 10
/// - `OUTBOX_MAX_RETRIES` (optional): publish attempts before an event is marked FAILED, defaults to 5
/// - `PROCESSOR_RETRY_ATTEMPTS` (optional): transient-conflict retry cap, defaults to 3
/// - `PROCESSOR_BACKOFF_INITIAL_MS` (optional): first retry backoff, defaults to 100
/// - `PROCESSOR_BACKOFF_MAX_MS` (optional): backoff ceiling, defaults to 2000
/// - `DLQ_TOPIC_NAME` (optional): dead-letter sink name, defaults to "transfers.dlq"
/// - `INGRESS_TOPIC_NAME` (optional): bus-consumer source topic, defaults to "transfers.ingress"
/// - `LEDGER_TOPIC_NAME` (optional): Relay's downstream publication topic, defaults to "ledger.events"
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_idempotency_window_hours")]
    pub idempotency_window_hours: i64,

    #[serde(default = "default_outbox_polling_interval_ms")]
    pub outbox_polling_interval_ms: u64,

    #[serde(default = "default_outbox_batch_size")]
    pub outbox_batch_size: i64,

    #[serde(default = "default_outbox_max_retries")]
    pub outbox_max_retries: i32,

    #[serde(default = "default_processor_retry_attempts")]
    pub processor_retry_attempts: u32,

    #[serde(default = "default_processor_backoff_initial_ms")]
    pub processor_backoff_initial_ms: u64,

    #[serde(default = "default_processor_backoff_max_ms")]
    pub processor_backoff_max_ms: u64,

    #[serde(default = "default_dlq_topic_name")]
    pub dlq_topic_name: String,

    #[serde(default = "default_ingress_topic_name")]
    pub ingress_topic_name: String,

    #[serde(default = "default_ledger_topic_name")]
    pub ledger_topic_name: String,
}

fn default_listen_port() -> u16 {
    8081
}

fn default_idempotency_window_hours() -> i64 {
    24
}

fn default_outbox_polling_interval_ms() -> u64 {
    100
}

fn default_outbox_batch_size() -> i64 {
    10
}

fn default_outbox_max_retries() -> i32 {
    5
}

fn default_processor_retry_attempts() -> u32 {
    3
}

fn default_processor_backoff_initial_ms() -> u64 {
    100
}

fn default_processor_backoff_max_ms() -> u64 {
    2000
}

fn default_dlq_topic_name() -> String {
    "transfers.dlq".to_string()
}

fn default_ingress_topic_name() -> String {
    "transfers.ingress".to_string()
}

fn default_ledger_topic_name() -> String {
    "ledger.events".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Backoff schedule derived from the configured initial delay, multiplier 5, capped at the
    /// configured max, matching the processor retry policy.
    pub fn processor_backoff(&self) -> crate::services::backoff::Backoff {
        crate::services::backoff::Backoff::new(
            self.processor_backoff_initial_ms,
            self.processor_backoff_max_ms,
            self.processor_retry_attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(default_listen_port(), 8081);
        assert_eq!(default_idempotency_window_hours(), 24);
        assert_eq!(default_outbox_polling_interval_ms(), 100);
        assert_eq!(default_outbox_batch_size(), 10);
        assert_eq!(default_processor_retry_attempts(), 3);
        assert_eq!(default_processor_backoff_initial_ms(), 100);
        assert_eq!(default_processor_backoff_max_ms(), 2000);
    }
}
