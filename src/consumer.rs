//! Bus consumer ingress adapter (spec §4.5).
//!
//! The spec treats the message bus itself as an external collaborator and
//! only specifies the contract a consumer must honor: deserialize a record
//! into a `TransferRequest`, invoke the Processor, and acknowledge the
//! ingress offset only once the Processor has returned a durable outcome.
//! Poison records go to a Dead-Letter queue and are acknowledged immediately
//! so they don't block the stream.
//!
//! `IngressSource` is the seam onto whatever broker client a deployment
//! wires in (Kafka, SQS, ...); `ChannelIngressSource` is a `tokio::mpsc`
//! reference implementation used by tests and by deployments that feed the
//! engine from an in-process producer rather than an external broker.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::transaction::TransferRequest;
use crate::services::processor::TransactionProcessor;

/// One record read off the ingress topic, not yet deserialized.
pub struct IngressRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// What the consumer loop does with a record after the Processor has run.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processor returned a durable outcome (success, cached duplicate, or a
    /// committed `FAILED` row). Ack the offset.
    Acknowledged,
    /// Record could not be deserialized, or was rejected with a terminal
    /// classification. Routed to the DLQ and then acked.
    DeadLettered,
    /// Transient failure (store unreachable, retries exhausted). Offset is
    /// left uncommitted so the broker redelivers the record.
    Redelivered,
}

/// Sink a dead-lettered record is routed to.
#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, record: IngressRecord, reason: &str);
}

/// Logs and drops. Sufficient for a deployment with no operator tooling
/// watching a real DLQ topic; a broker-backed deployment swaps in one that
/// republishes to `dlq_topic_name`.
pub struct LoggingDeadLetterSink;

#[async_trait::async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn send(&self, record: IngressRecord, reason: &str) {
        tracing::error!(offset = record.offset, reason, "record routed to dead-letter sink");
    }
}

/// Drains an `IngressRecord` stream, feeding each into the Processor and
/// classifying the outcome per spec §4.5's error taxonomy.
pub struct BusConsumer {
    processor: Arc<TransactionProcessor>,
    dlq: Arc<dyn DeadLetterSink>,
}

impl BusConsumer {
    pub fn new(processor: Arc<TransactionProcessor>, dlq: Arc<dyn DeadLetterSink>) -> Self {
        Self { processor, dlq }
    }

    /// Runs until the source is closed (the channel's sender is dropped).
    pub async fn run(self, mut source: mpsc::Receiver<IngressRecord>) {
        while let Some(record) = source.recv().await {
            let offset = record.offset;
            let disposition = self.handle_one(record).await;
            tracing::debug!(offset, ?disposition, "ingress record processed");
        }
    }

    /// Processes exactly one record and returns the disposition the caller's
    /// broker client should act on (commit offset, redeliver, or DLQ).
    /// Exposed separately from `run` so tests can assert on a single record.
    pub async fn handle_one(&self, record: IngressRecord) -> Disposition {
        let request: TransferRequest = match serde_json::from_slice(&record.payload) {
            Ok(req) => req,
            Err(e) => {
                self.dlq.send(record, &format!("malformed record: {e}")).await;
                return Disposition::DeadLettered;
            }
        };

        match self.processor.process(request).await {
            Ok(_) => Disposition::Acknowledged,
            Err(AppError::Unavailable(_) | AppError::Database(_)) => Disposition::Redelivered,
            Err(e) => {
                let reason = e.to_string();
                self.dlq
                    .send(IngressRecord { offset: record.offset, payload: Vec::new() }, &reason)
                    .await;
                Disposition::DeadLettered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_variants_are_distinct() {
        assert_ne!(Disposition::Acknowledged, Disposition::DeadLettered);
        assert_ne!(Disposition::DeadLettered, Disposition::Redelivered);
    }
}
