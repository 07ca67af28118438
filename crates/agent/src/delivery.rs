use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use innkeep_core::config::DeliveryConfig;
use innkeep_core::domain::message::OutboundMessage;
use innkeep_db::repositories::{DeliveryLogRepository, DeliveryRecord};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("permanent transport failure: {0}")]
    Permanent(String),
}

/// Hands a message to whatever chat surface reaches the recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_backoff: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2x base, 4x base, ...
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let mut delay = self.base_backoff;
        for _ in 1..attempt {
            delay = delay.saturating_mul(2);
        }
        delay.min(MAX_BACKOFF)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    AlreadyDelivered,
    Failed { attempts: u32, error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::AlreadyDelivered)
    }
}

/// Sends outbound messages at most once per dedupe key, retrying transient failures with
/// exponential backoff.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    transport: Arc<dyn Transport>,
    log: Arc<dyn DeliveryLogRepository>,
    policy: RetryPolicy,
}

impl DeliveryDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        log: Arc<dyn DeliveryLogRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Self { transport, log, policy }
    }

    pub async fn deliver_all(&self, messages: &[OutboundMessage]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.deliver(message).await);
        }
        outcomes
    }

    pub async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        match self.log.find(&message.dedupe_key).await {
            Ok(Some(_)) => {
                tracing::debug!(
                    event_name = "delivery.skipped.duplicate",
                    dedupe_key = %message.dedupe_key,
                    "message already delivered"
                );
                return DeliveryOutcome::AlreadyDelivered;
            }
            Ok(None) => {}
            Err(error) => {
                // Without the log we cannot tell whether this was sent already.
                tracing::warn!(
                    event_name = "delivery.log.unavailable",
                    dedupe_key = %message.dedupe_key,
                    error = %error,
                    "delivery log unavailable; message held back"
                );
                return DeliveryOutcome::Failed { attempts: 0, error: error.to_string() };
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(message).await {
                Ok(()) => {
                    self.record(message, attempt).await;
                    tracing::info!(
                        event_name = "delivery.sent",
                        dedupe_key = %message.dedupe_key,
                        recipient_id = %message.recipient_id,
                        attempts = attempt,
                        "message delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(TransportError::Transient(error)) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        event_name = "delivery.attempt.failed",
                        dedupe_key = %message.dedupe_key,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "delivery attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "delivery.failed",
                        dedupe_key = %message.dedupe_key,
                        recipient_id = %message.recipient_id,
                        attempts = attempt,
                        error = %error,
                        "message could not be delivered"
                    );
                    return DeliveryOutcome::Failed { attempts: attempt, error: error.to_string() };
                }
            }
        }
    }

    async fn record(&self, message: &OutboundMessage, attempts: u32) {
        let record = DeliveryRecord {
            dedupe_key: message.dedupe_key.clone(),
            recipient_id: message.recipient_id.clone(),
            attempts,
            delivered_at: Utc::now(),
        };
        if let Err(error) = self.log.record_delivered(record).await {
            tracing::warn!(
                event_name = "delivery.log.write_failed",
                dedupe_key = %message.dedupe_key,
                error = %error,
                "delivered message could not be recorded"
            );
        }
    }
}

/// Keeps every sent message in memory. Used by the simulator and tests; can be told to fail
/// the first few sends to exercise retries.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failures_left: Arc<Mutex<u32>>,
}

impl RecordingTransport {
    pub fn failing_first(failures: u32) -> Self {
        Self { sent: Arc::default(), failures_left: Arc::new(Mutex::new(failures)) }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, recipient_id: &str) -> Vec<OutboundMessage> {
        self.sent().into_iter().filter(|message| message.recipient_id == recipient_id).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        {
            let mut failures_left = match self.failures_left.lock() {
                Ok(failures_left) => failures_left,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(TransportError::Transient("simulated outage".to_string()));
            }
        }

        match self.sent.lock() {
            Ok(mut sent) => sent.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use innkeep_core::domain::message::OutboundMessage;
    use innkeep_db::repositories::{DeliveryLogRepository, InMemoryDeliveryLogRepository};

    use super::{DeliveryDispatcher, DeliveryOutcome, RecordingTransport, RetryPolicy};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_backoff: Duration::from_millis(1) }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy { max_attempts: 4, base_backoff: Duration::from_millis(250) };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(1000));
        assert_eq!(policy.backoff_after(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn same_dedupe_key_is_sent_once() {
        let transport = RecordingTransport::default();
        let log = Arc::new(InMemoryDeliveryLogRepository::default());
        let dispatcher =
            DeliveryDispatcher::new(Arc::new(transport.clone()), log.clone(), fast_policy(3));
        let message = OutboundMessage::new("guest-1", "hello", "m-1:0");

        assert_eq!(dispatcher.deliver(&message).await, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(dispatcher.deliver(&message).await, DeliveryOutcome::AlreadyDelivered);
        assert_eq!(transport.sent().len(), 1);
        assert!(log.find("m-1:0").await.expect("log lookup").is_some());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let transport = RecordingTransport::failing_first(2);
        let dispatcher = DeliveryDispatcher::new(
            Arc::new(transport.clone()),
            Arc::new(InMemoryDeliveryLogRepository::default()),
            fast_policy(3),
        );

        let outcome = dispatcher.deliver(&OutboundMessage::new("guest-1", "hi", "m-2:0")).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_without_recording() {
        let transport = RecordingTransport::failing_first(5);
        let log = Arc::new(InMemoryDeliveryLogRepository::default());
        let dispatcher =
            DeliveryDispatcher::new(Arc::new(transport.clone()), log.clone(), fast_policy(2));

        let outcome = dispatcher.deliver(&OutboundMessage::new("guest-1", "hi", "m-3:0")).await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 2, .. }));
        assert!(transport.sent().is_empty());
        assert!(log.find("m-3:0").await.expect("log lookup").is_none());
    }
}
