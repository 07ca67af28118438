use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use innkeep_agent::{Transport, TransportError};
use innkeep_core::config::DeliveryConfig;
use innkeep_core::domain::message::OutboundMessage;
use innkeep_core::signing::{sign_payload, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Posts each outbound message as JSON to the chat gateway's webhook.
pub struct WebhookTransport {
    http: reqwest::Client,
    url: String,
    auth_token: Option<SecretString>,
    signing_secret: Option<SecretString>,
}

impl WebhookTransport {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<SecretString>,
        signing_secret: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into(), auth_token, signing_secret })
    }

    fn signature(&self, timestamp: i64, body: &[u8]) -> Option<String> {
        let secret = self.signing_secret.as_ref()?;
        sign_payload(secret.expose_secret().as_bytes(), timestamp, body)
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let body = serde_json::to_vec(message)
            .map_err(|error| TransportError::Permanent(format!("encode message: {error}")))?;
        let timestamp = Utc::now().timestamp();

        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("idempotency-key", &message.dedupe_key);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(signature) = self.signature(timestamp, &body) {
            request = request
                .header(SIGNATURE_HEADER, signature)
                .header(TIMESTAMP_HEADER, timestamp.to_string());
        }

        let response = request.body(body).send().await.map_err(|error| {
            if error.is_builder() {
                TransportError::Permanent(error.to_string())
            } else {
                TransportError::Transient(error.to_string())
            }
        })?;

        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!("webhook answered {status}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Err(TransportError::Transient(detail))
    } else {
        Err(TransportError::Permanent(detail))
    }
}

/// Used when no webhook is configured: messages are only written to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyTransport;

#[async_trait]
impl Transport for LogOnlyTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        info!(
            event_name = "delivery.log_only.sent",
            recipient_id = %message.recipient_id,
            dedupe_key = %message.dedupe_key,
            has_attachment = message.attachment_ref.is_some(),
            text = %message.text,
            "outbound message (no webhook configured)"
        );
        Ok(())
    }
}

pub fn transport_from_config(
    config: &DeliveryConfig,
) -> Result<Arc<dyn Transport>, reqwest::Error> {
    match config.webhook_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(WebhookTransport::new(
            url,
            config.auth_token.clone(),
            config.signing_secret.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )?)),
        None => Ok(Arc::new(LogOnlyTransport)),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use innkeep_agent::TransportError;
    use innkeep_core::signing::{verify_payload, SignatureCheck};
    use secrecy::SecretString;

    use super::{classify_status, WebhookTransport};

    #[test]
    fn throttling_and_server_errors_are_retried_but_rejections_are_not() {
        assert!(classify_status(StatusCode::NO_CONTENT).is_ok());
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(TransportError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(TransportError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            Err(TransportError::Permanent(_))
        ));
    }

    #[test]
    fn signature_verifies_against_the_shared_secret() {
        let transport = WebhookTransport::new(
            "http://127.0.0.1:9/hook",
            None,
            Some(SecretString::from("webhook-secret")),
            std::time::Duration::from_secs(1),
        )
        .expect("client builds");

        let body = br#"{"recipient_id":"guest-1"}"#;
        let signature = transport.signature(1_760_000_000, body).expect("signed");
        assert_eq!(
            verify_payload(b"webhook-secret", 1_760_000_000, body, &signature),
            SignatureCheck::Valid
        );
        assert_eq!(
            verify_payload(b"other-secret", 1_760_000_000, body, &signature),
            SignatureCheck::Mismatch
        );
    }

    #[test]
    fn unsigned_without_a_secret() {
        let transport = WebhookTransport::new(
            "http://127.0.0.1:9/hook",
            None,
            None,
            std::time::Duration::from_secs(1),
        )
        .expect("client builds");
        assert!(transport.signature(1, b"{}").is_none());
    }
}
