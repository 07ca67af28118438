use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationKey;

/// Inbound payload shapes. Every transport adapter must map into one of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Attachment { reference: String, caption: Option<String> },
    Command { name: String, argument: Option<String> },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Attachment { .. } => "attachment",
            Self::Command { .. } => "command",
        }
    }

    /// Free text carried by the body, including attachment captions.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text.as_str()),
            Self::Attachment { caption, .. } => caption.as_deref(),
            Self::Command { .. } => None,
        }
    }

    pub fn attachment_ref(&self) -> Option<&str> {
        match self {
            Self::Attachment { reference, .. } => Some(reference.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: ConversationKey,
    pub message_id: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn text(
        key: ConversationKey,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            key,
            message_id: message_id.into(),
            body: MessageBody::Text { text: text.into() },
            received_at: Utc::now(),
        }
    }

    pub fn attachment(
        key: ConversationKey,
        message_id: impl Into<String>,
        reference: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            key,
            message_id: message_id.into(),
            body: MessageBody::Attachment { reference: reference.into(), caption },
            received_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub text: String,
    pub attachment_ref: Option<String>,
    /// Stable identity of this send. A key that was delivered once is never delivered again.
    pub dedupe_key: String,
}

impl OutboundMessage {
    pub fn new(
        recipient_id: impl Into<String>,
        text: impl Into<String>,
        dedupe_key: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            text: text.into(),
            attachment_ref: None,
            dedupe_key: dedupe_key.into(),
        }
    }

    pub fn with_attachment(mut self, attachment_ref: Option<String>) -> Self {
        self.attachment_ref = attachment_ref;
        self
    }
}
