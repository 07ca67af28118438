use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("attachment `{reference}` could not be stored: {reason}")]
pub struct AttachmentError {
    pub reference: String,
    pub reason: String,
}

/// Keeps payment screenshots somewhere the approver can open them. Returns the reference the
/// approval request should carry.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn persist(&self, reference: &str) -> Result<String, AttachmentError>;
}

/// The chat transport already hosts the file; its reference is kept as is.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportHostedAttachments;

#[async_trait]
impl AttachmentStore for TransportHostedAttachments {
    async fn persist(&self, reference: &str) -> Result<String, AttachmentError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AttachmentError {
                reference: reference.to_string(),
                reason: "empty attachment reference".to_string(),
            });
        }
        Ok(reference.to_string())
    }
}
