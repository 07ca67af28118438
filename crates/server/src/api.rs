use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use innkeep_agent::{AgentRuntime, ApprovalReport, TurnReport};
use innkeep_core::domain::booking::{BookingId, Decision};
use innkeep_core::domain::conversation::{ConversationContext, ConversationKey};
use innkeep_core::domain::message::{InboundMessage, MessageBody};
use innkeep_core::errors::{ApplicationError, InterfaceError};
use innkeep_core::signing::{verify_payload, SignatureCheck, SIGNATURE_HEADER, TIMESTAMP_HEADER};

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
    /// When set, booking decisions must carry a valid body signature.
    decision_secret: Option<SecretString>,
}

impl ApiState {
    pub fn new(runtime: Arc<AgentRuntime>, decision_secret: Option<SecretString>) -> Self {
        Self { runtime, decision_secret }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/messages", post(receive_message))
        .route("/v1/approvals/reply", post(receive_approver_reply))
        .route("/v1/bookings/{booking_id}/decision", post(receive_decision))
        .route("/v1/conversations/{guest_id}/{property_id}", get(conversation_snapshot))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub guest_id: String,
    pub property_id: String,
    pub message_id: String,
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
pub struct ApproverReplyRequest {
    pub approver_id: String,
    pub message_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approver_id: String,
    pub decision: Decision,
    pub reason: Option<String>,
    /// Identity of the delivery attempt; retries of one webhook reuse it.
    pub event_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// Interface failure rendered with its guest-safe message; the internal detail only reaches
/// the log.
pub struct ApiError(InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.into(),
        })
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn receive_message(
    State(state): State<ApiState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnReport>, ApiError> {
    let correlation_id = request.message_id.clone();
    if [&request.guest_id, &request.property_id, &request.message_id]
        .iter()
        .any(|value| value.trim().is_empty())
    {
        return Err(ApiError::bad_request(
            "guest_id, property_id and message_id are required",
            correlation_id,
        ));
    }

    let message = InboundMessage {
        key: ConversationKey::new(request.guest_id, request.property_id),
        message_id: request.message_id,
        body: request.body,
        received_at: chrono::Utc::now(),
    };
    let report = state
        .runtime
        .handle_message(message)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(report))
}

pub async fn receive_approver_reply(
    State(state): State<ApiState>,
    Json(request): Json<ApproverReplyRequest>,
) -> Result<Json<ApprovalReport>, ApiError> {
    if request.approver_id.trim().is_empty() || request.message_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            "approver_id and message_id are required",
            request.message_id,
        ));
    }

    let report = state
        .runtime
        .handle_approver_reply(&request.approver_id, &request.text, &request.message_id)
        .await
        .map_err(|error| ApiError::from_application(error, &request.message_id))?;
    Ok(Json(report))
}

pub async fn receive_decision(
    State(state): State<ApiState>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApprovalReport>, ApiError> {
    if let Some(secret) = &state.decision_secret {
        verify_signature(secret, &headers, &body, &booking_id)?;
    }

    let request: DecisionRequest = serde_json::from_slice(&body).map_err(|error| {
        ApiError::bad_request(format!("invalid decision body: {error}"), &booking_id)
    })?;
    let correlation_id = request.event_id.clone();

    let report = state
        .runtime
        .receive_decision(
            &BookingId(booking_id),
            request.decision,
            &request.approver_id,
            request.reason,
            &request.event_id,
        )
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(report))
}

pub async fn conversation_snapshot(
    State(state): State<ApiState>,
    Path((guest_id, property_id)): Path<(String, String)>,
) -> Result<Json<ConversationContext>, ApiError> {
    let key = ConversationKey::new(guest_id, property_id);
    let correlation_id = key.to_string();
    let context = state
        .runtime
        .snapshot(&key)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(context))
}

fn verify_signature(
    secret: &SecretString,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<(), ApiError> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let (Some(signature), Some(timestamp)) = (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER))
    else {
        return Err(ApiError::bad_request("missing decision signature headers", correlation_id));
    };
    let timestamp = timestamp
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("malformed signature timestamp", correlation_id))?;

    match verify_payload(secret.expose_secret().as_bytes(), timestamp, body, signature) {
        SignatureCheck::Valid => Ok(()),
        SignatureCheck::Malformed => {
            Err(ApiError::bad_request("malformed decision signature", correlation_id))
        }
        SignatureCheck::Mismatch => {
            Err(ApiError::bad_request("decision signature mismatch", correlation_id))
        }
    }
}
