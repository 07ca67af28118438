pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod pricing;
pub mod signing;

pub use approvals::{
    parse_approver_reply, reconcile, ApprovalValidationFailure, ApprovalValidationResult,
    ApprovalValidator, ApproverReply, ReconcileOutcome,
};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::booking::{BookingId, BookingRecord, BookingStatus, Decision, PaymentStatus};
pub use domain::conversation::{
    ConversationContext, ConversationKey, DateRange, DerivedPrice, GuestId, PaymentIntake, Phase,
};
pub use domain::event::{Actor, ConversationEvent, EventBatch, EventId, EventKind};
pub use domain::message::{InboundMessage, MessageBody, OutboundMessage};
pub use domain::property::{PaymentMethod, Property, PropertyId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, PhaseRouterFlow};
pub use pricing::{NightlyRatePricingEngine, PricingEngine};
