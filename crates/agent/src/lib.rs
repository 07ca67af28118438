//! Guest conversation runtime for innkeep.
//!
//! Each inbound message is turned into structured signals, routed between the Inquiry and
//! Booking phases, answered from property facts and derived prices, and recorded as events
//! before anything is sent. Approver replies settle bookings through the reconciler.
//!
//! Generated text is only ever used to answer free-form property questions. Prices, dates
//! and booking state are decided by the deterministic core.

pub mod attachments;
pub mod booking;
pub mod conversation;
pub mod delivery;
pub mod guardrails;
pub mod inquiry;
pub mod llm;
pub mod locks;
pub mod reconciler;
pub mod runtime;
pub mod templates;
pub mod turn;

pub use delivery::{DeliveryDispatcher, RecordingTransport, RetryPolicy, Transport, TransportError};
pub use reconciler::{
    ApprovalReconciler, ApprovalReport, ApprovalStatus, BookingEventSink, BookingLifecycleEvent,
    RecordingBookingEventSink, TracingBookingEventSink,
};
pub use runtime::{AgentRuntime, AgentServices, TurnReport};
pub use turn::{Clock, FixedClock, SystemClock};
