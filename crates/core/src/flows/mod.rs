pub mod engine;
pub mod intake;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, PhaseRouterFlow};
pub use intake::{merge_intake, IntakeField, IntakeInput, IntakeOutcome, IntakeState};
pub use states::{FlowAction, FlowContext, FlowEvent, RouterSignals, TransitionOutcome};
