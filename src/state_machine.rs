//! Flow state machine engine
//!
//! Flows are step machines over typed slots. A turn runs steps in an explicit
//! loop until one of them asks the user something or the flow finishes.

mod action;
pub mod extract;
pub mod state;
mod transition;
mod turn;

#[cfg(test)]
mod proptests;

pub use action::{Action, FlowReply};
pub use state::{FlowState, Progress};
pub use transition::{FlowError, FlowHandler, FlowOutcome, StepMachine, StepName, Transition};
pub use turn::{ChatContext, Turn};
