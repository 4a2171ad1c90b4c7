//! Step transitions and the cascade loop
//!
//! A flow implements [`StepMachine`]: given its current step, its slots and
//! the turn, a step either advances, waits for the user, or finishes. The
//! blanket [`FlowHandler`] impl drives those steps in a bounded loop.

use super::{FlowReply, FlowState, Turn};
use crate::intent::Intent;
use crate::studio::CollaboratorError;
use std::fmt;
use thiserror::Error;

/// Steps one turn may run through before the turn is abandoned
pub const MAX_CASCADE: usize = 16;

pub trait StepName: Copy + PartialEq + fmt::Debug + Send + Sync {
    /// snake_case name stored in the session's `step` column
    fn name(self) -> &'static str;
}

/// Outcome of running one step
#[derive(Debug)]
pub enum Transition<S> {
    /// Run `S` next, against whatever input is left in the turn
    Advance(S),
    /// Stop at `S` and show the reply
    Await(S, FlowReply),
    /// Terminal success; the session forgets the flow
    Finish(FlowReply),
}

/// Errors that can occur while running a flow
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Invalid flow state: {0}")]
    InvalidState(String),
    #[error("Step cascade exceeded {limit} steps (last step: {step})")]
    CascadeLimit { limit: usize, step: &'static str },
}

pub trait StepMachine: Send + Sync {
    type Step: StepName;
    type Data: Default;

    const INTENT: Intent;

    fn initial_step(&self) -> Self::Step;

    fn step(
        &self,
        step: Self::Step,
        data: &mut Self::Data,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<Self::Step>, FlowError>;

    fn pack(step: Self::Step, data: Self::Data) -> FlowState;

    /// `None` when the state belongs to another flow
    fn unpack(state: FlowState) -> Option<(Self::Step, Self::Data)>;
}

/// Result of handling one message
#[derive(Debug)]
pub struct FlowOutcome {
    /// `None` after a terminal step
    pub state: Option<FlowState>,
    pub reply: FlowReply,
}

/// Object-safe face of a flow, as stored in the registry
pub trait FlowHandler: Send + Sync {
    fn intent(&self) -> Intent;

    fn handle(&self, state: Option<FlowState>, turn: &mut Turn<'_>) -> Result<FlowOutcome, FlowError>;
}

impl<M: StepMachine> FlowHandler for M {
    fn intent(&self) -> Intent {
        M::INTENT
    }

    fn handle(&self, state: Option<FlowState>, turn: &mut Turn<'_>) -> Result<FlowOutcome, FlowError> {
        let resumed = state.and_then(M::unpack);
        turn.answering = resumed.is_some();
        let (mut step, mut data) = resumed.unwrap_or_else(|| (self.initial_step(), M::Data::default()));

        for _ in 0..MAX_CASCADE {
            match self.step(step, &mut data, turn)? {
                Transition::Advance(next) => {
                    tracing::debug!(from = step.name(), to = next.name(), "Flow advanced");
                    step = next;
                    turn.answering = false;
                }
                Transition::Await(next, reply) => {
                    return Ok(FlowOutcome {
                        state: Some(M::pack(next, data)),
                        reply,
                    });
                }
                Transition::Finish(reply) => {
                    return Ok(FlowOutcome { state: None, reply });
                }
            }
        }

        Err(FlowError::CascadeLimit {
            limit: MAX_CASCADE,
            step: step.name(),
        })
    }
}
