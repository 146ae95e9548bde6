//! Forward-only state machine of one planner run.

use thiserror::Error;
use toolplan_primitives::TaskId;
use tracing::debug;

/// States a planner run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    /// Waiting for the model's plan.
    Planning,
    /// Executing plan steps.
    Working,
    /// Waiting for the model's final answer.
    Solving,
    /// Answer produced.
    Finished,
    /// A phase failed; nothing else runs.
    Failed,
}

impl PlannerState {
    /// Returns `true` once the run can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Events that advance a planner run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerEvent {
    /// The plan parsed and passed validation.
    Planned,
    /// Every step succeeded.
    Worked,
    /// The answer was synthesized.
    Solved,
    /// The current phase failed.
    Fail,
}

/// Tracks the state of one planner run.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    task_id: TaskId,
    state: PlannerState,
}

impl Lifecycle {
    /// Starts a run in [`PlannerState::Planning`].
    #[must_use]
    pub const fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: PlannerState::Planning,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> PlannerState {
        self.state
    }

    /// Applies `event`, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] for any move that is not
    /// strictly forward, including re-entering a phase.
    pub fn transition(&mut self, event: PlannerEvent) -> LifecycleResult<PlannerState> {
        let next = match (self.state, event) {
            (PlannerState::Planning, PlannerEvent::Planned) => Some(PlannerState::Working),
            (PlannerState::Working, PlannerEvent::Worked) => Some(PlannerState::Solving),
            (PlannerState::Solving, PlannerEvent::Solved) => Some(PlannerState::Finished),
            (
                PlannerState::Planning | PlannerState::Working | PlannerState::Solving,
                PlannerEvent::Fail,
            ) => Some(PlannerState::Failed),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                task_id: self.task_id,
                from: self.state,
                event,
            });
        };

        debug!(
            task_id = %self.task_id,
            from = ?self.state,
            to = ?next_state,
            ?event,
            "planner transition"
        );
        self.state = next_state;
        Ok(next_state)
    }
}

/// Errors emitted by the lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid planner transition from {from:?} via {event:?} for task {task_id}")]
    InvalidTransition {
        /// Task whose transition failed.
        task_id: TaskId,
        /// State prior to the attempted transition.
        from: PlannerState,
        /// Event that triggered the failure.
        event: PlannerEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_moves_forward() {
        let mut lifecycle = Lifecycle::new(TaskId::random());
        assert_eq!(lifecycle.state(), PlannerState::Planning);
        lifecycle.transition(PlannerEvent::Planned).unwrap();
        lifecycle.transition(PlannerEvent::Worked).unwrap();
        lifecycle.transition(PlannerEvent::Solved).unwrap();
        assert_eq!(lifecycle.state(), PlannerState::Finished);
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn phases_cannot_be_reentered() {
        let mut lifecycle = Lifecycle::new(TaskId::random());
        lifecycle.transition(PlannerEvent::Planned).unwrap();
        let err = lifecycle
            .transition(PlannerEvent::Planned)
            .expect_err("planning twice");
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: PlannerState::Working,
                ..
            }
        ));
    }

    #[test]
    fn failure_is_terminal() {
        let mut lifecycle = Lifecycle::new(TaskId::random());
        lifecycle.transition(PlannerEvent::Planned).unwrap();
        lifecycle.transition(PlannerEvent::Fail).unwrap();
        assert_eq!(lifecycle.state(), PlannerState::Failed);
        assert!(lifecycle.transition(PlannerEvent::Fail).is_err());
        assert!(lifecycle.transition(PlannerEvent::Worked).is_err());
    }

    #[test]
    fn cannot_skip_work() {
        let mut lifecycle = Lifecycle::new(TaskId::random());
        assert!(lifecycle.transition(PlannerEvent::Solved).is_err());
        assert_eq!(lifecycle.state(), PlannerState::Planning);
    }
}
