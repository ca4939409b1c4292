//! Visited-state trace for one batch.

use ordergate_core::PipelineState;
use tracing::error;

/// Ordered record of the states a batch passed through.
///
/// Starts at `Received`; `advance` refuses transitions the state machine
/// does not allow, so a finished trace is always a legal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }

    #[must_use]
    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    /// Move to `next`; returns false and leaves the trace unchanged when
    /// the transition is illegal.
    pub fn advance(&mut self, next: PipelineState) -> bool {
        let current = self.current();
        if current.can_transition_to(next) {
            self.states.push(next);
            true
        } else {
            error!(from = %current, to = %next, "Illegal pipeline transition rejected");
            false
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.current() == PipelineState::Done
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<PipelineState> {
        self.states
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_safety_denial_path() {
        let mut trace = StateTrace::new();
        for state in [EnvironmentChecked, SafetyEvaluated, DeniedSafety, Audited, Done] {
            assert!(trace.advance(state), "{state}");
        }
        assert!(trace.is_done());
        assert_eq!(trace.states().len(), 6);
    }

    #[test]
    fn test_illegal_transition_refused() {
        let mut trace = StateTrace::new();
        trace.advance(EnvironmentChecked);
        trace.advance(SafetyEvaluated);

        assert!(!trace.advance(Executing));
        assert_eq!(trace.current(), SafetyEvaluated);

        trace.advance(DeniedSafety);
        assert!(!trace.advance(Executing));
        assert_eq!(trace.into_states().last(), Some(&DeniedSafety));
    }
}
