use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Running,
    Resolved,
    Rejected,
    TimedOut,
}

impl ProbeState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected | Self::TimedOut)
    }

    pub fn can_transition_to(&self, next: ProbeState) -> bool {
        use ProbeState::*;

        matches!(
            (self, next),
            (Idle, Running) | (Running, Resolved) | (Running, Rejected) | (Running, TimedOut)
        )
    }

    pub fn transition(&mut self, next: ProbeState) -> Result<(), IllegalTransition> {
        if !self.can_transition_to(next) {
            return Err(IllegalTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal probe transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
    pub from: ProbeState,
    pub to: ProbeState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Resolved(serde_json::Value),
    Rejected(Error),
}

/// Single-assignment result slot: the first `resolve`/`reject` wins, every
/// later call is ignored.
#[derive(Debug, Default)]
pub struct Settlement {
    outcome: Option<Outcome>,
}

impl Settlement {
    pub fn resolve(&mut self, value: serde_json::Value) -> bool {
        self.settle(Outcome::Resolved(value))
    }

    pub fn reject(&mut self, error: Error) -> bool {
        self.settle(Outcome::Rejected(error))
    }

    fn settle(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// The settled outcome as a `Result`, `None` while pending.
    pub fn result(&self) -> Option<Result<serde_json::Value, Error>> {
        self.outcome.as_ref().map(|outcome| match outcome {
            Outcome::Resolved(value) => Ok(value.clone()),
            Outcome::Rejected(error) => Err(error.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn legal_lifecycle() {
        let mut state = ProbeState::Idle;
        state.transition(ProbeState::Running).unwrap();
        state.transition(ProbeState::TimedOut).unwrap();
        assert!(state.is_settled());
    }

    #[test]
    fn illegal_transitions_are_reported() {
        let mut state = ProbeState::Idle;
        assert_eq!(
            state.transition(ProbeState::Resolved),
            Err(IllegalTransition {
                from: ProbeState::Idle,
                to: ProbeState::Resolved
            })
        );

        let mut state = ProbeState::Resolved;
        assert!(state.transition(ProbeState::Rejected).is_err());
        assert!(state.transition(ProbeState::Running).is_err());
        assert_eq!(state, ProbeState::Resolved);
    }

    #[test]
    fn settlement_fires_once() {
        let mut settlement = Settlement::default();
        assert!(settlement.result().is_none());

        assert!(settlement.resolve(json!({"ok": true})));
        assert!(!settlement.reject(Error::check("late")));
        assert!(!settlement.resolve(json!(null)));

        assert_eq!(settlement.result(), Some(Ok(json!({"ok": true}))));
    }
}
