//! InstanceState value object
//! Lifecycle state of one extension server instance

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Never started, or cleanly stopped.
    #[default]
    Inactive,
    /// Spawned, inside the probation window.
    Connecting,
    /// Still alive after the probation window.
    Active,
    /// Spawn failed or the process exited during probation.
    Error,
}

impl InstanceState {
    pub(crate) fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Inactive, Connecting)
                | (Error, Connecting)
                | (Active, Connecting)
                | (Connecting, Active)
                | (Connecting, Error)
                | (Active, Error)
                | (_, Inactive)
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Inactive => write!(f, "inactive"),
            InstanceState::Connecting => write!(f, "connecting"),
            InstanceState::Active => write!(f, "active"),
            InstanceState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstanceState::*;

    #[test]
    fn test_start_transitions() {
        assert!(Inactive.can_transition_to(Connecting));
        assert!(Error.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Active));
        assert!(Connecting.can_transition_to(Error));
    }

    #[test]
    fn test_active_process_can_die() {
        assert!(Active.can_transition_to(Error));
        assert!(Active.can_transition_to(Connecting));
    }

    #[test]
    fn test_everything_can_become_inactive() {
        for state in [Inactive, Connecting, Active, Error] {
            assert!(state.can_transition_to(Inactive));
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Inactive.can_transition_to(Active));
        assert!(!Inactive.can_transition_to(Error));
        assert!(!Active.can_transition_to(Active));
        assert!(!Error.can_transition_to(Active));
        assert!(!Connecting.can_transition_to(Connecting));
    }

    #[test]
    fn test_display_and_serde_agree() {
        for state in [Inactive, Connecting, Active, Error] {
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{state}\"")
            );
        }
    }
}
