//! Commit/arm state machine.
//!
//! The console has a key switch ("arm") and a push button ("commit"). A
//! commit only counts when the panel is armed first, and the fix is only
//! reported to the backend once all gauges sit within leeway of their
//! expected values.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized
//!       │ arm key released
//!       ▼
//!     Ready ◄───────────────────────────┐
//!       │ arm key turned                │
//!       ▼                               │ arm key released
//!     Armed ────────────────────────────┤
//!       │ commit button pressed         │
//!       ▼                               │
//!   Committed ── gauges off target ──► (invalid-commit effect, stays)
//!       │ gauges all within leeway
//!       ▼
//!   SendCommit ── report "fixed" ──► CommitSent
//! ```
//!
//! The ordering of the variants is meaningful: `state >= Armed` means gauge
//! movement is locked out.

use serde::{Deserialize, Serialize};

/// States of the commit switch handling, ordered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    /// No arm key event seen yet
    #[default]
    Uninitialized,
    /// Arm key is in its idle position
    Ready,
    /// Arm key turned; gauges locked, display shows the armed text
    Armed,
    /// Commit button pressed while armed; awaiting the gauge check
    Committed,
    /// Gauges matched; the fixed status must be reported to the backend
    SendCommit,
    /// Fixed status has been reported
    CommitSent,
}

impl CommitState {
    /// Gauge movement is locked from `Armed` onward
    pub fn is_locked(self) -> bool {
        self >= CommitState::Armed
    }

    /// Arm key returned to idle (active-low line went high)
    pub fn on_arm_released(self) -> CommitState {
        CommitState::Ready
    }

    /// Arm key turned (active-low line went low). Arming is only possible
    /// from below `Armed` so a held key cannot re-arm mid-commit.
    pub fn on_arm_turned(self) -> CommitState {
        if self < CommitState::Armed {
            CommitState::Armed
        } else {
            self
        }
    }

    /// Commit button pressed (active-high). Only registers while armed.
    pub fn on_commit_pressed(self) -> CommitState {
        if self == CommitState::Armed {
            CommitState::Committed
        } else {
            self
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommitState::Uninitialized => "uninitialized",
            CommitState::Ready => "ready",
            CommitState::Armed => "armed",
            CommitState::Committed => "committed",
            CommitState::SendCommit => "send_commit",
            CommitState::CommitSent => "commit_sent",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_then_commit() {
        let s = CommitState::Uninitialized;
        let s = s.on_arm_released();
        assert_eq!(s, CommitState::Ready);
        let s = s.on_arm_turned();
        assert_eq!(s, CommitState::Armed);
        let s = s.on_commit_pressed();
        assert_eq!(s, CommitState::Committed);
    }

    #[test]
    fn commit_without_arming_is_ignored() {
        assert_eq!(
            CommitState::Ready.on_commit_pressed(),
            CommitState::Ready
        );
        assert_eq!(
            CommitState::Uninitialized.on_commit_pressed(),
            CommitState::Uninitialized
        );
    }

    #[test]
    fn held_key_does_not_rearm_past_commit() {
        assert_eq!(
            CommitState::Committed.on_arm_turned(),
            CommitState::Committed
        );
        assert_eq!(
            CommitState::CommitSent.on_arm_turned(),
            CommitState::CommitSent
        );
    }

    #[test]
    fn releasing_key_always_resets() {
        assert_eq!(CommitState::CommitSent.on_arm_released(), CommitState::Ready);
        assert_eq!(CommitState::Armed.on_arm_released(), CommitState::Ready);
    }

    #[test]
    fn lockout_ordering() {
        assert!(!CommitState::Ready.is_locked());
        assert!(CommitState::Armed.is_locked());
        assert!(CommitState::Committed.is_locked());
        assert!(CommitState::CommitSent.is_locked());
    }
}
