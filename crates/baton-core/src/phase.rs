//! Service lifecycle phases.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Lifecycle state shared by services, coordinators, and pools.
///
/// Transitions are one-way: `Running` to `ShutdownRequested` to `Terminated`.
/// There is no transition out of `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownPhase {
    Running,
    ShutdownRequested,
    Terminated,
}

impl ShutdownPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, ShutdownPhase::Running)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        matches!(self, ShutdownPhase::ShutdownRequested)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ShutdownPhase::Terminated)
    }

    /// Advances to `next` if that is a forward move, returning whether the
    /// phase changed. Backward moves are ignored, which makes shutdown calls
    /// idempotent and keeps the phase monotonic.
    pub fn advance(&mut self, next: ShutdownPhase) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl Display for ShutdownPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::ShutdownRequested => write!(f, "shutdown_requested"),
            ShutdownPhase::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_is_monotonic() {
        assert!(ShutdownPhase::Running < ShutdownPhase::ShutdownRequested);
        assert!(ShutdownPhase::ShutdownRequested < ShutdownPhase::Terminated);
    }

    #[test]
    fn test_advance_moves_forward_only() {
        let mut phase = ShutdownPhase::Running;
        assert!(phase.advance(ShutdownPhase::ShutdownRequested));
        assert!(phase.is_shutdown_requested());

        assert!(!phase.advance(ShutdownPhase::Running));
        assert!(phase.is_shutdown_requested());

        assert!(phase.advance(ShutdownPhase::Terminated));
        assert!(phase.is_terminated());
        assert!(!phase.advance(ShutdownPhase::ShutdownRequested));
    }

    #[test]
    fn test_advance_to_same_phase_reports_no_change() {
        let mut phase = ShutdownPhase::ShutdownRequested;
        assert!(!phase.advance(ShutdownPhase::ShutdownRequested));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ShutdownPhase::Running.to_string(), "running");
        assert_eq!(
            ShutdownPhase::ShutdownRequested.to_string(),
            "shutdown_requested"
        );
        assert_eq!(ShutdownPhase::Terminated.to_string(), "terminated");
    }
}
