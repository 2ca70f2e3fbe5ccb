//! Outcomes of convergence steps and reconcile passes.

use std::fmt;

/// What a convergence step asks of the pass that ran it.
///
/// A failing step is the `Err` side of the step's `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Object is converged; run the next step.
    Continue,
    /// The step mutated the store; end the pass and start a fresh one.
    Restart,
}

impl StepOutcome {
    /// Whether the pass must stop here.
    pub const fn is_restart(self) -> bool {
        matches!(self, Self::Restart)
    }
}

/// Result of one reconcile pass, as seen by the dispatcher.
///
/// A failed pass is the `Err` side of [`Reconciler::reconcile`](crate::Reconciler::reconcile)
/// and should be retried later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every dependent object exists and matches its derived shape,
    /// or the MediaServer is gone.
    Done,
    /// The pass stopped after a create; invoke again soon.
    Requeue,
}

impl ReconcileOutcome {
    /// Whether the dispatcher should invoke again immediately.
    pub const fn requeue(self) -> bool {
        matches!(self, Self::Requeue)
    }
}

impl From<StepOutcome> for ReconcileOutcome {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Continue => Self::Done,
            StepOutcome::Restart => Self::Requeue,
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Requeue => f.write_str("requeue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_maps_to_requeue() {
        assert_eq!(ReconcileOutcome::from(StepOutcome::Restart), ReconcileOutcome::Requeue);
        assert_eq!(ReconcileOutcome::from(StepOutcome::Continue), ReconcileOutcome::Done);
        assert!(ReconcileOutcome::Requeue.requeue());
        assert!(!ReconcileOutcome::Done.requeue());
    }
}
