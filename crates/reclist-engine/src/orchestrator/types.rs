//! Types shared by the orchestrator submodules.

use crate::ports::NavigationTarget;

/// Where an invocation is in its state machine.
///
/// ```text
/// Idle -> Confirming -> Dispatching -> AwaitingResponse ---------> Reconciling -> Idle
///                                   \-> JobQueued -> JobPolling -> JobResolved -/
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutionPhase {
    #[default]
    Idle,
    Confirming,
    Dispatching,
    AwaitingResponse,
    JobQueued { job_id: String },
    JobPolling { job_id: String },
    JobResolved { job_id: String },
    Reconciling,
}

/// How an invocation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The user declined a prompt or closed a dialog. Nothing was sent.
    Cancelled,
    Completed { count: u64 },
    /// The server applied the action to no records.
    NoEffect,
    /// The update runs as a background job. The list was refetched, no count is known.
    Queued,
    Navigated(NavigationTarget),
    Downloaded { attachment_id: String },
    /// Handed to a registered action handler.
    Delegated,
    /// The list was torn down while the action was pending.
    Abandoned,
}

/// Message keys for a count result.
#[derive(Debug, Clone, Copy)]
pub(super) struct ResultWording {
    pub plural: &'static str,
    pub single: &'static str,
    pub zero: &'static str,
}

pub(super) const REMOVE_WORDING: ResultWording = ResultWording {
    plural: "massRemoveResult",
    single: "massRemoveResultSingle",
    zero: "noRecordsRemoved",
};

pub(super) const UPDATE_WORDING: ResultWording = ResultWording {
    plural: "massUpdateResult",
    single: "massUpdateResultSingle",
    zero: "noRecordsUpdated",
};

pub(super) const FOLLOW_WORDING: ResultWording = ResultWording {
    plural: "massFollowResult",
    single: "massFollowResultSingle",
    zero: "massFollowZeroResult",
};

pub(super) const UNFOLLOW_WORDING: ResultWording = ResultWording {
    plural: "massUnfollowResult",
    single: "massUnfollowResultSingle",
    zero: "massUnfollowZeroResult",
};

pub(super) const RECALCULATE_WORDING: ResultWording = ResultWording {
    plural: "Done",
    single: "Done",
    zero: "noRecordsUpdated",
};

impl ResultWording {
    /// Success key for a non-zero count.
    pub fn for_count(&self, count: u64) -> &'static str {
        if count == 1 {
            self.single
        } else {
            self.plural
        }
    }
}
