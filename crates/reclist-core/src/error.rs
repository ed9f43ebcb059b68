//! Error types for the record-list engine.

use thiserror::Error;

/// Mass-action errors - surfaced to the user as notices.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MassActionError {
    /// The principal lacks the required access.
    #[error("Access denied: {action} on {scope}")]
    AccessDenied { scope: String, action: String },

    /// Fewer records selected than the action needs.
    #[error("Select {min} or more records (selected {actual})")]
    SelectionTooSmall { min: usize, actual: usize },

    /// More records selected than the action allows.
    #[error("Select not more than {max} records (selected {actual})")]
    SelectionTooLarge { max: usize, actual: usize },

    /// Nothing is selected.
    #[error("No records selected")]
    EmptySelection,

    /// "All results" mode is not offered for this list.
    #[error("Selecting all results is not available")]
    AllResultsUnavailable,

    /// The action is not in the enabled registry, or not safe in the current mode.
    #[error("Action '{0}' is not allowed")]
    NotAllowed(String),

    /// The action has no definition or execution path.
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    /// A definition names a handler that was never registered.
    #[error("Handler '{0}' is not registered")]
    HandlerMissing(String),

    /// Network or server failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A deferred job reported failure.
    #[error("Job '{job_id}' failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Local reconciliation failed after the server applied the action.
    #[error("Reconcile error: {0}")]
    Reconcile(String),

    /// The list was torn down while the action was pending.
    #[error("Cancelled")]
    Cancelled,
}

impl MassActionError {
    /// Precondition errors are reported inline and never reach the server.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. }
                | Self::SelectionTooSmall { .. }
                | Self::SelectionTooLarge { .. }
                | Self::EmptySelection
                | Self::AllResultsUnavailable
                | Self::NotAllowed(_)
        )
    }

    /// Message key used when the error is shown to the user.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::AccessDenied { .. } => "Access denied",
            Self::SelectionTooSmall { .. } => "selectionTooSmall",
            Self::SelectionTooLarge { .. } => "selectionTooLarge",
            Self::EmptySelection => "noRecordsSelected",
            Self::AllResultsUnavailable => "Not available",
            Self::NotAllowed(_) => "Not allowed",
            Self::UnknownAction(_) | Self::HandlerMissing(_) => "Error",
            Self::Transport(_) => "Error",
            Self::JobFailed { .. } => "Error",
            Self::Reconcile(_) => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Registry construction errors, detected at registration time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A definition names a handler that is not registered.
    #[error("Action '{action}' references unregistered handler '{handler}'")]
    UnregisteredHandler { action: String, handler: String },

    /// A handler with the same name is already registered.
    #[error("Handler '{0}' already registered")]
    DuplicateHandler(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory found.
    #[error("Config directory not found")]
    NoConfigDir,

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}
