//! Selection snapshot types.

use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// Which of the three mutually exclusive selection states holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// Nothing selected.
    #[default]
    Empty,
    /// An explicit, ordered set of record identifiers.
    Explicit,
    /// Every record matching the active query, never enumerated.
    AllResults,
}

/// Point-in-time copy of the selection.
///
/// `checked_ids` is empty whenever `all_results` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    /// Checked identifiers in insertion order.
    #[serde(rename = "checkedIds")]
    pub checked_ids: Vec<RecordId>,

    /// Whether "all results" mode is active.
    #[serde(rename = "allResultsSelected")]
    pub all_results: bool,
}

impl SelectionSnapshot {
    /// Classify the snapshot.
    pub fn mode(&self) -> SelectionMode {
        if self.all_results {
            SelectionMode::AllResults
        } else if self.checked_ids.is_empty() {
            SelectionMode::Empty
        } else {
            SelectionMode::Explicit
        }
    }

    /// Number of explicitly checked records.
    pub fn count(&self) -> usize {
        self.checked_ids.len()
    }

    /// Whether nothing is selected in either mode.
    pub fn is_empty(&self) -> bool {
        self.mode() == SelectionMode::Empty
    }

    /// Whether an id is explicitly checked.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.checked_ids.contains(id)
    }
}
