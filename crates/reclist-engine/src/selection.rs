//! Selection state manager.
//!
//! The only owner of the checked-id set and the all-results flag. Every other
//! component goes through these operations, and every mutation broadcasts the
//! derived [`SelectionView`].
//!
//! At any time exactly one of these holds:
//! - nothing is selected
//! - an explicit set of ids, all of them on the rendered page
//! - all results, with no enumerated ids

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use reclist_core::{RecordId, SelectionSnapshot};

/// Notifications fired by user-level selection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Check,
    SelectAllResults,
    UnselectAllResults,
}

/// What the embedding UI needs to draw the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionView {
    pub checked_ids: Vec<RecordId>,
    pub all_results: bool,
    /// Whether the bulk-action affordance is shown.
    pub actions_visible: bool,
    /// Row checkboxes are greyed out in all-results mode.
    pub checkboxes_enabled: bool,
    /// State of the header "select all" checkbox.
    pub select_all_checked: bool,
    /// Actions hidden because they are unsafe in all-results mode.
    pub hidden_actions: Vec<String>,
}

#[derive(Debug, Default)]
struct SelectionState {
    checked: Vec<RecordId>,
    all_results: bool,
    /// Ids of the rows currently rendered, in order.
    page: Vec<RecordId>,
    actions: Vec<String>,
    all_result_actions: Vec<String>,
}

impl SelectionState {
    fn holds_invariant(&self) -> bool {
        if self.all_results {
            self.checked.is_empty()
        } else {
            self.checked.iter().all(|id| self.page.contains(id))
        }
    }

    fn view(&self) -> SelectionView {
        let hidden_actions = if self.all_results {
            self.actions
                .iter()
                .filter(|a| !self.all_result_actions.contains(a))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        SelectionView {
            checked_ids: self.checked.clone(),
            all_results: self.all_results,
            actions_visible: self.all_results || !self.checked.is_empty(),
            checkboxes_enabled: !self.all_results,
            select_all_checked: self.all_results
                || (!self.page.is_empty() && self.checked.len() == self.page.len()),
            hidden_actions,
        }
    }
}

/// Owns the selection and broadcasts every change.
pub struct SelectionManager {
    state: RwLock<SelectionState>,
    view_tx: watch::Sender<SelectionView>,
    events: broadcast::Sender<SelectionEvent>,
}

impl SelectionManager {
    pub fn new() -> Self {
        let (view_tx, _) = watch::channel(SelectionView {
            checkboxes_enabled: true,
            ..SelectionView::default()
        });
        let (events, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(SelectionState::default()),
            view_tx,
            events,
        }
    }

    /// Subscribe to the derived view.
    pub fn subscribe(&self) -> watch::Receiver<SelectionView> {
        self.view_tx.subscribe()
    }

    /// Subscribe to check / all-results notifications.
    pub fn events(&self) -> broadcast::Receiver<SelectionEvent> {
        self.events.subscribe()
    }

    /// Apply a mutation, check the invariant and broadcast the new view.
    fn mutate<R>(&self, f: impl FnOnce(&mut SelectionState) -> R) -> R {
        let (result, view) = {
            let mut state = self.state.write();
            let result = f(&mut state);
            debug_assert!(state.holds_invariant(), "selection invariant violated");
            (result, state.view())
        };
        self.view_tx.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });
        result
    }

    fn emit(&self, event: SelectionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Check a rendered row.
    ///
    /// Returns `false` without changing the set when the row is not rendered
    /// or all-results mode is active.
    pub fn check(&self, id: &RecordId, silent: bool) -> bool {
        let checked = self.mutate(|state| {
            if state.all_results || !state.page.contains(id) {
                return false;
            }
            if !state.checked.contains(id) {
                state.checked.push(id.clone());
            }
            true
        });
        if checked && !silent {
            self.emit(SelectionEvent::Check);
        }
        checked
    }

    /// Uncheck a row. Returns whether it was checked.
    pub fn uncheck(&self, id: &RecordId, silent: bool) -> bool {
        let removed = self.mutate(|state| {
            let before = state.checked.len();
            state.checked.retain(|c| c != id);
            state.checked.len() != before
        });
        if removed && !silent {
            self.emit(SelectionEvent::Check);
        }
        removed
    }

    /// The header checkbox: check every rendered row, or clear the selection.
    ///
    /// Leaves all-results mode first in both directions.
    pub fn toggle_select_all_on_page(&self, is_checked: bool) {
        let left_all_results = self.mutate(|state| {
            let was_all_results = std::mem::take(&mut state.all_results);
            state.checked = if is_checked {
                state.page.clone()
            } else {
                Vec::new()
            };
            was_all_results
        });
        if left_all_results {
            self.emit(SelectionEvent::UnselectAllResults);
        }
        self.emit(SelectionEvent::Check);
    }

    /// Enter all-results mode, dropping any explicit selection.
    pub fn select_all_results(&self) {
        self.mutate(|state| {
            state.checked.clear();
            state.all_results = true;
        });
        tracing::debug!("All results selected");
        self.emit(SelectionEvent::SelectAllResults);
    }

    /// Leave all-results mode. Returns whether it was active.
    pub fn unselect_all_results(&self) -> bool {
        let was_active = self.mutate(|state| std::mem::take(&mut state.all_results));
        if was_active {
            tracing::debug!("All results unselected");
            self.emit(SelectionEvent::UnselectAllResults);
        }
        was_active
    }

    // =========================================================================
    // Engine Operations (silent)
    // =========================================================================

    /// Replace the rendered page. Checked ids no longer on it are dropped.
    pub fn set_page(&self, ids: Vec<RecordId>) {
        self.mutate(|state| {
            state.checked.retain(|id| ids.contains(id));
            state.page = ids;
        });
    }

    /// Rows appended by show-more.
    pub fn extend_page(&self, ids: impl IntoIterator<Item = RecordId>) {
        self.mutate(|state| {
            for id in ids {
                if !state.page.contains(&id) {
                    state.page.push(id);
                }
            }
        });
    }

    /// A row left the page.
    pub fn remove(&self, id: &RecordId) {
        self.mutate(|state| {
            state.page.retain(|p| p != id);
            state.checked.retain(|c| c != id);
        });
    }

    /// Clear both modes without notifying.
    pub fn reset(&self) {
        self.mutate(|state| {
            state.checked.clear();
            state.all_results = false;
        });
    }

    /// The enabled actions and their all-results-safe subset.
    pub fn set_actions(&self, actions: Vec<String>, all_result_actions: Vec<String>) {
        self.mutate(|state| {
            state.actions = actions;
            state.all_result_actions = all_result_actions;
        });
    }

    /// Restore a selection taken before a refetch, without notifying.
    ///
    /// Ids that are no longer rendered are skipped.
    pub fn restore(&self, snapshot: &SelectionSnapshot) {
        if snapshot.all_results {
            self.mutate(|state| {
                state.checked.clear();
                state.all_results = true;
            });
            return;
        }
        for id in &snapshot.checked_ids {
            self.check(id, true);
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn snapshot(&self) -> SelectionSnapshot {
        let state = self.state.read();
        SelectionSnapshot {
            checked_ids: state.checked.clone(),
            all_results: state.all_results,
        }
    }

    pub fn view(&self) -> SelectionView {
        self.state.read().view()
    }

    pub fn is_all_results(&self) -> bool {
        self.state.read().all_results
    }

    pub fn is_checked(&self, id: &RecordId) -> bool {
        self.state.read().checked.contains(id)
    }

    pub fn checked_count(&self) -> usize {
        self.state.read().checked.len()
    }

    #[cfg(test)]
    fn holds_invariant(&self) -> bool {
        self.state.read().holds_invariant()
    }
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<RecordId> {
        names.iter().map(|n| RecordId::from(*n)).collect()
    }

    fn manager_with_page(names: &[&str]) -> SelectionManager {
        let manager = SelectionManager::new();
        manager.set_page(ids(names));
        manager.set_actions(
            vec!["remove".into(), "merge".into(), "export".into()],
            vec!["remove".into(), "export".into()],
        );
        manager
    }

    #[test]
    fn test_check_and_uncheck() {
        let manager = manager_with_page(&["a", "b", "c"]);

        assert!(manager.check(&"a".into(), false));
        assert!(manager.check(&"b".into(), false));
        assert!(manager.check(&"a".into(), false));
        assert_eq!(manager.snapshot().checked_ids, ids(&["a", "b"]));
        assert!(manager.view().actions_visible);

        manager.uncheck(&"a".into(), false);
        manager.uncheck(&"b".into(), false);
        assert!(!manager.view().actions_visible);
    }

    #[test]
    fn test_check_unrendered_row_is_noop() {
        let manager = manager_with_page(&["a"]);
        let mut events = manager.events();

        assert!(!manager.check(&"zzz".into(), false));
        assert!(manager.snapshot().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_silent_check_fires_no_event() {
        let manager = manager_with_page(&["a"]);
        let mut events = manager.events();

        manager.check(&"a".into(), true);
        assert!(events.try_recv().is_err());

        manager.uncheck(&"a".into(), false);
        assert_eq!(events.try_recv().unwrap(), SelectionEvent::Check);
    }

    #[test]
    fn test_all_results_clears_explicit_selection() {
        let manager = manager_with_page(&["a", "b"]);
        manager.check(&"a".into(), false);

        manager.select_all_results();
        let view = manager.view();
        assert!(view.all_results);
        assert!(view.checked_ids.is_empty());
        assert!(!view.checkboxes_enabled);
        assert_eq!(view.hidden_actions, vec!["merge".to_string()]);

        assert!(!manager.check(&"b".into(), false));

        assert!(manager.unselect_all_results());
        let view = manager.view();
        assert!(view.checkboxes_enabled);
        assert!(view.hidden_actions.is_empty());
        assert!(!view.actions_visible);
    }

    #[test]
    fn test_toggle_select_all_on_page_leaves_all_results() {
        let manager = manager_with_page(&["a", "b"]);
        manager.select_all_results();
        let mut events = manager.events();

        manager.toggle_select_all_on_page(true);
        assert!(!manager.is_all_results());
        assert_eq!(manager.snapshot().checked_ids, ids(&["a", "b"]));
        assert!(manager.view().select_all_checked);
        assert_eq!(events.try_recv().unwrap(), SelectionEvent::UnselectAllResults);
        assert_eq!(events.try_recv().unwrap(), SelectionEvent::Check);

        manager.toggle_select_all_on_page(false);
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_invariant_holds_for_any_sequence() {
        let manager = manager_with_page(&["a", "b", "c"]);
        let ops: Vec<Box<dyn Fn(&SelectionManager)>> = vec![
            Box::new(|m| {
                m.check(&"a".into(), false);
            }),
            Box::new(|m| {
                m.uncheck(&"a".into(), false);
            }),
            Box::new(|m| m.toggle_select_all_on_page(true)),
            Box::new(|m| m.toggle_select_all_on_page(false)),
            Box::new(|m| m.select_all_results()),
            Box::new(|m| {
                m.unselect_all_results();
            }),
            Box::new(|m| {
                m.check(&"c".into(), false);
            }),
        ];

        // Deterministic walk over every pair and triple of operations
        for i in 0..ops.len() {
            for j in 0..ops.len() {
                for k in 0..ops.len() {
                    ops[i](&manager);
                    ops[j](&manager);
                    ops[k](&manager);
                    let snapshot = manager.snapshot();
                    assert!(!(snapshot.all_results && !snapshot.checked_ids.is_empty()));
                    assert!(manager.holds_invariant());
                }
            }
        }
    }

    #[test]
    fn test_set_page_drops_stale_ids() {
        let manager = manager_with_page(&["a", "b"]);
        manager.check(&"a".into(), false);
        manager.check(&"b".into(), false);

        manager.set_page(ids(&["b", "c"]));
        assert_eq!(manager.snapshot().checked_ids, ids(&["b"]));
    }

    #[test]
    fn test_restore_snapshot() {
        let manager = manager_with_page(&["a", "b"]);
        let mut events = manager.events();
        let snapshot = SelectionSnapshot {
            checked_ids: ids(&["b", "gone"]),
            all_results: false,
        };
        manager.restore(&snapshot);
        assert_eq!(manager.snapshot().checked_ids, ids(&["b"]));

        manager.reset();
        manager.restore(&SelectionSnapshot {
            checked_ids: Vec::new(),
            all_results: true,
        });
        assert!(manager.is_all_results());
        assert!(manager.view().hidden_actions.contains(&"merge".to_string()));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_view_broadcast() {
        let manager = manager_with_page(&["a"]);
        let rx = manager.subscribe();

        manager.check(&"a".into(), false);
        assert_eq!(rx.borrow().checked_ids, ids(&["a"]));
    }
}
