//! Row lifecycle manager.
//!
//! Keeps exactly one [`RowBinding`] per loaded record. Bindings are built from
//! the session's projected row cells and the per-record access flags, and are
//! dropped when the record leaves the page.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use reclist_core::{ListConfig, MassActionError, Record, RecordId};

use crate::layout::{LayoutProjector, RowCell};
use crate::ports::{AccessOracle, FetchOptions, RecordSource};
use crate::selection::SelectionManager;

bitflags::bitflags! {
    /// What the principal may do with a row's record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RowAccess: u8 {
        const EDIT = 1 << 0;
        const DELETE = 1 << 1;
    }
}

/// A rendered row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBinding {
    pub record_id: RecordId,
    pub cells: Vec<RowCell>,
    pub access: RowAccess,
}

/// A collection resynchronisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncEvent {
    /// Records before the sync, when the source reported them.
    pub previous: Option<Vec<Record>>,
    /// The sync was caused by the list itself and must not rebuild rows.
    pub no_rebuild: bool,
}

/// What a sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDisposition {
    Rebuilt,
    /// Records are attribute-for-attribute unchanged.
    Unchanged,
    /// An overlay is open; the sync runs when it closes.
    Deferred,
    Skipped,
}

/// Show-more control state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowMoreState {
    pub active: bool,
    /// Records not loaded yet, negative when the total is unknown.
    pub remaining: i64,
}

/// Broadcast after every change to the row set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSetView {
    pub row_ids: Vec<RecordId>,
    pub total: i64,
    /// Whether the total is shown above the list.
    pub display_total_count: bool,
    /// Bumped every time a batch of rows is ready to render.
    pub generation: u64,
    /// Bumped when the list has to re-render from scratch.
    pub renders: u64,
    pub show_more: ShowMoreState,
}

#[derive(Default)]
struct RowState {
    bindings: HashMap<RecordId, RowBinding>,
    order: Vec<RecordId>,
    overlay_open: bool,
    pending_sync: Option<SyncEvent>,
    fetching_more: bool,
    no_rebuild: bool,
    torn_down: bool,
    generation: u64,
    renders: u64,
}

/// Owns the row bindings of one list.
pub struct RowLifecycle {
    source: Arc<dyn RecordSource>,
    access: Arc<dyn AccessOracle>,
    selection: Arc<SelectionManager>,
    cells: Vec<RowCell>,
    edit_disabled: bool,
    remove_disabled: bool,
    show_more_enabled: bool,
    display_total_count: bool,
    state: Mutex<RowState>,
    tx: watch::Sender<RowSetView>,
}

impl RowLifecycle {
    pub fn new(
        source: Arc<dyn RecordSource>,
        access: Arc<dyn AccessOracle>,
        selection: Arc<SelectionManager>,
        projector: &LayoutProjector,
        config: &ListConfig,
    ) -> Self {
        let (tx, _) = watch::channel(RowSetView::default());
        Self {
            source,
            access,
            selection,
            cells: projector.row_cells().to_vec(),
            edit_disabled: config.edit_disabled,
            remove_disabled: config.remove_disabled,
            show_more_enabled: config.show_more,
            display_total_count: config.display_total_count,
            state: Mutex::new(RowState::default()),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RowSetView> {
        self.tx.subscribe()
    }

    fn bind(&self, record: &Record) -> RowBinding {
        let mut access = RowAccess::empty();
        if !self.edit_disabled && self.access.check_model(record, "edit") {
            access |= RowAccess::EDIT;
        }
        if !self.remove_disabled && self.access.check_model(record, "delete") {
            access |= RowAccess::DELETE;
        }
        RowBinding {
            record_id: record.id.clone(),
            cells: self.cells.clone(),
            access,
        }
    }

    fn broadcast(&self, state: &RowState) {
        let view = RowSetView {
            row_ids: state.order.clone(),
            total: self.source.total(),
            display_total_count: self.display_total_count,
            generation: state.generation,
            renders: state.renders,
            show_more: self.show_more_state(),
        };
        self.tx.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Drop every binding and build one per loaded record.
    pub fn build_rows(&self) {
        let models = self.source.models();
        let bindings: Vec<RowBinding> = models.iter().map(|r| self.bind(r)).collect();
        let order: Vec<RecordId> = bindings.iter().map(|b| b.record_id.clone()).collect();

        {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            state.bindings.clear();
            state.order.clear();
            for binding in bindings {
                state.order.push(binding.record_id.clone());
                state.bindings.insert(binding.record_id.clone(), binding);
            }
            state.generation += 1;
            tracing::debug!("Built {} rows", state.order.len());
            self.broadcast(&state);
        }
        self.selection.set_page(order);
    }

    /// Fetch the next page and append bindings for the new records only.
    ///
    /// Returns the number of rows added.
    pub async fn show_more(&self) -> Result<usize, MassActionError> {
        {
            let mut state = self.state.lock();
            if state.torn_down || state.fetching_more {
                return Ok(0);
            }
            state.fetching_more = true;
        }

        let initial = self.source.len();
        let outcome = match self.source.fetch(FetchOptions::more()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state.lock().fetching_more = false;
                return Err(e);
            }
        };
        if outcome.merged > 0 {
            self.source.add_length_correction(outcome.merged);
        }

        let added: Vec<RowBinding> = self
            .source
            .models()
            .iter()
            .skip(initial)
            .map(|r| self.bind(r))
            .collect();
        let ids: Vec<RecordId> = added.iter().map(|b| b.record_id.clone()).collect();

        {
            let mut state = self.state.lock();
            state.fetching_more = false;
            if state.torn_down {
                return Ok(0);
            }
            for binding in added {
                if state.bindings.remove(&binding.record_id).is_some() {
                    state.order.retain(|id| *id != binding.record_id);
                }
                state.order.push(binding.record_id.clone());
                state.bindings.insert(binding.record_id.clone(), binding);
            }
            // The collection echoes this fetch as a sync
            state.no_rebuild = true;
            state.generation += 1;
            self.broadcast(&state);
        }
        self.selection.extend_page(ids.iter().cloned());

        tracing::debug!("Show more added {} rows ({} merged)", ids.len(), outcome.merged);
        Ok(ids.len())
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Handle a collection resynchronisation.
    pub fn on_sync(&self, event: SyncEvent) -> SyncDisposition {
        {
            let mut state = self.state.lock();
            if state.torn_down || state.fetching_more {
                return SyncDisposition::Skipped;
            }
            if state.overlay_open {
                state.pending_sync = Some(event);
                return SyncDisposition::Deferred;
            }
            let suppressed = std::mem::take(&mut state.no_rebuild);
            if let Some(previous) = &event.previous {
                if *previous == self.source.models() {
                    return SyncDisposition::Unchanged;
                }
            }
            if event.no_rebuild || suppressed {
                return SyncDisposition::Skipped;
            }
        }

        self.selection.reset();
        self.build_rows();
        SyncDisposition::Rebuilt
    }

    /// Refetch the current page and treat it as a sync.
    pub async fn refetch(&self) -> Result<SyncDisposition, MassActionError> {
        let outcome = self.source.fetch(FetchOptions::default()).await?;
        Ok(self.apply_fetch(outcome.previous))
    }

    /// Sync after a fetch or sort the list made itself.
    ///
    /// A pending show-more echo is dropped so this sync is never swallowed.
    pub fn apply_fetch(&self, previous: Vec<Record>) -> SyncDisposition {
        self.state.lock().no_rebuild = false;
        self.on_sync(SyncEvent {
            previous: Some(previous),
            no_rebuild: false,
        })
    }

    /// Syncs that arrive while an overlay is open run when it closes.
    pub fn set_overlay_open(&self, open: bool) -> Option<SyncDisposition> {
        let pending = {
            let mut state = self.state.lock();
            state.overlay_open = open;
            if open {
                None
            } else {
                state.pending_sync.take()
            }
        };
        pending.map(|event| self.on_sync(event))
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Drop one record and its row.
    ///
    /// Returns `true` when the page became empty and a full re-render was
    /// requested.
    pub fn remove_record(&self, id: &RecordId) -> bool {
        self.source.remove(id);
        let total = self.source.total();
        if total > 0 {
            self.source.set_total(total - 1);
        }
        self.selection.remove(id);

        let mut state = self.state.lock();
        state.bindings.remove(id);
        state.order.retain(|r| r != id);

        let total = self.source.total();
        let rerender = self.source.is_empty() && (total == 0 || total == -2);
        if rerender {
            state.renders += 1;
        }
        self.broadcast(&state);
        rerender
    }

    /// Release every binding. Later syncs and fetch results are ignored.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        state.torn_down = true;
        state.bindings.clear();
        state.order.clear();
        state.pending_sync = None;
        self.broadcast(&state);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Bindings in row order.
    pub fn bindings(&self) -> Vec<RowBinding> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.bindings.get(id).cloned())
            .collect()
    }

    pub fn binding(&self, id: &RecordId) -> Option<RowBinding> {
        self.state.lock().bindings.get(id).cloned()
    }

    pub fn row_ids(&self) -> Vec<RecordId> {
        self.state.lock().order.clone()
    }

    pub fn show_more_state(&self) -> ShowMoreState {
        let total = self.source.total();
        let remaining =
            total - self.source.len() as i64 - self.source.length_correction() as i64;
        ShowMoreState {
            active: self.show_more_enabled && (remaining > 0 || total == -1),
            remaining,
        }
    }

    pub fn view(&self) -> RowSetView {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ColumnDescriptor;
    use crate::memory::{MemoryAccess, MemoryRecordSource};
    use crate::metadata::JsonMetadata;
    use reclist_core::{AppSettings, EntityListDefs, ListDefaults, ListOptions};
    use serde_json::json;

    fn record(id: &str, name: &str) -> Record {
        Record::new(id, "Account").with_attribute("name", json!(name))
    }

    fn setup(records: Vec<Record>, total: i64) -> (Arc<MemoryRecordSource>, Arc<SelectionManager>, RowLifecycle) {
        let source = Arc::new(MemoryRecordSource::new("Account", records, total));
        let access = Arc::new(MemoryAccess::default());
        let selection = Arc::new(SelectionManager::new());
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &ListOptions::default(),
            &AppSettings::default(),
        );
        let metadata = JsonMetadata::new(json!({}));
        let projector = LayoutProjector::new(
            "Account",
            vec![ColumnDescriptor::named("name")],
            &[],
            &metadata,
            &config,
        );
        let rows = RowLifecycle::new(source.clone(), access, selection.clone(), &projector, &config);
        (source, selection, rows)
    }

    fn abc() -> Vec<Record> {
        vec![record("a", "A"), record("b", "B"), record("c", "C")]
    }

    #[test]
    fn test_build_rows_is_idempotent() {
        let (_, _, rows) = setup(abc(), 3);

        rows.build_rows();
        let first = rows.bindings();
        rows.build_rows();
        let second = rows.bindings();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert!(rows.view().display_total_count);
        assert_eq!(rows.row_ids(), vec![RecordId::from("a"), "b".into(), "c".into()]);
    }

    #[test]
    fn test_row_access_flags() {
        let (source, selection, _) = setup(abc(), 3);
        let access = Arc::new(MemoryAccess::default());
        access.deny_model("b", "delete");
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &ListOptions {
                edit_disabled: true,
                ..ListOptions::default()
            },
            &AppSettings::default(),
        );
        let metadata = JsonMetadata::new(json!({}));
        let projector = LayoutProjector::new("Account", Vec::new(), &[], &metadata, &config);
        let rows = RowLifecycle::new(source, access, selection, &projector, &config);
        rows.build_rows();

        assert_eq!(rows.binding(&"a".into()).unwrap().access, RowAccess::DELETE);
        assert_eq!(rows.binding(&"b".into()).unwrap().access, RowAccess::empty());
    }

    #[tokio::test]
    async fn test_unchanged_sync_does_not_rebuild() {
        let (source, selection, rows) = setup(abc(), 3);
        rows.build_rows();
        selection.check(&"a".into(), false);
        let generation = rows.view().generation;

        assert_eq!(rows.refetch().await.unwrap(), SyncDisposition::Unchanged);
        assert_eq!(rows.view().generation, generation);
        assert!(selection.is_checked(&"a".into()));

        source.queue_page(vec![record("a", "A2"), record("b", "B")]);
        assert_eq!(rows.refetch().await.unwrap(), SyncDisposition::Rebuilt);
        assert_eq!(rows.row_ids().len(), 2);
        assert!(selection.snapshot().is_empty());
    }

    #[test]
    fn test_sync_deferred_while_overlay_open() {
        let (source, _, rows) = setup(abc(), 3);
        rows.build_rows();

        rows.set_overlay_open(true);
        source.replace_models(vec![record("z", "Z")]);
        assert_eq!(rows.on_sync(SyncEvent::default()), SyncDisposition::Deferred);
        assert_eq!(rows.row_ids().len(), 3);

        assert_eq!(rows.set_overlay_open(false), Some(SyncDisposition::Rebuilt));
        assert_eq!(rows.row_ids(), vec![RecordId::from("z")]);
    }

    #[tokio::test]
    async fn test_show_more_echo_is_not_rebuilt() {
        let (source, _, rows) = setup(abc(), 6);
        rows.build_rows();
        source.queue_more(vec![record("d", "D")]);
        rows.show_more().await.unwrap();

        assert_eq!(rows.on_sync(SyncEvent::default()), SyncDisposition::Skipped);
        assert_eq!(rows.row_ids().len(), 4);
        assert_eq!(rows.on_sync(SyncEvent::default()), SyncDisposition::Rebuilt);
        assert_eq!(
            rows.on_sync(SyncEvent {
                previous: None,
                no_rebuild: true
            }),
            SyncDisposition::Skipped
        );
    }

    #[tokio::test]
    async fn test_unchanged_sync_consumes_show_more_echo() {
        let (source, _, rows) = setup(abc(), 6);
        rows.build_rows();
        source.queue_more(vec![record("d", "D")]);
        rows.show_more().await.unwrap();

        let echo = SyncEvent {
            previous: Some(source.models()),
            no_rebuild: false,
        };
        assert_eq!(rows.on_sync(echo), SyncDisposition::Unchanged);

        source.replace_models(vec![record("z", "Z")]);
        assert_eq!(rows.on_sync(SyncEvent::default()), SyncDisposition::Rebuilt);
        assert_eq!(rows.row_ids(), vec![RecordId::from("z")]);
    }

    #[tokio::test]
    async fn test_refetch_after_show_more_rebuilds() {
        let (source, _, rows) = setup(abc(), 6);
        rows.build_rows();
        source.queue_more(vec![record("d", "D")]);
        rows.show_more().await.unwrap();

        source.queue_page(vec![record("a", "A2")]);
        assert_eq!(rows.refetch().await.unwrap(), SyncDisposition::Rebuilt);
        assert_eq!(rows.row_ids(), vec![RecordId::from("a")]);
    }

    #[tokio::test]
    async fn test_show_more_appends_only_new_rows() {
        let (source, selection, rows) = setup(abc(), 6);
        rows.build_rows();
        let before = rows.bindings();
        source.queue_more(vec![record("c", "C2"), record("d", "D"), record("e", "E")]);

        assert_eq!(rows.show_more().await.unwrap(), 2);
        let after = rows.bindings();
        assert_eq!(&after[..3], &before[..]);
        assert_eq!(after.len(), 5);
        assert_eq!(source.length_correction(), 1);

        let state = rows.show_more_state();
        assert_eq!(state.remaining, 0);
        assert!(!state.active);

        assert!(selection.check(&"e".into(), false));
    }

    #[test]
    fn test_remove_record() {
        let (source, selection, rows) = setup(vec![record("a", "A")], 1);
        rows.build_rows();
        selection.check(&"a".into(), false);

        assert!(rows.remove_record(&"a".into()));
        assert_eq!(source.total(), 0);
        assert!(rows.bindings().is_empty());
        assert!(selection.snapshot().is_empty());
        assert_eq!(rows.view().renders, 1);
    }

    #[test]
    fn test_remove_record_keeps_page_when_more_remain() {
        let (source, _, rows) = setup(abc(), 10);
        rows.build_rows();

        assert!(!rows.remove_record(&"b".into()));
        assert_eq!(source.total(), 9);
        assert_eq!(rows.row_ids(), vec![RecordId::from("a"), "c".into()]);
    }

    #[test]
    fn test_teardown_ignores_later_syncs() {
        let (_, _, rows) = setup(abc(), 3);
        rows.build_rows();
        rows.teardown();

        assert_eq!(rows.on_sync(SyncEvent::default()), SyncDisposition::Skipped);
        assert!(rows.bindings().is_empty());
    }
}
