//! The record list: every component wired together for one entity type.
//!
//! [`RecordList::setup`] resolves configuration, projects the layout, builds
//! the mass-action registry and renders the first page. Afterwards the list
//! is driven through its methods and observed through the watch channels of
//! its components.

use parking_lot::RwLock;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use reclist_core::{
    AppSettings, EntityListDefs, ListConfig, ListDefaults, ListOptions, MassAction,
    MassActionError, RecordId, RegistryError, SelectionSnapshot, SortOrder,
};

use crate::layout::{ColumnDescriptor, HeaderDef, LayoutProjector};
use crate::orchestrator::{ExecutionPhase, Orchestrator, Outcome};
use crate::ports::{Collaborators, FetchOptions, MetadataOracle};
use crate::registry::{build_registry, GatingContext, MassActionRegistry};
use crate::rows::{RowLifecycle, RowSetView, SyncDisposition, SyncEvent};
use crate::selection::{SelectionManager, SelectionView};

/// Inputs of [`RecordList::setup`] beyond the collaborators.
#[derive(Debug, Clone, Default)]
pub struct ListSetup {
    pub settings: AppSettings,
    pub defaults: ListDefaults,
    pub options: ListOptions,
    /// Columns to show. Read from `layouts.{scope}.{layoutName}` when unset.
    pub layout: Option<Vec<ColumnDescriptor>>,
}

impl ListSetup {
    pub fn with_settings(mut self, settings: AppSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_options(mut self, options: ListOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_layout(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.layout = Some(columns);
        self
    }
}

/// Changes to the collection reported by whoever owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    Sync(SyncEvent),
    OverlayOpened,
    OverlayClosed,
}

/// A rendered, selectable list of records with mass actions.
pub struct RecordList {
    entity_type: String,
    collaborators: Collaborators,
    config: ListConfig,
    projector: LayoutProjector,
    selection: Arc<SelectionManager>,
    rows: Arc<RowLifecycle>,
    registry: Arc<RwLock<MassActionRegistry>>,
    orchestrator: Orchestrator,
    settings: Arc<AppSettings>,
    /// Tracked sort, flipped by [`RecordList::toggle_sort`].
    sort: RwLock<(Option<String>, SortOrder)>,
    teardown: watch::Sender<bool>,
}

impl RecordList {
    /// Build and render a list.
    ///
    /// Fails when a metadata action names a handler that was never registered.
    pub async fn setup(
        collaborators: Collaborators,
        setup: ListSetup,
    ) -> Result<Self, RegistryError> {
        let source = collaborators.source.clone();
        let entity_type = source.entity_type();
        let metadata = collaborators.metadata.as_ref();

        let entity_defs: EntityListDefs = metadata
            .get(&["clientDefs", &entity_type])
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let mut config =
            ListConfig::resolve(&setup.defaults, &entity_defs, &setup.options, &setup.settings);

        let built = build_registry(&GatingContext {
            entity_type: &entity_type,
            collection_url: &source.url(),
            config: &config,
            settings: &setup.settings,
            access: collaborators.access.as_ref(),
            metadata,
            handlers: &collaborators.handlers,
        })
        .await?;
        config.checkboxes = built.checkboxes;

        let columns = setup
            .layout
            .unwrap_or_else(|| read_layout(metadata, &entity_type, &config.layout_name));
        let forbidden = if config.layout_acl_disabled {
            Vec::new()
        } else {
            collaborators
                .access
                .scope_forbidden_fields(&entity_type, "read")
        };
        let projector = LayoutProjector::new(&entity_type, columns, &forbidden, metadata, &config);

        let selection = Arc::new(SelectionManager::new());
        selection.set_actions(
            built.registry.action_names(),
            built.registry.all_result_action_names(),
        );
        let rows = Arc::new(RowLifecycle::new(
            source.clone(),
            collaborators.access.clone(),
            selection.clone(),
            &projector,
            &config,
        ));

        tracing::info!(
            "Set up {} list: {} columns, {} mass actions",
            entity_type,
            projector.columns().len(),
            built.registry.actions().len()
        );

        let registry = Arc::new(RwLock::new(built.registry));
        let settings = Arc::new(setup.settings);
        let (teardown, teardown_rx) = watch::channel(false);
        let orchestrator = Orchestrator::new(
            &collaborators,
            selection.clone(),
            rows.clone(),
            registry.clone(),
            settings.clone(),
            projector.field_names(),
            teardown_rx,
        );

        rows.build_rows();

        Ok(Self {
            sort: RwLock::new((source.order_by(), source.order())),
            entity_type,
            collaborators,
            config,
            projector,
            selection,
            rows,
            registry,
            orchestrator,
            settings,
            teardown,
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn check(&self, id: &RecordId) -> bool {
        self.selection.check(id, false)
    }

    pub fn uncheck(&self, id: &RecordId) -> bool {
        self.selection.uncheck(id, false)
    }

    pub fn toggle_select_all_on_page(&self, is_checked: bool) {
        self.selection.toggle_select_all_on_page(is_checked);
    }

    /// Whether "select all results" is offered.
    pub fn all_results_available(&self) -> bool {
        !self.config.mass_actions_disabled
            && !self.config.check_all_result_disabled
            && !self.registry.read().all_result_actions().is_empty()
    }

    pub fn select_all_results(&self) -> Result<(), MassActionError> {
        if !self.all_results_available() {
            return Err(MassActionError::AllResultsUnavailable);
        }
        self.selection.select_all_results();
        Ok(())
    }

    pub fn unselect_all_results(&self) -> bool {
        self.selection.unselect_all_results()
    }

    pub fn selection(&self) -> SelectionSnapshot {
        self.selection.snapshot()
    }

    /// Re-apply the selection to freshly rendered rows.
    pub fn after_render(&self) {
        let snapshot = self.selection.snapshot();
        self.selection.restore(&snapshot);
    }

    // =========================================================================
    // Actions
    // =========================================================================

    pub async fn execute(&self, action: &str) -> Result<Outcome, MassActionError> {
        self.orchestrator.execute(action).await
    }

    pub async fn quick_remove(&self, id: &RecordId) -> Result<Outcome, MassActionError> {
        self.orchestrator.quick_remove(id).await
    }

    /// Enable an action after setup. Returns `false` if it was enabled already.
    pub fn add_mass_action(&self, name: &str, all_result: bool, to_beginning: bool) -> bool {
        let added = self
            .registry
            .write()
            .add(MassAction::parse(name), all_result, to_beginning);
        if added {
            self.publish_actions();
        }
        added
    }

    pub fn remove_mass_action(&self, name: &str) -> bool {
        let removed = self.registry.write().remove(&MassAction::parse(name));
        if removed {
            self.publish_actions();
        }
        removed
    }

    fn publish_actions(&self) {
        let (actions, all_result_actions) = {
            let registry = self.registry.read();
            (registry.action_names(), registry.all_result_action_names())
        };
        self.selection.set_actions(actions, all_result_actions);
    }

    pub fn mass_actions(&self) -> Vec<String> {
        self.registry.read().action_names()
    }

    pub fn all_result_mass_actions(&self) -> Vec<String> {
        self.registry.read().all_result_action_names()
    }

    // =========================================================================
    // Rows
    // =========================================================================

    pub async fn show_more(&self) -> Result<usize, MassActionError> {
        self.rows.show_more().await
    }

    /// Sort by `field`, flipping the order when it is already the sort field.
    pub async fn toggle_sort(&self, field: &str) -> Result<SyncDisposition, MassActionError> {
        let (order_by, order) = {
            let sort = self.sort.read();
            let order = if sort.0.as_deref() == Some(field) {
                sort.1.reversed()
            } else {
                SortOrder::Asc
            };
            (field.to_string(), order)
        };

        let source = &self.collaborators.source;
        if source.len() > self.settings.record_list_max_size_limit {
            source.truncate(self.settings.record_list_max_size_limit);
        }
        tracing::debug!("Sorting {} by {} {:?}", self.entity_type, order_by, order);
        let outcome = source.sort(order_by.clone(), order).await?;
        *self.sort.write() = (Some(order_by), order);

        Ok(self.rows.apply_fetch(outcome.previous))
    }

    /// Reload the current page.
    pub async fn refresh(&self) -> Result<SyncDisposition, MassActionError> {
        let outcome = self
            .collaborators
            .source
            .fetch(FetchOptions::default())
            .await?;
        Ok(self.rows.apply_fetch(outcome.previous))
    }

    pub fn on_sync(&self, event: SyncEvent) -> SyncDisposition {
        self.rows.on_sync(event)
    }

    pub fn set_overlay_open(&self, open: bool) -> Option<SyncDisposition> {
        self.rows.set_overlay_open(open)
    }

    /// Apply collection events until the sender goes away or the list is torn down.
    pub async fn listen(&self, mut events: mpsc::Receiver<CollectionEvent>) {
        let mut teardown = self.teardown.subscribe();
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = teardown.wait_for(|down| *down) => None,
            };
            let Some(event) = event else {
                break;
            };
            match event {
                CollectionEvent::Sync(sync) => {
                    self.on_sync(sync);
                }
                CollectionEvent::OverlayOpened => {
                    self.set_overlay_open(true);
                }
                CollectionEvent::OverlayClosed => {
                    self.set_overlay_open(false);
                }
            }
        }
        tracing::debug!("Stopped listening to {} collection", self.entity_type);
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Header cells, or nothing when the header is off.
    pub fn header_defs(&self) -> Vec<HeaderDef> {
        if !self.config.header {
            return Vec::new();
        }
        let sort = self.sort.read();
        self.projector.header_defs(sort.0.as_deref(), sort.1)
    }

    pub fn min_table_width(&self) -> u64 {
        self.projector.min_table_width()
    }

    pub fn select_attribute_list(&self) -> Option<Vec<String>> {
        self.projector.select_attribute_list(
            self.collaborators.metadata.as_ref(),
            &self.config.mandatory_select_attribute_list,
        )
    }

    pub fn projector(&self) -> &LayoutProjector {
        &self.projector
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn subscribe_selection(&self) -> watch::Receiver<SelectionView> {
        self.selection.subscribe()
    }

    pub fn subscribe_rows(&self) -> watch::Receiver<RowSetView> {
        self.rows.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ExecutionPhase> {
        self.orchestrator.subscribe_phase()
    }

    pub fn rows(&self) -> &RowLifecycle {
        &self.rows
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release every row and abandon pending jobs.
    pub fn teardown(&self) {
        if self.teardown.send_replace(true) {
            return;
        }
        self.rows.teardown();
        tracing::info!("Tore down {} list", self.entity_type);
    }

    pub fn is_torn_down(&self) -> bool {
        *self.teardown.borrow()
    }
}

/// Columns of a named layout from metadata. Missing layouts give no columns.
fn read_layout(metadata: &dyn MetadataOracle, entity_type: &str, name: &str) -> Vec<ColumnDescriptor> {
    metadata
        .get(&["layouts", entity_type, name])
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
