//! Mass-action execution orchestrator.
//!
//! Runs one invocation of an enabled action through the state machine in
//! [`ExecutionPhase`]. Every action is a variant of the same flow with its own
//! guards:
//!
//! 1. Check the action is enabled, and safe for all-results mode if active
//! 2. Variant guards (access, selection bounds)
//! 3. Confirm
//! 4. Build the execution context from the selection and dispatch
//! 5. Await the response, and the job if the server deferred it
//! 6. Reconcile rows and selection with what the server reports
//!
//! Every suspension point after dispatch races the list's teardown signal.
//! A job still pending at teardown is abandoned: no error, no reconciliation.

use parking_lot::RwLock;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;

use reclist_core::{
    AppSettings, BulkActionRequest, BulkActionResponse, ExecutionContext, JobHandle, JobResult,
    MassAction, MassActionError, Notice, RecordId, SelectionSnapshot, TargetSpec,
};

use crate::handlers::HandlerRegistry;
use crate::ports::{
    AccessOracle, Collaborators, Confirmation, Interaction, JobMonitor, MassActionBackend,
    RecordSource,
};
use crate::registry::MassActionRegistry;
use crate::rows::RowLifecycle;
use crate::selection::SelectionManager;

mod actions;
mod reconcile;
pub mod types;

pub use types::{ExecutionPhase, Outcome};

/// Runs mass actions for one list.
pub struct Orchestrator {
    entity_type: String,
    source: Arc<dyn RecordSource>,
    access: Arc<dyn AccessOracle>,
    backend: Arc<dyn MassActionBackend>,
    jobs: Arc<dyn JobMonitor>,
    interaction: Arc<dyn Interaction>,
    handlers: Arc<HandlerRegistry>,
    selection: Arc<SelectionManager>,
    rows: Arc<RowLifecycle>,
    registry: Arc<RwLock<MassActionRegistry>>,
    settings: Arc<AppSettings>,
    /// Default export field list: the layout's columns.
    export_fields: Vec<String>,
    phase: watch::Sender<ExecutionPhase>,
    teardown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        collaborators: &Collaborators,
        selection: Arc<SelectionManager>,
        rows: Arc<RowLifecycle>,
        registry: Arc<RwLock<MassActionRegistry>>,
        settings: Arc<AppSettings>,
        export_fields: Vec<String>,
        teardown: watch::Receiver<bool>,
    ) -> Self {
        let (phase, _) = watch::channel(ExecutionPhase::Idle);
        Self {
            entity_type: collaborators.source.entity_type(),
            source: collaborators.source.clone(),
            access: collaborators.access.clone(),
            backend: collaborators.backend.clone(),
            jobs: collaborators.jobs.clone(),
            interaction: collaborators.interaction.clone(),
            handlers: collaborators.handlers.clone(),
            selection,
            rows,
            registry,
            settings,
            export_fields,
            phase,
            teardown,
        }
    }

    /// Subscribe to phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<ExecutionPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase.borrow().clone()
    }

    fn set_phase(&self, phase: ExecutionPhase) {
        tracing::debug!("Execution phase: {:?}", phase);
        self.phase.send_replace(phase);
    }

    fn is_torn_down(&self) -> bool {
        *self.teardown.borrow()
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Run an enabled mass action against the current selection.
    ///
    /// Errors are also shown to the user as notices. Declined prompts are
    /// `Ok(Outcome::Cancelled)`, not errors.
    pub async fn execute(&self, name: &str) -> Result<Outcome, MassActionError> {
        let action = MassAction::parse(name);
        let result = self.run(&action).await;
        self.finish(&action, result)
    }

    /// Delete one record from its row menu.
    pub async fn quick_remove(&self, id: &RecordId) -> Result<Outcome, MassActionError> {
        let result = self.run_quick_remove(id).await;
        self.finish(&MassAction::Remove, result)
    }

    fn finish(
        &self,
        action: &MassAction,
        result: Result<Outcome, MassActionError>,
    ) -> Result<Outcome, MassActionError> {
        self.set_phase(ExecutionPhase::Idle);
        match &result {
            Ok(outcome) => tracing::debug!("Mass action '{}' finished: {:?}", action, outcome),
            Err(MassActionError::Cancelled) => {
                tracing::debug!("Mass action '{}' cancelled", action)
            }
            Err(e) if e.is_precondition() => {
                tracing::debug!("Mass action '{}' rejected: {}", action, e);
                self.interaction.notify(error_notice(action, e));
            }
            Err(e) => {
                tracing::error!("Mass action '{}' failed: {}", action, e);
                self.interaction.notify(error_notice(action, e));
            }
        }
        result
    }

    async fn run(&self, action: &MassAction) -> Result<Outcome, MassActionError> {
        if self.is_torn_down() {
            return Err(MassActionError::Cancelled);
        }

        let snapshot = self.selection.snapshot();
        {
            let registry = self.registry.read();
            if !registry.contains(action) {
                return Err(MassActionError::NotAllowed(action.name().to_string()));
            }
            if snapshot.all_results && !registry.is_all_result_safe(action) {
                return Err(MassActionError::NotAllowed(action.name().to_string()));
            }
        }
        if snapshot.is_empty() {
            return Err(MassActionError::EmptySelection);
        }

        tracing::info!(
            "Running mass action '{}' on {} ({:?})",
            action,
            self.entity_type,
            snapshot.mode()
        );

        match action {
            MassAction::Remove => self.remove(&snapshot).await,
            MassAction::MassUpdate => self.mass_update(&snapshot).await,
            MassAction::Export => self.export(&snapshot).await,
            MassAction::Merge => self.merge(&snapshot),
            MassAction::Follow => self.follow(&snapshot, true).await,
            MassAction::Unfollow => self.follow(&snapshot, false).await,
            MassAction::ConvertCurrency => self.convert_currency(&snapshot).await,
            MassAction::RecalculateFormula => self.recalculate_formula(&snapshot).await,
            MassAction::Unlink => self.unlink(&snapshot).await,
            MassAction::PrintPdf => self.print_pdf(&snapshot).await,
            MassAction::Custom(name) => self.custom(name, &snapshot).await,
        }
    }

    // =========================================================================
    // Shared Steps
    // =========================================================================

    /// Derive the payload target and idle flag from a selection.
    ///
    /// Idle is only ever set for all-results selections, when the total is
    /// unknown or above `threshold`, and never for portal users.
    pub(crate) fn execution_context(
        &self,
        snapshot: &SelectionSnapshot,
        threshold: i64,
    ) -> ExecutionContext {
        if snapshot.all_results {
            let total = self.source.total();
            ExecutionContext {
                target: TargetSpec::by_where(self.source.where_clause(), self.source.search_params()),
                idle: !self.access.is_portal() && (total == -1 || total > threshold),
            }
        } else {
            ExecutionContext {
                target: TargetSpec::Ids {
                    ids: snapshot.checked_ids.clone(),
                },
                idle: false,
            }
        }
    }

    /// Number shown in prompts: the explicit count or the query total.
    fn selection_size(&self, snapshot: &SelectionSnapshot) -> i64 {
        if snapshot.all_results {
            self.source.total()
        } else {
            snapshot.count() as i64
        }
    }

    async fn confirm(&self, confirmation: Confirmation) -> bool {
        self.set_phase(ExecutionPhase::Confirming);
        self.interaction.confirm(confirmation).await
    }

    fn progress(&self, key: &str) {
        self.interaction.notify(Notice::progress(key));
    }

    /// Await `future` unless the list is torn down first.
    async fn until_teardown<T>(&self, future: BoxFuture<'static, T>) -> Option<T> {
        let mut teardown = self.teardown.clone();
        if *teardown.borrow_and_update() {
            return None;
        }
        tokio::select! {
            value = future => Some(value),
            _ = teardown.wait_for(|down| *down) => None,
        }
    }

    /// Send a bulk action and wait for its result.
    ///
    /// `Ok(None)` means the list was torn down first.
    async fn dispatch_bulk(
        &self,
        wire_action: &str,
        context: &ExecutionContext,
    ) -> Result<Option<JobResult>, MassActionError> {
        self.set_phase(ExecutionPhase::Dispatching);
        let request = BulkActionRequest {
            entity_type: self.entity_type.clone(),
            action: wire_action.to_string(),
            params: context.target.clone(),
            idle: context.idle,
        };
        tracing::info!(
            "Dispatching '{}' for {} (by where: {}, idle: {})",
            wire_action,
            self.entity_type,
            context.target.is_by_where(),
            context.idle
        );

        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(response) = self.until_teardown(self.backend.mass_action(request)).await else {
            tracing::warn!("List closed before '{}' responded", wire_action);
            return Ok(None);
        };

        match response? {
            BulkActionResponse::Deferred { id } => {
                self.await_job(JobHandle {
                    job_id: id,
                    action: wire_action.to_string(),
                })
                .await
            }
            completed => Ok(completed.into_result()),
        }
    }

    /// Wait for a deferred job. `Ok(None)` means it was abandoned.
    async fn await_job(&self, job: JobHandle) -> Result<Option<JobResult>, MassActionError> {
        let job_id = job.job_id.clone();
        self.set_phase(ExecutionPhase::JobQueued {
            job_id: job_id.clone(),
        });
        tracing::info!("Action '{}' queued as job {}", job.action, job_id);

        self.set_phase(ExecutionPhase::JobPolling {
            job_id: job_id.clone(),
        });
        match self.until_teardown(self.jobs.await_job(job)).await {
            None => {
                tracing::warn!("Abandoned job {} on teardown", job_id);
                Ok(None)
            }
            Some(Ok(result)) => {
                tracing::info!("Job {} resolved, {} records affected", job_id, result.count);
                self.set_phase(ExecutionPhase::JobResolved { job_id });
                Ok(Some(result))
            }
            Some(Err(MassActionError::JobFailed { job_id, message })) => {
                Err(MassActionError::JobFailed { job_id, message })
            }
            Some(Err(e)) => Err(MassActionError::JobFailed {
                job_id,
                message: e.to_string(),
            }),
        }
    }
}

/// The notice shown for a failed invocation.
fn error_notice(action: &MassAction, error: &MassActionError) -> Notice {
    match (action, error) {
        (MassAction::PrintPdf, MassActionError::SelectionTooLarge { max, .. }) => {
            Notice::error("massPrintPdfMaxCountError").with_param("maxCount", max)
        }
        (_, MassActionError::SelectionTooSmall { min, .. }) => {
            Notice::error(error.message_key()).with_param("min", min)
        }
        (_, MassActionError::SelectionTooLarge { max, .. }) => {
            Notice::error(error.message_key()).with_param("max", max)
        }
        _ => Notice::error(error.message_key()),
    }
}
