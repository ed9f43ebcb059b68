//! Bringing rows and selection in line with what the server reports.

use reclist_core::{JobResult, MassActionError, Notice, RecordId, SelectionSnapshot};

use super::types::{ExecutionPhase, Outcome, ResultWording, REMOVE_WORDING, UPDATE_WORDING};
use super::Orchestrator;

impl Orchestrator {
    /// Drop removed rows locally, or refetch when the server did not say which.
    pub(super) async fn reconcile_removal(
        &self,
        snapshot: &SelectionSnapshot,
        result: JobResult,
    ) -> Result<Outcome, MassActionError> {
        self.set_phase(ExecutionPhase::Reconciling);

        if result.count == 0 {
            self.interaction
                .notify(Notice::warning(REMOVE_WORDING.zero));
            return Ok(Outcome::NoEffect);
        }

        if snapshot.all_results {
            self.selection.unselect_all_results();
            self.refetch_after_action().await?;
        } else {
            let removed: Vec<RecordId> = match result.ids {
                Some(ids) => ids,
                None if result.count as usize == snapshot.count() => snapshot.checked_ids.clone(),
                None => Vec::new(),
            };
            if removed.is_empty() {
                self.refetch_after_action().await?;
            } else {
                for id in &removed {
                    if self.rows.binding(id).is_some() || self.source.get(id).is_some() {
                        self.rows.remove_record(id);
                    }
                }
                tracing::debug!("Removed {} rows locally", removed.len());
            }
        }

        Ok(self.report_count(result.count, REMOVE_WORDING))
    }

    /// Refetch and restore the prior selection after an update.
    ///
    /// A background update is reconciled the same way once its dialog closes,
    /// but reports no count.
    pub(super) async fn reconcile_update(
        &self,
        snapshot: &SelectionSnapshot,
        count: u64,
        idle: bool,
    ) -> Result<Outcome, MassActionError> {
        self.set_phase(ExecutionPhase::Reconciling);
        self.refetch_and_restore(snapshot).await?;

        if idle {
            tracing::info!("Update of {} queued in background", self.entity_type);
            return Ok(Outcome::Queued);
        }
        Ok(self.report_count(count, UPDATE_WORDING))
    }

    pub(super) async fn refetch_and_restore(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<(), MassActionError> {
        self.refetch_after_action().await?;
        self.selection.restore(snapshot);
        Ok(())
    }

    pub(super) async fn refetch_after_action(&self) -> Result<(), MassActionError> {
        let disposition = self.rows.refetch().await.map_err(|e| match e {
            MassActionError::Transport(message) => MassActionError::Reconcile(message),
            other => other,
        })?;
        tracing::debug!("Refetched after action: {:?}", disposition);
        Ok(())
    }

    /// Success notice with the count, or the zero-result warning.
    pub(super) fn report_count(&self, count: u64, wording: ResultWording) -> Outcome {
        if count == 0 {
            self.interaction.notify(Notice::warning(wording.zero));
            return Outcome::NoEffect;
        }
        self.interaction
            .notify(Notice::success(wording.for_count(count)).with_count(count));
        Outcome::Completed { count }
    }
}
