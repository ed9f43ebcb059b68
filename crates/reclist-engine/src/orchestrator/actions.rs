//! Per-action variants of the execution flow.

use reclist_core::{
    ExecutionMode, ExportRequest, ExportResponse, MassActionDefinition, MassActionError, Notice,
    PdfPrintRequest, RecordId, SelectionSnapshot, TargetSpec,
};

use crate::handlers::HandlerRequest;
use crate::ports::{
    Confirmation, ExportDialogRequest, NavigationTarget, UpdateDialogRequest,
};
use crate::registry::is_accessible;

use super::types::{
    ExecutionPhase, Outcome, FOLLOW_WORDING, RECALCULATE_WORDING, UNFOLLOW_WORDING,
};
use super::Orchestrator;

/// Merge needs between two and four records.
const MERGE_MIN: usize = 2;
const MERGE_MAX: usize = 4;

impl Orchestrator {
    fn require(&self, action: &str) -> Result<(), MassActionError> {
        if self.access.check(&self.entity_type, action) {
            Ok(())
        } else {
            Err(MassActionError::AccessDenied {
                scope: self.entity_type.clone(),
                action: action.to_string(),
            })
        }
    }

    pub(super) async fn remove(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        self.require("delete")?;

        let confirmation =
            Confirmation::new("removeSelectedRecordsConfirmation").confirm_text("Remove");
        if !self.confirm(confirmation).await {
            return Ok(Outcome::Cancelled);
        }

        self.progress("Removing...");
        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);
        let Some(result) = self.dispatch_bulk("delete", &context).await? else {
            return Ok(Outcome::Abandoned);
        };
        self.reconcile_removal(snapshot, result).await
    }

    pub(super) async fn mass_update(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        self.require("edit")?;
        self.progress("loading");

        let request = self.update_dialog_request(snapshot);
        let Some(result) = self.interaction.mass_update_dialog(request).await? else {
            return Ok(Outcome::Cancelled);
        };
        self.reconcile_update(snapshot, result.count, result.idle).await
    }

    pub(super) async fn convert_currency(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        self.progress("loading");

        let request = self.update_dialog_request(snapshot);
        let Some(result) = self.interaction.convert_currency_dialog(request).await? else {
            return Ok(Outcome::Cancelled);
        };
        self.reconcile_update(snapshot, result.count, result.idle).await
    }

    fn update_dialog_request(&self, snapshot: &SelectionSnapshot) -> UpdateDialogRequest {
        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);
        UpdateDialogRequest {
            entity_type: self.entity_type.clone(),
            target: context.target,
            total_count: self.selection_size(snapshot),
        }
    }

    pub(super) async fn export(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        if self.settings.export_disabled && !self.access.is_admin() {
            return Err(MassActionError::NotAllowed("export".to_string()));
        }

        let context = self.execution_context(snapshot, self.settings.export_idle_threshold);
        let dialog = ExportDialogRequest {
            entity_type: self.entity_type.clone(),
            field_list: self.export_fields.clone(),
            target: context.target.clone(),
        };
        let Some(choice) = self.interaction.export_dialog(dialog).await else {
            return Ok(Outcome::Cancelled);
        };

        let mut request = ExportRequest {
            entity_type: self.entity_type.clone(),
            format: choice.format,
            idle: context.idle,
            ..ExportRequest::default()
        };
        match context.target {
            TargetSpec::Ids { ids } => request.ids = Some(ids),
            TargetSpec::ByWhere {
                where_clause,
                search_params,
                ..
            } => {
                request.where_clause = Some(where_clause);
                request.search_params = Some(search_params);
            }
        }
        if !choice.export_all_fields {
            request.attribute_list = Some(choice.attribute_list);
            request.field_list = Some(choice.field_list);
        }

        self.progress("pleaseWait");
        self.set_phase(ExecutionPhase::Dispatching);
        tracing::info!(
            "Exporting {} as {} (idle: {})",
            self.entity_type,
            request.format,
            request.idle
        );
        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(response) = self.until_teardown(self.backend.export(request)).await else {
            return Ok(Outcome::Abandoned);
        };

        let attachment_id = match response? {
            ExportResponse::Ready { id } => id,
            ExportResponse::Deferred { export_id } => {
                self.set_phase(ExecutionPhase::JobQueued {
                    job_id: export_id.clone(),
                });
                self.set_phase(ExecutionPhase::JobPolling {
                    job_id: export_id.clone(),
                });
                let Some(result) = self
                    .until_teardown(self.jobs.await_export(export_id.clone()))
                    .await
                else {
                    tracing::warn!("Abandoned export {} on teardown", export_id);
                    return Ok(Outcome::Abandoned);
                };
                let attachment_id = result?;
                self.set_phase(ExecutionPhase::JobResolved { job_id: export_id });
                attachment_id
            }
        };

        self.interaction.download(&attachment_id);
        Ok(Outcome::Downloaded { attachment_id })
    }

    /// Navigate to the merge screen with the sorted selection.
    pub(super) fn merge(&self, snapshot: &SelectionSnapshot) -> Result<Outcome, MassActionError> {
        self.require("edit")?;

        let count = snapshot.count();
        if count < MERGE_MIN {
            return Err(MassActionError::SelectionTooSmall {
                min: MERGE_MIN,
                actual: count,
            });
        }
        if count > MERGE_MAX {
            return Err(MassActionError::SelectionTooLarge {
                max: MERGE_MAX,
                actual: count,
            });
        }

        let mut ids = snapshot.checked_ids.clone();
        ids.sort();
        let joined = ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(",");
        let target = NavigationTarget {
            entity_type: self.entity_type.clone(),
            action: "merge".to_string(),
            url: format!("#{}/merge/ids={}", self.entity_type, joined),
            ids,
        };
        self.interaction.navigate(target.clone());
        Ok(Outcome::Navigated(target))
    }

    pub(super) async fn follow(
        &self,
        snapshot: &SelectionSnapshot,
        follow: bool,
    ) -> Result<Outcome, MassActionError> {
        let (wire_action, message, confirm_text, wording) = if follow {
            ("follow", "confirmMassFollow", "Follow", FOLLOW_WORDING)
        } else {
            ("unfollow", "confirmMassUnfollow", "Unfollow", UNFOLLOW_WORDING)
        };

        let confirmation = Confirmation::new(message)
            .confirm_text(confirm_text)
            .with_param("count", self.selection_size(snapshot));
        if !self.confirm(confirmation).await {
            return Ok(Outcome::Cancelled);
        }

        self.progress("pleaseWait");
        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);
        let Some(result) = self.dispatch_bulk(wire_action, &context).await? else {
            return Ok(Outcome::Abandoned);
        };
        Ok(self.report_count(result.count, wording))
    }

    pub(super) async fn recalculate_formula(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        let confirmation = Confirmation::new("recalculateFormulaConfirmation").confirm_text("Yes");
        if !self.confirm(confirmation).await {
            return Ok(Outcome::Cancelled);
        }

        self.progress("pleaseWait");
        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);
        let Some(result) = self.dispatch_bulk("recalculateFormula", &context).await? else {
            return Ok(Outcome::Abandoned);
        };

        self.set_phase(ExecutionPhase::Reconciling);
        self.refetch_and_restore(snapshot).await?;
        Ok(self.report_count(result.count, RECALCULATE_WORDING))
    }

    pub(super) async fn unlink(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        let confirmation =
            Confirmation::new("unlinkSelectedRecordsConfirmation").confirm_text("Unlink");
        if !self.confirm(confirmation).await {
            return Ok(Outcome::Cancelled);
        }

        self.progress("Unlinking...");
        self.set_phase(ExecutionPhase::Dispatching);
        let ids = snapshot.checked_ids.clone();
        let count = ids.len() as u64;
        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(result) = self
            .until_teardown(self.backend.unlink(self.source.url(), ids))
            .await
        else {
            return Ok(Outcome::Abandoned);
        };
        result?;

        self.interaction.notify(Notice::success("Unlinked"));
        self.set_phase(ExecutionPhase::Reconciling);
        self.refetch_after_action().await?;
        Ok(Outcome::Completed { count })
    }

    pub(super) async fn print_pdf(
        &self,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        let count = snapshot.count();
        if let Some(max) = self.settings.mass_print_pdf_max_count {
            if count > max {
                return Err(MassActionError::SelectionTooLarge { max, actual: count });
            }
        }

        let Some(template_id) = self
            .interaction
            .select_pdf_template(self.entity_type.clone())
            .await
        else {
            return Ok(Outcome::Cancelled);
        };

        self.progress("loading");
        self.set_phase(ExecutionPhase::Dispatching);
        let request = PdfPrintRequest {
            id_list: snapshot.checked_ids.clone(),
            entity_type: self.entity_type.clone(),
            template_id,
        };
        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(result) = self.until_teardown(self.backend.print_pdf(request)).await else {
            return Ok(Outcome::Abandoned);
        };
        let attachment_id = result?;

        self.interaction.download(&attachment_id);
        Ok(Outcome::Downloaded { attachment_id })
    }

    /// Metadata-declared action: a registered handler, or a POST to its url.
    pub(super) async fn custom(
        &self,
        name: &str,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        let definition = self.registry.read().definition(name);
        match definition.execution_mode() {
            ExecutionMode::Handler => self.delegate(name, &definition, snapshot).await,
            ExecutionMode::Sync => self.post_custom(name, &definition, snapshot).await,
        }
    }

    async fn delegate(
        &self,
        name: &str,
        definition: &MassActionDefinition,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        let handler_name = definition.handler.as_deref().unwrap_or(name);
        let handler = self
            .handlers
            .get(handler_name)
            .ok_or_else(|| MassActionError::HandlerMissing(handler_name.to_string()))?;
        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);

        self.set_phase(ExecutionPhase::Dispatching);
        handler
            .run(HandlerRequest {
                entity_type: self.entity_type.clone(),
                action: name.to_string(),
                params: context.target,
            })
            .await?;
        Ok(Outcome::Delegated)
    }

    async fn post_custom(
        &self,
        name: &str,
        definition: &MassActionDefinition,
        snapshot: &SelectionSnapshot,
    ) -> Result<Outcome, MassActionError> {
        if definition.requires_confirmation()
            && !self
                .confirm(Confirmation::new(definition.confirmation_message()))
                .await
        {
            return Ok(Outcome::Cancelled);
        }
        if !is_accessible(definition, &self.entity_type, self.access.as_ref()) {
            return Err(MassActionError::AccessDenied {
                scope: definition
                    .acl_scope
                    .clone()
                    .unwrap_or_else(|| self.entity_type.clone()),
                action: definition.acl.clone().unwrap_or_else(|| "read".to_string()),
            });
        }
        let url = definition
            .url
            .clone()
            .ok_or_else(|| MassActionError::UnknownAction(name.to_string()))?;

        let context = self.execution_context(snapshot, self.settings.mass_action_idle_threshold);
        self.progress(definition.wait_message());
        self.set_phase(ExecutionPhase::Dispatching);
        let mut body = serde_json::to_value(&context.target)
            .map_err(|e| MassActionError::Transport(e.to_string()))?;
        if let Some(object) = body.as_object_mut() {
            object.insert(
                "entityType".to_string(),
                serde_json::Value::String(self.entity_type.clone()),
            );
            object.insert("idle".to_string(), serde_json::Value::Bool(context.idle));
        }

        tracing::info!("Posting mass action '{}' to {}", name, url);
        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(response) = self.until_teardown(self.backend.post(url, body)).await else {
            return Ok(Outcome::Abandoned);
        };
        let response = response?;
        let count = response
            .get("count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);

        self.set_phase(ExecutionPhase::Reconciling);
        self.refetch_after_action().await?;

        if count == 0 {
            self.interaction.notify(Notice::warning("noRecordsUpdated"));
            return Ok(Outcome::NoEffect);
        }
        let message = response
            .get("successMessage")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| definition.success_message())
            .to_string();
        self.interaction
            .notify(Notice::success(message).with_count(count));
        Ok(Outcome::Completed { count })
    }

    pub(super) async fn run_quick_remove(&self, id: &RecordId) -> Result<Outcome, MassActionError> {
        if self.is_torn_down() {
            return Err(MassActionError::Cancelled);
        }
        let Some(record) = self.source.get(id) else {
            return Ok(Outcome::NoEffect);
        };
        if !self.access.check_model(&record, "delete") {
            return Err(MassActionError::AccessDenied {
                scope: self.entity_type.clone(),
                action: "delete".to_string(),
            });
        }

        let confirmation = Confirmation::new("removeRecordConfirmation").confirm_text("Remove");
        if !self.confirm(confirmation).await {
            return Ok(Outcome::Cancelled);
        }

        self.progress("Removing...");
        self.set_phase(ExecutionPhase::AwaitingResponse);
        let Some(result) = self
            .until_teardown(
                self.backend
                    .delete_record(self.entity_type.clone(), id.clone()),
            )
            .await
        else {
            return Ok(Outcome::Abandoned);
        };
        result?;

        self.set_phase(ExecutionPhase::Reconciling);
        self.interaction.notify(Notice::success("Removed"));
        self.rows.remove_record(id);
        Ok(Outcome::Completed { count: 1 })
    }
}
