//! Scenario files: a list, its collaborators' state and a script of steps.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use reclist_core::{
    AppSettings, BulkActionResponse, ExportResponse, JobResult, ListOptions, MassActionError,
    Record, RecordId,
};
use reclist_engine::memory::{
    Grants, MemoryAccess, MemoryRecordSource, ScriptedBackend, ScriptedInteraction, ScriptedJobs,
};
use reclist_engine::{
    Collaborators, ColumnDescriptor, HandlerRegistry, JsonMetadata, ListSetup, RecordList,
    UpdateDialogResult,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub entity_type: String,
    /// Query target; the entity type when unset.
    #[serde(default)]
    pub url: Option<String>,
    pub records: Vec<Record>,
    /// Total matching records; the page size when unset.
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub grants: Grants,
    #[serde(default)]
    pub options: ListOptions,
    /// Settings for this run instead of `settings.toml`.
    #[serde(default)]
    pub settings: Option<AppSettings>,
    #[serde(default)]
    pub layout: Option<Vec<ColumnDescriptor>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted step. Scripting steps prepare the next answer of a
/// collaborator; the rest act on the list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Check { id: RecordId },
    Uncheck { id: RecordId },
    SelectAllOnPage { checked: bool },
    SelectAllResults,
    UnselectAllResults,
    Execute { action: String },
    QuickRemove { id: RecordId },
    Sort { field: String },
    ShowMore,
    Refresh,

    Answer { yes: bool },
    QueueResponse { response: BulkActionResponse },
    QueueFailure { message: String },
    QueueExport { response: ExportResponse },
    QueuePost { response: serde_json::Value },
    QueueUpdate { count: u64, #[serde(default)] idle: bool },
    ResolveJob { job_id: String, result: JobResult },
    FailJob { job_id: String, message: String },
    ResolveExport { export_id: String, attachment_id: String },
    QueuePage { records: Vec<Record> },
    QueueMore { records: Vec<Record> },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid scenario: {}", e))
    }
}

/// The list under replay plus handles on its scripted collaborators.
pub struct Replay {
    pub list: RecordList,
    source: Arc<MemoryRecordSource>,
    backend: Arc<ScriptedBackend>,
    jobs: Arc<ScriptedJobs>,
    pub interaction: Arc<ScriptedInteraction>,
}

impl Replay {
    pub async fn setup(scenario: &Scenario, settings: AppSettings) -> Result<Self, String> {
        let total = scenario
            .total
            .unwrap_or(scenario.records.len() as i64);
        let mut source =
            MemoryRecordSource::new(&scenario.entity_type, scenario.records.clone(), total);
        if let Some(url) = &scenario.url {
            source = source.with_url(url);
        }
        let source = Arc::new(source);
        let backend = Arc::new(ScriptedBackend::new());
        let jobs = Arc::new(ScriptedJobs::new());
        let interaction = Arc::new(ScriptedInteraction::new());

        let collaborators = Collaborators {
            source: source.clone(),
            access: Arc::new(MemoryAccess::new(scenario.grants.clone())),
            metadata: Arc::new(JsonMetadata::new(scenario.metadata.clone())),
            backend: backend.clone(),
            jobs: jobs.clone(),
            interaction: interaction.clone(),
            handlers: Arc::new(HandlerRegistry::new()),
        };

        let mut setup = ListSetup::default()
            .with_settings(settings)
            .with_options(scenario.options.clone());
        if let Some(layout) = &scenario.layout {
            setup = setup.with_layout(layout.clone());
        }
        let list = RecordList::setup(collaborators, setup)
            .await
            .map_err(|e| format!("Setup failed: {}", e))?;

        Ok(Self {
            list,
            source,
            backend,
            jobs,
            interaction,
        })
    }

    /// Run one step and describe what happened.
    pub async fn run(&self, step: &Step) -> String {
        let list = &self.list;
        match step {
            Step::Check { id } => format!("checked {}: {}", id, list.check(id)),
            Step::Uncheck { id } => format!("unchecked {}: {}", id, list.uncheck(id)),
            Step::SelectAllOnPage { checked } => {
                list.toggle_select_all_on_page(*checked);
                format!("select all on page: {}", checked)
            }
            Step::SelectAllResults => match list.select_all_results() {
                Ok(()) => "all results selected".to_string(),
                Err(e) => format!("select all results rejected: {}", e),
            },
            Step::UnselectAllResults => {
                format!("all results unselected: {}", list.unselect_all_results())
            }
            Step::Execute { action } => match list.execute(action).await {
                Ok(outcome) => format!("{} -> {:?}", action, outcome),
                Err(e) => format!("{} failed: {}", action, e),
            },
            Step::QuickRemove { id } => match list.quick_remove(id).await {
                Ok(outcome) => format!("quick remove {} -> {:?}", id, outcome),
                Err(e) => format!("quick remove {} failed: {}", id, e),
            },
            Step::Sort { field } => match list.toggle_sort(field).await {
                Ok(disposition) => format!("sorted by {} ({:?})", field, disposition),
                Err(e) => format!("sort failed: {}", e),
            },
            Step::ShowMore => match list.show_more().await {
                Ok(added) => format!("show more added {} rows", added),
                Err(e) => format!("show more failed: {}", e),
            },
            Step::Refresh => match list.refresh().await {
                Ok(disposition) => format!("refreshed ({:?})", disposition),
                Err(e) => format!("refresh failed: {}", e),
            },

            Step::Answer { yes } => {
                self.interaction.answer(*yes);
                format!("next confirmation: {}", if *yes { "yes" } else { "no" })
            }
            Step::QueueResponse { response } => {
                self.backend.queue_mass_action(Ok(response.clone()));
                "queued bulk response".to_string()
            }
            Step::QueueFailure { message } => {
                let error = MassActionError::Transport(message.clone());
                self.backend.queue_mass_action(Err(error.clone()));
                self.backend.queue_failure(error);
                format!("queued failure: {}", message)
            }
            Step::QueueExport { response } => {
                self.backend.queue_export(Ok(response.clone()));
                "queued export response".to_string()
            }
            Step::QueuePost { response } => {
                self.backend.queue_post(Ok(response.clone()));
                "queued post response".to_string()
            }
            Step::QueueUpdate { count, idle } => {
                self.interaction.queue_update_result(Ok(Some(UpdateDialogResult {
                    count: *count,
                    idle: *idle,
                })));
                format!("next update dialog: {} records", count)
            }
            Step::ResolveJob { job_id, result } => {
                self.jobs.resolve(job_id, Ok(result.clone()));
                format!("job {} will resolve", job_id)
            }
            Step::FailJob { job_id, message } => {
                self.jobs.resolve(
                    job_id,
                    Err(MassActionError::JobFailed {
                        job_id: job_id.clone(),
                        message: message.clone(),
                    }),
                );
                format!("job {} will fail", job_id)
            }
            Step::ResolveExport {
                export_id,
                attachment_id,
            } => {
                self.jobs.resolve_export(export_id, Ok(attachment_id.clone()));
                format!("export {} will resolve", export_id)
            }
            Step::QueuePage { records } => {
                self.source.queue_page(records.clone());
                format!("queued page of {} records", records.len())
            }
            Step::QueueMore { records } => {
                self.source.queue_more(records.clone());
                format!("queued {} more records", records.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclist_core::NoticeLevel;

    fn scenario(steps: serde_json::Value) -> Scenario {
        serde_json::from_value(serde_json::json!({
            "entityType": "Account",
            "records": [
                {"id": "a", "entityType": "Account", "attributes": {"name": "Alder"}},
                {"id": "b", "entityType": "Account", "attributes": {"name": "Birch"}},
                {"id": "c", "entityType": "Account", "attributes": {"name": "Cedar"}}
            ],
            "layout": [{"name": "name"}],
            "steps": steps
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_replay_remove() {
        let scenario = scenario(serde_json::json!([
            {"step": "check", "id": "a"},
            {"step": "check", "id": "b"},
            {"step": "execute", "action": "remove"}
        ]));
        let replay = Replay::setup(&scenario, AppSettings::default())
            .await
            .unwrap();

        for step in &scenario.steps {
            replay.run(step).await;
        }

        assert_eq!(replay.list.rows().row_ids(), vec![RecordId::from("c")]);
        let notice = replay.interaction.last_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.key, "massRemoveResult");
    }

    #[tokio::test]
    async fn test_replay_declined_and_deferred() {
        let scenario = scenario(serde_json::json!([
            {"step": "check", "id": "c"},
            {"step": "answer", "yes": false},
            {"step": "execute", "action": "remove"},
            {"step": "queueResponse", "response": {"id": "job-1"}},
            {"step": "resolveJob", "jobId": "job-1", "result": {"count": 1}},
            {"step": "execute", "action": "remove"}
        ]));
        let replay = Replay::setup(&scenario, AppSettings::default())
            .await
            .unwrap();

        let mut lines = Vec::new();
        for step in &scenario.steps {
            lines.push(replay.run(step).await);
        }

        assert_eq!(lines[2], "remove -> Cancelled");
        assert_eq!(lines[5], "remove -> Completed { count: 1 }");
        assert_eq!(replay.list.rows().row_ids().len(), 2);
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let result: Result<Scenario, _> = serde_json::from_value(serde_json::json!({
            "entityType": "Account",
            "records": [],
            "steps": [{"step": "explode"}]
        }));
        assert!(result.is_err());
    }
}
