//! In-memory collaborators.
//!
//! Scriptable stand-ins for the record source, ACL, transport, job monitor
//! and user interaction. The CLI replays scenarios against them and the
//! engine tests use them as fixtures.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use reclist_core::{
    BulkActionRequest, BulkActionResponse, ExportRequest, ExportResponse, JobHandle, JobResult,
    MassActionError, Notice, NoticeLevel, PdfPrintRequest, Record, RecordId, SortOrder,
};

use crate::ports::{
    AccessOracle, Confirmation, ExportDialogRequest, ExportDialogResult, FetchOptions,
    FetchOutcome, Interaction, JobMonitor, MassActionBackend, NavigationTarget, RecordSource,
    UpdateDialogRequest, UpdateDialogResult,
};

// =============================================================================
// Record Source
// =============================================================================

struct SourceState {
    entity_type: String,
    url: String,
    models: Vec<Record>,
    total: i64,
    where_clause: serde_json::Value,
    search_params: serde_json::Value,
    order_by: Option<String>,
    order: SortOrder,
    length_correction: usize,
    /// Pages returned by successive plain fetches.
    pages: VecDeque<Vec<Record>>,
    /// Pages returned by successive show-more fetches.
    more: VecDeque<Vec<Record>>,
    fetch_error: Option<MassActionError>,
    fetch_count: usize,
}

/// A collection held in memory.
///
/// A plain fetch replaces the page with the next queued page, or reloads the
/// current one when none is queued.
#[derive(Clone)]
pub struct MemoryRecordSource {
    state: Arc<Mutex<SourceState>>,
}

impl MemoryRecordSource {
    pub fn new(entity_type: &str, models: Vec<Record>, total: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState {
                entity_type: entity_type.to_string(),
                url: entity_type.to_string(),
                models,
                total,
                where_clause: serde_json::Value::Array(Vec::new()),
                search_params: serde_json::Value::Object(serde_json::Map::new()),
                order_by: None,
                order: SortOrder::Asc,
                length_correction: 0,
                pages: VecDeque::new(),
                more: VecDeque::new(),
                fetch_error: None,
                fetch_count: 0,
            })),
        }
    }

    /// Use a relation url such as `Opportunity/1/accounts`.
    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().url = url.to_string();
        self
    }

    pub fn with_query(self, where_clause: serde_json::Value, search_params: serde_json::Value) -> Self {
        {
            let mut state = self.state.lock();
            state.where_clause = where_clause;
            state.search_params = search_params;
        }
        self
    }

    pub fn queue_page(&self, models: Vec<Record>) {
        self.state.lock().pages.push_back(models);
    }

    pub fn queue_more(&self, models: Vec<Record>) {
        self.state.lock().more.push_back(models);
    }

    /// Swap the loaded records without a fetch.
    pub fn replace_models(&self, models: Vec<Record>) {
        self.state.lock().models = models;
    }

    /// Fail the next fetch.
    pub fn fail_next_fetch(&self, error: MassActionError) {
        self.state.lock().fetch_error = Some(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetch_count
    }
}

impl RecordSource for MemoryRecordSource {
    fn entity_type(&self) -> String {
        self.state.lock().entity_type.clone()
    }

    fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    fn models(&self) -> Vec<Record> {
        self.state.lock().models.clone()
    }

    fn len(&self) -> usize {
        self.state.lock().models.len()
    }

    fn get(&self, id: &RecordId) -> Option<Record> {
        self.state.lock().models.iter().find(|r| r.id == *id).cloned()
    }

    fn total(&self) -> i64 {
        self.state.lock().total
    }

    fn set_total(&self, total: i64) {
        self.state.lock().total = total;
    }

    fn remove(&self, id: &RecordId) -> Option<Record> {
        let mut state = self.state.lock();
        let index = state.models.iter().position(|r| r.id == *id)?;
        Some(state.models.remove(index))
    }

    fn where_clause(&self) -> serde_json::Value {
        self.state.lock().where_clause.clone()
    }

    fn search_params(&self) -> serde_json::Value {
        self.state.lock().search_params.clone()
    }

    fn order_by(&self) -> Option<String> {
        self.state.lock().order_by.clone()
    }

    fn order(&self) -> SortOrder {
        self.state.lock().order
    }

    fn length_correction(&self) -> usize {
        self.state.lock().length_correction
    }

    fn add_length_correction(&self, n: usize) {
        self.state.lock().length_correction += n;
    }

    fn truncate(&self, len: usize) {
        self.state.lock().models.truncate(len);
    }

    fn fetch(
        &self,
        options: FetchOptions,
    ) -> BoxFuture<'static, Result<FetchOutcome, MassActionError>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.lock();
            state.fetch_count += 1;
            if let Some(error) = state.fetch_error.take() {
                return Err(error);
            }

            let previous = state.models.clone();
            let mut merged = 0;
            if options.more {
                for record in state.more.pop_front().unwrap_or_default() {
                    match state.models.iter().position(|r| r.id == record.id) {
                        Some(index) => {
                            state.models[index] = record;
                            merged += 1;
                        }
                        None => state.models.push(record),
                    }
                }
            } else if let Some(page) = state.pages.pop_front() {
                state.models = page;
                state.length_correction = 0;
            }
            Ok(FetchOutcome { previous, merged })
        })
    }

    fn sort(
        &self,
        order_by: String,
        order: SortOrder,
    ) -> BoxFuture<'static, Result<FetchOutcome, MassActionError>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.lock();
            let previous = state.models.clone();
            state.models.sort_by(|a, b| {
                let key = |r: &Record| {
                    r.attribute(&order_by)
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                };
                let ordering = key(a).cmp(&key(b));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
            state.order_by = Some(order_by);
            state.order = order;
            Ok(FetchOutcome {
                previous,
                merged: 0,
            })
        })
    }
}

// =============================================================================
// Access
// =============================================================================

/// Declarative grants, as read from a scenario file.
///
/// Scope rules are written `Scope.action`, record rules `recordId.action`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Grants {
    pub admin: bool,
    pub portal: bool,
    pub denied: Vec<String>,
    pub denied_scopes: Vec<String>,
    pub denied_records: Vec<String>,
    pub forbidden_fields: HashMap<String, Vec<String>>,
    pub permissions: HashMap<String, String>,
}

/// Allow-by-default access oracle.
///
/// Mass-update and export permissions default to `"yes"`.
pub struct MemoryAccess {
    grants: Mutex<Grants>,
}

impl MemoryAccess {
    pub fn new(mut grants: Grants) -> Self {
        for name in ["massUpdatePermission", "exportPermission"] {
            grants
                .permissions
                .entry(name.to_string())
                .or_insert_with(|| "yes".to_string());
        }
        Self {
            grants: Mutex::new(grants),
        }
    }

    pub fn deny(&self, scope: &str, action: &str) {
        self.grants.lock().denied.push(format!("{}.{}", scope, action));
    }

    pub fn deny_scope(&self, scope: &str, action: &str) {
        self.grants
            .lock()
            .denied_scopes
            .push(format!("{}.{}", scope, action));
    }

    pub fn deny_model(&self, id: &str, action: &str) {
        self.grants
            .lock()
            .denied_records
            .push(format!("{}.{}", id, action));
    }

    pub fn set_permission(&self, name: &str, level: &str) {
        self.grants
            .lock()
            .permissions
            .insert(name.to_string(), level.to_string());
    }

    pub fn set_admin(&self, admin: bool) {
        self.grants.lock().admin = admin;
    }

    pub fn set_portal(&self, portal: bool) {
        self.grants.lock().portal = portal;
    }
}

impl Default for MemoryAccess {
    fn default() -> Self {
        Self::new(Grants::default())
    }
}

impl AccessOracle for MemoryAccess {
    fn check(&self, scope: &str, action: &str) -> bool {
        let key = format!("{}.{}", scope, action);
        !self.grants.lock().denied.contains(&key)
    }

    fn check_scope(&self, scope: &str, action: &str) -> bool {
        let grants = self.grants.lock();
        let key = format!("{}.{}", scope, action);
        let any = format!("{}.read", scope);
        !grants.denied_scopes.contains(&key) && !grants.denied_scopes.contains(&any)
    }

    fn check_model(&self, record: &Record, action: &str) -> bool {
        let key = format!("{}.{}", record.id, action);
        !self.grants.lock().denied_records.contains(&key) && self.check(&record.entity_type, action)
    }

    fn scope_forbidden_fields(&self, scope: &str, action: &str) -> Vec<String> {
        let key = format!("{}.{}", scope, action);
        self.grants
            .lock()
            .forbidden_fields
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    fn permission(&self, name: &str) -> Option<String> {
        self.grants.lock().permissions.get(name).cloned()
    }

    fn is_admin(&self) -> bool {
        self.grants.lock().admin
    }

    fn is_portal(&self) -> bool {
        self.grants.lock().portal
    }
}

// =============================================================================
// Backend
// =============================================================================

/// A request the backend received.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    MassAction(BulkActionRequest),
    Post { url: String, body: serde_json::Value },
    Export(ExportRequest),
    Unlink { url: String, ids: Vec<RecordId> },
    PrintPdf(PdfPrintRequest),
    Delete { entity_type: String, id: RecordId },
}

#[derive(Default)]
struct BackendScript {
    mass_action: VecDeque<Result<BulkActionResponse, MassActionError>>,
    post: VecDeque<Result<serde_json::Value, MassActionError>>,
    export: VecDeque<Result<ExportResponse, MassActionError>>,
    failures: VecDeque<MassActionError>,
    calls: Vec<BackendCall>,
}

/// Backend that answers from queued responses and records every call.
///
/// With nothing queued, a bulk action completes against every requested id
/// and other calls succeed.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<BackendScript>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_mass_action(&self, response: Result<BulkActionResponse, MassActionError>) {
        self.script.lock().mass_action.push_back(response);
    }

    pub fn queue_post(&self, response: Result<serde_json::Value, MassActionError>) {
        self.script.lock().post.push_back(response);
    }

    pub fn queue_export(&self, response: Result<ExportResponse, MassActionError>) {
        self.script.lock().export.push_back(response);
    }

    /// Fail the next unlink, print or delete call.
    pub fn queue_failure(&self, error: MassActionError) {
        self.script.lock().failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.script.lock().calls.clone()
    }

    fn record(&self, call: BackendCall) {
        tracing::debug!("Backend call: {:?}", call);
        self.script.lock().calls.push(call);
    }

    fn next_failure(&self) -> Result<(), MassActionError> {
        match self.script.lock().failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn attachment_id() -> String {
    format!("attachment-{}", uuid::Uuid::new_v4())
}

impl MassActionBackend for ScriptedBackend {
    fn mass_action(
        &self,
        request: BulkActionRequest,
    ) -> BoxFuture<'static, Result<BulkActionResponse, MassActionError>> {
        self.record(BackendCall::MassAction(request.clone()));
        let queued = self.script.lock().mass_action.pop_front();
        Box::pin(async move {
            match queued {
                Some(response) => response,
                None => {
                    let ids = request.params.ids().map(<[RecordId]>::to_vec);
                    Ok(BulkActionResponse::Completed {
                        count: ids.as_ref().map_or(0, |ids| ids.len() as u64),
                        ids,
                        success_message: None,
                    })
                }
            }
        })
    }

    fn post(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> BoxFuture<'static, Result<serde_json::Value, MassActionError>> {
        self.record(BackendCall::Post { url, body });
        let queued = self.script.lock().post.pop_front();
        Box::pin(async move { queued.unwrap_or_else(|| Ok(serde_json::json!({"count": 0}))) })
    }

    fn export(
        &self,
        request: ExportRequest,
    ) -> BoxFuture<'static, Result<ExportResponse, MassActionError>> {
        self.record(BackendCall::Export(request));
        let queued = self.script.lock().export.pop_front();
        Box::pin(async move {
            queued.unwrap_or_else(|| Ok(ExportResponse::Ready { id: attachment_id() }))
        })
    }

    fn unlink(
        &self,
        url: String,
        ids: Vec<RecordId>,
    ) -> BoxFuture<'static, Result<(), MassActionError>> {
        self.record(BackendCall::Unlink { url, ids });
        let result = self.next_failure();
        Box::pin(async move { result })
    }

    fn print_pdf(
        &self,
        request: PdfPrintRequest,
    ) -> BoxFuture<'static, Result<String, MassActionError>> {
        self.record(BackendCall::PrintPdf(request));
        let result = self.next_failure().map(|_| attachment_id());
        Box::pin(async move { result })
    }

    fn delete_record(
        &self,
        entity_type: String,
        id: RecordId,
    ) -> BoxFuture<'static, Result<(), MassActionError>> {
        self.record(BackendCall::Delete { entity_type, id });
        let result = self.next_failure();
        Box::pin(async move { result })
    }
}

// =============================================================================
// Jobs
// =============================================================================

#[derive(Default)]
struct JobScript {
    jobs: HashMap<String, Result<JobResult, MassActionError>>,
    exports: HashMap<String, Result<String, MassActionError>>,
    awaited: Vec<JobHandle>,
}

/// Jobs resolve to scripted results. Unscripted jobs never resolve.
#[derive(Clone, Default)]
pub struct ScriptedJobs {
    script: Arc<Mutex<JobScript>>,
}

impl ScriptedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, job_id: &str, result: Result<JobResult, MassActionError>) {
        self.script.lock().jobs.insert(job_id.to_string(), result);
    }

    pub fn resolve_export(&self, export_id: &str, result: Result<String, MassActionError>) {
        self.script
            .lock()
            .exports
            .insert(export_id.to_string(), result);
    }

    pub fn awaited(&self) -> Vec<JobHandle> {
        self.script.lock().awaited.clone()
    }
}

impl JobMonitor for ScriptedJobs {
    fn await_job(&self, job: JobHandle) -> BoxFuture<'static, Result<JobResult, MassActionError>> {
        let result = {
            let mut script = self.script.lock();
            script.awaited.push(job.clone());
            script.jobs.remove(&job.job_id)
        };
        Box::pin(async move {
            match result {
                Some(result) => result,
                None => futures::future::pending().await,
            }
        })
    }

    fn await_export(&self, export_id: String) -> BoxFuture<'static, Result<String, MassActionError>> {
        let result = self.script.lock().exports.remove(&export_id);
        Box::pin(async move {
            match result {
                Some(result) => result,
                None => futures::future::pending().await,
            }
        })
    }
}

// =============================================================================
// Interaction
// =============================================================================

#[derive(Default)]
struct InteractionScript {
    answers: VecDeque<bool>,
    export_choice: Option<ExportDialogResult>,
    update_results: VecDeque<Result<Option<UpdateDialogResult>, MassActionError>>,
    pdf_template: Option<String>,
    confirmations: Vec<Confirmation>,
    notices: Vec<Notice>,
    navigations: Vec<NavigationTarget>,
    downloads: Vec<String>,
    update_requests: Vec<UpdateDialogRequest>,
}

/// Records everything shown to the user and answers prompts from a script.
///
/// Confirmations default to yes, the export dialog to CSV with all fields,
/// the PDF template picker to `default`. Update dialogs default to cancel.
#[derive(Clone)]
pub struct ScriptedInteraction {
    script: Arc<Mutex<InteractionScript>>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(InteractionScript {
                export_choice: Some(ExportDialogResult {
                    format: "csv".to_string(),
                    export_all_fields: true,
                    attribute_list: Vec::new(),
                    field_list: Vec::new(),
                }),
                pdf_template: Some("default".to_string()),
                ..InteractionScript::default()
            })),
        }
    }

    pub fn answer(&self, yes: bool) {
        self.script.lock().answers.push_back(yes);
    }

    pub fn set_export_choice(&self, choice: Option<ExportDialogResult>) {
        self.script.lock().export_choice = choice;
    }

    pub fn queue_update_result(&self, result: Result<Option<UpdateDialogResult>, MassActionError>) {
        self.script.lock().update_results.push_back(result);
    }

    pub fn set_pdf_template(&self, template: Option<String>) {
        self.script.lock().pdf_template = template;
    }

    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.script.lock().confirmations.clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.script.lock().notices.clone()
    }

    /// The most recent non-progress notice.
    pub fn last_notice(&self) -> Option<Notice> {
        self.script
            .lock()
            .notices
            .iter()
            .rev()
            .find(|n| n.level != NoticeLevel::Progress)
            .cloned()
    }

    pub fn navigations(&self) -> Vec<NavigationTarget> {
        self.script.lock().navigations.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.script.lock().downloads.clone()
    }

    pub fn update_requests(&self) -> Vec<UpdateDialogRequest> {
        self.script.lock().update_requests.clone()
    }

    fn next_update_result(
        &self,
        request: UpdateDialogRequest,
    ) -> Result<Option<UpdateDialogResult>, MassActionError> {
        let mut script = self.script.lock();
        script.update_requests.push(request);
        script.update_results.pop_front().unwrap_or(Ok(None))
    }
}

impl Default for ScriptedInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl Interaction for ScriptedInteraction {
    fn confirm(&self, confirmation: Confirmation) -> BoxFuture<'static, bool> {
        let answer = {
            let mut script = self.script.lock();
            script.confirmations.push(confirmation);
            script.answers.pop_front().unwrap_or(true)
        };
        Box::pin(async move { answer })
    }

    fn notify(&self, notice: Notice) {
        tracing::info!("Notice [{:?}] {}", notice.level, notice.key);
        self.script.lock().notices.push(notice);
    }

    fn navigate(&self, target: NavigationTarget) {
        tracing::info!("Navigate to {}", target.url);
        self.script.lock().navigations.push(target);
    }

    fn download(&self, attachment_id: &str) {
        tracing::info!("Download {}", attachment_id);
        self.script.lock().downloads.push(attachment_id.to_string());
    }

    fn export_dialog(
        &self,
        _request: ExportDialogRequest,
    ) -> BoxFuture<'static, Option<ExportDialogResult>> {
        let choice = self.script.lock().export_choice.clone();
        Box::pin(async move { choice })
    }

    fn mass_update_dialog(
        &self,
        request: UpdateDialogRequest,
    ) -> BoxFuture<'static, Result<Option<UpdateDialogResult>, MassActionError>> {
        let result = self.next_update_result(request);
        Box::pin(async move { result })
    }

    fn convert_currency_dialog(
        &self,
        request: UpdateDialogRequest,
    ) -> BoxFuture<'static, Result<Option<UpdateDialogResult>, MassActionError>> {
        let result = self.next_update_result(request);
        Box::pin(async move { result })
    }

    fn select_pdf_template(&self, _entity_type: String) -> BoxFuture<'static, Option<String>> {
        let template = self.script.lock().pdf_template.clone();
        Box::pin(async move { template })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclist_core::TargetSpec;
    use serde_json::json;

    fn record(id: &str) -> Record {
        Record::new(id, "Account")
    }

    #[tokio::test]
    async fn test_fetch_more_merges_duplicates() {
        let source = MemoryRecordSource::new("Account", vec![record("a"), record("b")], 4);
        source.queue_more(vec![record("b"), record("c")]);

        let outcome = source.fetch(FetchOptions::more()).await.unwrap();
        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.previous.len(), 2);
        assert_eq!(source.len(), 3);
    }

    #[tokio::test]
    async fn test_sort() {
        let source = MemoryRecordSource::new(
            "Account",
            vec![
                record("a").with_attribute("name", json!("b")),
                record("b").with_attribute("name", json!("a")),
            ],
            2,
        );
        source.sort("name".into(), SortOrder::Asc).await.unwrap();
        assert_eq!(source.models()[0].id, RecordId::from("b"));
        assert_eq!(source.order_by().as_deref(), Some("name"));
    }

    #[test]
    fn test_grants() {
        let grants: Grants = serde_json::from_value(json!({
            "denied": ["Account.delete"],
            "permissions": {"exportPermission": "no"}
        }))
        .unwrap();
        let access = MemoryAccess::new(grants);

        assert!(!access.check("Account", "delete"));
        assert!(access.check("Account", "edit"));
        assert!(!access.check_model(&record("a"), "delete"));
        assert_eq!(access.permission("exportPermission").as_deref(), Some("no"));
        assert_eq!(access.permission("massUpdatePermission").as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_backend_default_completes_requested_ids() {
        let backend = ScriptedBackend::new();
        let response = backend
            .mass_action(BulkActionRequest {
                entity_type: "Account".into(),
                action: "delete".into(),
                params: TargetSpec::Ids {
                    ids: vec!["a".into(), "b".into()],
                },
                idle: false,
            })
            .await
            .unwrap();

        assert_eq!(response.into_result().unwrap().count, 2);
        assert_eq!(backend.calls().len(), 1);
    }
}
