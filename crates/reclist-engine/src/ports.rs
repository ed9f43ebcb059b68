//! Collaborator contracts.
//!
//! The engine never talks to a server, a UI toolkit or an ACL store directly.
//! Everything it needs from the outside world comes through these traits, so
//! the same engine runs against a real client or the in-memory doubles in
//! [`crate::memory`].
//!
//! Methods that suspend return `BoxFuture<'static, _>`: implementations clone
//! what they need into the future so no borrow outlives the call.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use reclist_core::{
    BulkActionRequest, BulkActionResponse, ExportRequest, ExportResponse, JobHandle, JobResult,
    MassActionError, Notice, PdfPrintRequest, Record, RecordId, SortOrder, TargetSpec,
};

use crate::handlers::HandlerRegistry;

// =============================================================================
// Record Source
// =============================================================================

/// Options for a collection fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Append the next page instead of replacing the current one.
    pub more: bool,
}

impl FetchOptions {
    /// Fetch the next page.
    pub fn more() -> Self {
        Self { more: true }
    }
}

/// What a fetch did to the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Records as they were before the fetch.
    pub previous: Vec<Record>,
    /// Fetched records that were merged into an existing record with the same id.
    pub merged: usize,
}

/// The ordered, paged collection behind the list.
pub trait RecordSource: Send + Sync {
    /// Entity type of the records.
    fn entity_type(&self) -> String;

    /// Query target. Equal to the entity type for the base collection,
    /// different for relation-scoped sub-lists.
    fn url(&self) -> String;

    /// Loaded records in display order.
    fn models(&self) -> Vec<Record>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: &RecordId) -> Option<Record>;

    /// Total matching records. `-1` means unknown with more available,
    /// `-2` means no empty-state re-render is needed.
    fn total(&self) -> i64;

    fn set_total(&self, total: i64);

    /// Drop a record from the loaded page.
    fn remove(&self, id: &RecordId) -> Option<Record>;

    /// Filter criteria of the active query.
    fn where_clause(&self) -> serde_json::Value;

    fn search_params(&self) -> serde_json::Value;

    fn order_by(&self) -> Option<String>;

    fn order(&self) -> SortOrder;

    /// Records skipped when computing the next page offset because a fetch
    /// merged them into rows already loaded.
    fn length_correction(&self) -> usize;

    fn add_length_correction(&self, n: usize);

    /// Keep only the first `len` records.
    fn truncate(&self, len: usize);

    fn fetch(&self, options: FetchOptions)
        -> BoxFuture<'static, Result<FetchOutcome, MassActionError>>;

    /// Re-sort server side and reload the page.
    fn sort(
        &self,
        order_by: String,
        order: SortOrder,
    ) -> BoxFuture<'static, Result<FetchOutcome, MassActionError>>;
}

// =============================================================================
// Access Control
// =============================================================================

/// Answers access questions for the viewing principal.
#[cfg_attr(test, mockall::automock)]
pub trait AccessOracle: Send + Sync {
    /// Scope-level check, e.g. `("Account", "delete")`.
    fn check(&self, scope: &str, action: &str) -> bool;

    /// Scope access. `"read"` asks whether the scope is accessible at all.
    fn check_scope(&self, scope: &str, action: &str) -> bool;

    /// Record-level check.
    fn check_model(&self, record: &Record, action: &str) -> bool;

    /// Fields the principal may not use for `action` on `scope`.
    fn scope_forbidden_fields(&self, scope: &str, action: &str) -> Vec<String>;

    /// Named permission level, e.g. `exportPermission` -> `"no"`.
    fn permission(&self, name: &str) -> Option<String>;

    fn is_admin(&self) -> bool;

    fn is_portal(&self) -> bool;
}

// =============================================================================
// Metadata
// =============================================================================

/// Key-path lookup into application metadata.
pub trait MetadataOracle: Send + Sync {
    fn get(&self, path: &[&str]) -> Option<serde_json::Value>;

    /// Truthy lookup. Missing, `null`, `false`, `0` and `""` are false.
    fn get_bool(&self, path: &[&str]) -> bool {
        match self.get(path) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    fn get_str(&self, path: &[&str]) -> Option<String> {
        self.get(path)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// A list of strings. Non-string entries are skipped.
    fn get_str_list(&self, path: &[&str]) -> Vec<String> {
        match self.get(path) {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Server endpoints the orchestrator dispatches to.
pub trait MassActionBackend: Send + Sync {
    /// The bulk-action endpoint.
    fn mass_action(
        &self,
        request: BulkActionRequest,
    ) -> BoxFuture<'static, Result<BulkActionResponse, MassActionError>>;

    /// POST to an action-specific url declared in metadata.
    fn post(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> BoxFuture<'static, Result<serde_json::Value, MassActionError>>;

    fn export(
        &self,
        request: ExportRequest,
    ) -> BoxFuture<'static, Result<ExportResponse, MassActionError>>;

    /// Unlink records from the relation behind `url`.
    fn unlink(
        &self,
        url: String,
        ids: Vec<RecordId>,
    ) -> BoxFuture<'static, Result<(), MassActionError>>;

    /// Returns the attachment id of the generated file.
    fn print_pdf(
        &self,
        request: PdfPrintRequest,
    ) -> BoxFuture<'static, Result<String, MassActionError>>;

    fn delete_record(
        &self,
        entity_type: String,
        id: RecordId,
    ) -> BoxFuture<'static, Result<(), MassActionError>>;
}

/// Resolves deferred jobs.
///
/// No polling interval is implied. An implementation may poll, subscribe to a
/// push channel or anything else; the orchestrator only awaits the future and
/// drops it when the list goes away.
pub trait JobMonitor: Send + Sync {
    fn await_job(&self, job: JobHandle) -> BoxFuture<'static, Result<JobResult, MassActionError>>;

    /// Resolves a deferred export to the attachment id of the file.
    fn await_export(&self, export_id: String) -> BoxFuture<'static, Result<String, MassActionError>>;
}

// =============================================================================
// User Interaction
// =============================================================================

/// A yes/no prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub message: String,
    pub confirm_text: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Confirmation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            confirm_text: None,
            params: BTreeMap::new(),
        }
    }

    pub fn confirm_text(mut self, text: impl Into<String>) -> Self {
        self.confirm_text = Some(text.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }
}

/// Client-side navigation, e.g. to the merge screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTarget {
    pub entity_type: String,
    pub action: String,
    pub ids: Vec<RecordId>,
    pub url: String,
}

/// Input for the export dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDialogRequest {
    pub entity_type: String,
    /// Fields offered by default: the columns of the list layout.
    pub field_list: Vec<String>,
    pub target: TargetSpec,
}

/// What the user picked in the export dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDialogResult {
    pub format: String,
    #[serde(default)]
    pub export_all_fields: bool,
    #[serde(default)]
    pub attribute_list: Vec<String>,
    #[serde(default)]
    pub field_list: Vec<String>,
}

/// Input for the mass-update and convert-currency dialogs.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDialogRequest {
    pub entity_type: String,
    pub target: TargetSpec,
    /// Number of records the update applies to, `-1` when unknown.
    pub total_count: i64,
}

/// Result of a dialog that performed an update itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDialogResult {
    #[serde(default)]
    pub count: u64,
    /// The update ran as a background job; the count is not known yet.
    #[serde(default)]
    pub idle: bool,
}

/// The user-facing surface: prompts, notices and dialogs.
///
/// Dialog methods resolve to `None` when the user cancels.
pub trait Interaction: Send + Sync {
    fn confirm(&self, confirmation: Confirmation) -> BoxFuture<'static, bool>;

    fn notify(&self, notice: Notice);

    fn navigate(&self, target: NavigationTarget);

    fn download(&self, attachment_id: &str);

    fn export_dialog(
        &self,
        request: ExportDialogRequest,
    ) -> BoxFuture<'static, Option<ExportDialogResult>>;

    fn mass_update_dialog(
        &self,
        request: UpdateDialogRequest,
    ) -> BoxFuture<'static, Result<Option<UpdateDialogResult>, MassActionError>>;

    fn convert_currency_dialog(
        &self,
        request: UpdateDialogRequest,
    ) -> BoxFuture<'static, Result<Option<UpdateDialogResult>, MassActionError>>;

    /// Returns the chosen template id.
    fn select_pdf_template(&self, entity_type: String) -> BoxFuture<'static, Option<String>>;
}

// =============================================================================
// Bundle
// =============================================================================

/// Everything a record list talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn RecordSource>,
    pub access: Arc<dyn AccessOracle>,
    pub metadata: Arc<dyn MetadataOracle>,
    pub backend: Arc<dyn MassActionBackend>,
    pub jobs: Arc<dyn JobMonitor>,
    pub interaction: Arc<dyn Interaction>,
    pub handlers: Arc<HandlerRegistry>,
}
