//! Request and response payloads for the bulk-action and export endpoints.

use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// What an action operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// Every record matching the active query.
    ByWhere {
        #[serde(rename = "where")]
        where_clause: serde_json::Value,
        #[serde(rename = "searchParams")]
        search_params: serde_json::Value,
        #[serde(rename = "byWhere")]
        by_where: bool,
    },
    /// An explicit list of records.
    Ids { ids: Vec<RecordId> },
}

impl TargetSpec {
    /// Build an all-results target.
    pub fn by_where(where_clause: serde_json::Value, search_params: serde_json::Value) -> Self {
        Self::ByWhere {
            where_clause,
            search_params,
            by_where: true,
        }
    }

    /// Whether the target is the full filtered result set.
    pub fn is_by_where(&self) -> bool {
        matches!(self, Self::ByWhere { .. })
    }

    /// Explicit ids, if this is an id target.
    pub fn ids(&self) -> Option<&[RecordId]> {
        match self {
            Self::Ids { ids } => Some(ids),
            Self::ByWhere { .. } => None,
        }
    }
}

/// Request to the bulk-action endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionRequest {
    pub entity_type: String,
    pub action: String,
    pub params: TargetSpec,
    /// Caller expects a deferred job rather than an immediate result.
    #[serde(default)]
    pub idle: bool,
}

/// Response from the bulk-action endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkActionResponse {
    /// The action was queued as a background job.
    Deferred { id: String },
    /// The action completed within the request.
    Completed {
        #[serde(default)]
        count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ids: Option<Vec<RecordId>>,
        #[serde(
            default,
            rename = "successMessage",
            skip_serializing_if = "Option::is_none"
        )]
        success_message: Option<String>,
    },
}

/// Terminal payload of a resolved job, shaped like a completed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<RecordId>>,
}

impl BulkActionResponse {
    /// The completed payload, or `None` for a deferred job.
    pub fn into_result(self) -> Option<JobResult> {
        match self {
            Self::Completed { count, ids, .. } => Some(JobResult { count, ids }),
            Self::Deferred { .. } => None,
        }
    }
}

/// A server-side job created for a deferred action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
    /// Wire name of the action that queued the job.
    pub action: String,
}

/// Derived once per action invocation from the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub target: TargetSpec,
    /// Whether the server is expected to run the action as a background job.
    pub idle: bool,
}

/// Request to the export endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<RecordId>>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_params: Option<serde_json::Value>,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_list: Option<Vec<String>>,
    #[serde(default)]
    pub idle: bool,
}

/// Response from the export endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportResponse {
    /// Export is processed in the background.
    Deferred {
        #[serde(rename = "exportId")]
        export_id: String,
    },
    /// Export file is ready as an attachment.
    Ready { id: String },
}

/// Request to render a PDF for each selected record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfPrintRequest {
    pub id_list: Vec<RecordId>,
    pub entity_type: String,
    pub template_id: String,
}
