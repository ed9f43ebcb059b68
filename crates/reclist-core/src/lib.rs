//! Core types for the record-list mass-action engine.
//!
//! This crate contains shared data structures that are used across all reclist crates:
//! - Record identifiers and records
//! - Selection snapshots
//! - Mass-action names, definitions, and wire payloads
//! - User-facing notices
//! - Configuration types
//! - Error types

mod action;
mod config;
mod error;
mod notice;
mod record;
mod selection;
mod wire;

pub use action::{ExecutionMode, MassAction, MassActionDefinition};
pub use config::{
    config_dir, settings_path, AppSettings, EntityListDefs, ListConfig, ListDefaults,
    ListOptions,
};
pub use error::{ConfigError, MassActionError, RegistryError};
pub use notice::{Notice, NoticeLevel};
pub use record::{Record, RecordId, SortOrder};
pub use selection::{SelectionMode, SelectionSnapshot};
pub use wire::{
    BulkActionRequest, BulkActionResponse, ExecutionContext, ExportRequest, ExportResponse,
    JobHandle, JobResult, PdfPrintRequest, TargetSpec,
};
