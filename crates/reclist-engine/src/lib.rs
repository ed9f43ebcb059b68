//! Record-list engine.
//!
//! This crate drives a paged, selectable list of records including:
//! - Selection state with an "all results" mode
//! - Layout projection into header and row render instructions
//! - Mass-action registry built through a gating pipeline
//! - Mass-action execution with deferred jobs and teardown
//! - Row bindings kept in step with the record collection

pub mod handlers;
pub mod layout;
pub mod list;
pub mod memory;
pub mod metadata;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod rows;
pub mod selection;

// Re-export commonly used types
pub use handlers::{ActionHandler, HandlerRegistry, HandlerRequest};
pub use layout::{
    CellInstruction, CellMode, ColumnDescriptor, ColumnWidth, HeaderDef, LayoutProjector, RowCell,
};
pub use list::{CollectionEvent, ListSetup, RecordList};
pub use metadata::JsonMetadata;
pub use orchestrator::{ExecutionPhase, Orchestrator, Outcome};
pub use ports::{
    AccessOracle, Collaborators, Confirmation, ExportDialogRequest, ExportDialogResult,
    FetchOptions, FetchOutcome, Interaction, JobMonitor, MassActionBackend, MetadataOracle,
    NavigationTarget, RecordSource, UpdateDialogRequest, UpdateDialogResult,
};
pub use registry::{build_registry, GatingContext, MassActionRegistry, RegistrySetup};
pub use rows::{
    RowAccess, RowBinding, RowLifecycle, RowSetView, ShowMoreState, SyncDisposition, SyncEvent,
};
pub use selection::{SelectionEvent, SelectionManager, SelectionView};

// Re-export reclist_core types for convenience
pub use reclist_core::{
    AppSettings, ListOptions, MassAction, MassActionError, Notice, NoticeLevel, Record, RecordId,
    SelectionSnapshot,
};
