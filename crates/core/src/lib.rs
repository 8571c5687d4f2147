//! odmlmerge core library.
//!
//! This crate provides the pieces behind a guided two-file merge of odML
//! metadata documents: the document model and its XML codec, the merge and
//! conflict policy, the merge session with its validation rules, the
//! workflow state machine that sequences the user's decisions, and
//! configuration.

pub mod config;
pub mod conflict;
pub mod document;
pub mod errors;
pub mod session;
pub mod workflow;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ConflictDetector, MergeMode, ValueConflict};
pub use document::{Document, DocumentModel, OdmlFileModel};
pub use session::{ExecuteOutcome, MergeSession, OutputValidation, Slot};
pub use workflow::{Confirmation, PathHints, PathPicker, PickPurpose, WorkflowController, WorkflowState};
