//! Error types for the odmlmerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::conflict::ValueConflict;
use crate::session::Slot;
use crate::workflow::WorkflowState;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

/// Errors from loading, parsing and saving odML documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The input file does not exist.
    #[error("document not found: {0}")]
    FileNotFound(String),

    /// Reading the file failed.
    #[error("failed to read '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a well-formed odML document.
    #[error("malformed odML in '{path}' (line {line}): {detail}")]
    ParseError {
        path: String,
        line: usize,
        detail: String,
    },

    /// A property value does not match its declared type.
    #[error("invalid {dtype} value '{value}' for property '{property}'")]
    InvalidValue {
        property: String,
        dtype: String,
        value: String,
    },

    /// Two sibling sections, or two properties of one section, share a name.
    #[error("duplicate name '{path}'")]
    DuplicateName { path: String },

    /// Writing the output file failed. Nothing was left at the destination.
    #[error("failed to write '{path}': {detail}")]
    WriteError { path: String, detail: String },
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from merging two documents.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Strict mode refused to replace non-default values. The merge was not
    /// applied at all.
    #[error("{}", describe_strict_violation(.conflicts))]
    StrictViolation { conflicts: Vec<ValueConflict> },
}

impl ConflictError {
    /// All conflicting values that caused the merge to be refused.
    pub fn conflicts(&self) -> &[ValueConflict] {
        match self {
            Self::StrictViolation { conflicts } => conflicts,
        }
    }
}

fn describe_strict_violation(conflicts: &[ValueConflict]) -> String {
    match conflicts.split_first() {
        None => "strict merge refused".to_string(),
        Some((first, [])) => format!("cannot merge into non-default value: {first}"),
        Some((first, rest)) => format!(
            "cannot merge into non-default value: {first} (and {} more)",
            rest.len()
        ),
    }
}

// ---------------------------------------------------------------------------
// Workflow validation errors
// ---------------------------------------------------------------------------

/// A precondition of a workflow step does not hold. The workflow state is
/// left untouched whenever one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// An input was designated with an empty path.
    #[error("input {0} path must not be empty")]
    EmptyInputPath(Slot),

    /// An input file has not been chosen yet.
    #[error("input {0} has not been selected; two input files are needed for a merge")]
    MissingInput(Slot),

    /// No merge mode has been chosen.
    #[error("no merge mode selected: choose \"strict\" or \"overwrite\"")]
    NoModeSelected,

    /// No output file was chosen.
    #[error("no output file selected")]
    EmptyOutputPath,

    /// The output file has the wrong extension.
    #[error("the output file format is supposed to be \"{expected}\", but \"{found}\" was selected")]
    WrongExtension { expected: String, found: String },

    /// `execute` was requested without a validated output path.
    #[error("the output file has not been validated")]
    OutputNotValidated,

    /// The step is not available in the current workflow state.
    #[error("cannot {step} while {state}")]
    InvalidStep {
        state: WorkflowState,
        step: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading, validation and saving.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading or writing the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(path: &str) -> ValueConflict {
        ValueConflict {
            path: path.to_string(),
            target: vec!["1".into()],
            source: vec!["2".into()],
        }
    }

    #[test]
    fn test_error_display_messages() {
        let err = ValidationError::WrongExtension {
            expected: ".odml".into(),
            found: ".csv".into(),
        };
        assert_eq!(
            err.to_string(),
            "the output file format is supposed to be \".odml\", but \".csv\" was selected"
        );

        let err = ValidationError::MissingInput(Slot::Second);
        assert!(err.to_string().starts_with("input 2"));

        let err = ConfigError::InvalidValue {
            field: "ui.log_level".into(),
            detail: "bogus".into(),
        };
        assert!(err.to_string().contains("ui.log_level"));
    }

    #[test]
    fn test_strict_violation_names_first_path() {
        let err = ConflictError::StrictViolation {
            conflicts: vec![conflict("/Subject:x")],
        };
        assert_eq!(
            err.to_string(),
            "cannot merge into non-default value: '/Subject:x' (target [1], source [2])"
        );

        let err = ConflictError::StrictViolation {
            conflicts: vec![conflict("/a:x"), conflict("/a:y"), conflict("/b:z")],
        };
        assert!(err.to_string().ends_with("(and 2 more)"));
        assert_eq!(err.conflicts().len(), 3);
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ValidationError::NoModeSelected.into();
        assert!(matches!(err, CoreError::Validation(_)));

        let err: CoreError = DocumentError::FileNotFound("a.odml".into()).into();
        assert!(matches!(err, CoreError::Document(_)));
    }
}
