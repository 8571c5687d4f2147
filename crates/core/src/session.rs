//! Merge session: the plain data a merge workflow collects, plus the
//! validation rules that gate each step.
//!
//! A [`MergeSession`] owns two [`SourceReference`]s, an optional
//! [`MergeMode`], an [`OutputTarget`] and a completion flag. It knows nothing
//! about prompts or dialogs; the [`crate::workflow::WorkflowController`]
//! decides when each operation is reachable.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::conflict::MergeMode;
use crate::document::DocumentModel;
use crate::errors::{ConflictError, CoreError, ValidationError};
use crate::workflow::WorkflowState;

/// Extension every merged output file must carry (or omit entirely).
pub const EXPECTED_EXTENSION: &str = ".odml";

// ---------------------------------------------------------------------------
// Slots and references
// ---------------------------------------------------------------------------

/// Which of the two required inputs a reference designates.
///
/// The first input is the merge target, the second the source whose values
/// are merged into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::First, Slot::Second];

    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The other input.
    pub fn other(self) -> Slot {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index() + 1)
    }
}

/// Handle to one input document. An empty path means "not chosen yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    slot: Slot,
    path: String,
}

impl SourceReference {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            path: String::new(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Where the merged document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    path: String,
    expected_extension: &'static str,
}

impl OutputTarget {
    fn new() -> Self {
        Self {
            path: String::new(),
            expected_extension: EXPECTED_EXTENSION,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn expected_extension(&self) -> &'static str {
        self.expected_extension
    }

    pub fn is_set(&self) -> bool {
        !self.path.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of proposing an output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValidation {
    /// The path is acceptable and recorded.
    Ok,
    /// No path was chosen (the user cancelled the picker).
    EmptyPath,
    /// The path carries an extension other than the expected one.
    WrongExtension { found: String },
}

impl OutputValidation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The validation error explaining a rejected path, if any.
    pub fn to_error(&self) -> Option<ValidationError> {
        match self {
            Self::Ok => None,
            Self::EmptyPath => Some(ValidationError::EmptyOutputPath),
            Self::WrongExtension { found } => Some(ValidationError::WrongExtension {
                expected: EXPECTED_EXTENSION.to_string(),
                found: found.clone(),
            }),
        }
    }
}

/// Result of one merge attempt.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// Both inputs merged and the result written to `output`.
    Success { output: PathBuf },
    /// Strict mode refused to replace non-default values; nothing written.
    MergeConflict(ConflictError),
    /// Loading, merging or saving failed for another reason; nothing written.
    UnexpectedFailure(String),
}

impl ExecuteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State collected over one merge workflow.
#[derive(Debug, Clone)]
pub struct MergeSession {
    inputs: [SourceReference; 2],
    mode: Option<MergeMode>,
    output: OutputTarget,
    output_check: Option<OutputValidation>,
    completed: bool,
}

impl Default for MergeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeSession {
    /// A session with nothing chosen yet.
    pub fn new() -> Self {
        Self {
            inputs: [SourceReference::new(Slot::First), SourceReference::new(Slot::Second)],
            mode: None,
            output: OutputTarget::new(),
            output_check: None,
            completed: false,
        }
    }

    pub fn input(&self, slot: Slot) -> &SourceReference {
        &self.inputs[slot.index()]
    }

    pub fn mode(&self) -> Option<MergeMode> {
        self.mode
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    /// Result of the most recent [`Self::set_output`] call.
    pub fn output_check(&self) -> Option<&OutputValidation> {
        self.output_check.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Record the path of an input. Any non-empty string is accepted; the
    /// file itself is only checked when it is loaded.
    pub fn set_input(&mut self, slot: Slot, path: impl Into<String>) -> Result<(), ValidationError> {
        self.ensure_not_complete("change an input")?;

        let path = path.into();
        if path.is_empty() {
            return Err(ValidationError::EmptyInputPath(slot));
        }
        debug!(%slot, path = %path, "input selected");
        self.inputs[slot.index()].path = path;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: MergeMode) {
        debug!(%mode, "merge mode selected");
        self.mode = Some(mode);
    }

    /// The first input that has not been chosen, if any.
    pub fn missing_input(&self) -> Option<Slot> {
        self.inputs.iter().find(|i| !i.is_set()).map(|i| i.slot())
    }

    /// Both inputs chosen and a mode selected.
    pub fn ready_for_output_selection(&self) -> bool {
        self.missing_input().is_none() && self.mode.is_some()
    }

    /// Propose the output path.
    ///
    /// A rejected path does not clear a previously accepted one, but it does
    /// block [`Self::execute`] until an acceptable path is proposed.
    pub fn set_output(&mut self, path: impl Into<String>) -> OutputValidation {
        let path = path.into();
        let check = if path.is_empty() {
            OutputValidation::EmptyPath
        } else {
            match extension_of(&path) {
                ext if ext.is_empty() || ext == self.output.expected_extension => {
                    self.output.path = path;
                    OutputValidation::Ok
                }
                found => OutputValidation::WrongExtension { found },
            }
        };

        if !check.is_ok() {
            warn!(?check, "output path rejected");
        }
        self.output_check = Some(check.clone());
        check
    }

    /// Load both inputs, merge the second into the first, and save.
    ///
    /// Fails with a [`ValidationError`] (and touches nothing) unless both
    /// inputs are set, a mode is selected and the most recent
    /// [`Self::set_output`] returned [`OutputValidation::Ok`].
    pub fn execute(&mut self, model: &dyn DocumentModel) -> Result<ExecuteOutcome, ValidationError> {
        self.ensure_not_complete("merge again")?;
        if let Some(slot) = self.missing_input() {
            return Err(ValidationError::MissingInput(slot));
        }
        let mode = self.mode.ok_or(ValidationError::NoModeSelected)?;
        if self.output_check != Some(OutputValidation::Ok) {
            return Err(ValidationError::OutputNotValidated);
        }

        let output = PathBuf::from(&self.output.path);
        info!(
            target = %self.input(Slot::First).path,
            source = %self.input(Slot::Second).path,
            output = %output.display(),
            %mode,
            "executing merge"
        );

        let outcome = match self.run(model, mode, &output) {
            Ok(output) => ExecuteOutcome::Success { output },
            Err(CoreError::Conflict(e)) => ExecuteOutcome::MergeConflict(e),
            Err(e) => ExecuteOutcome::UnexpectedFailure(e.to_string()),
        };
        match &outcome {
            ExecuteOutcome::Success { .. } => {
                self.completed = true;
                info!(output = %output.display(), "merge complete");
            }
            ExecuteOutcome::MergeConflict(e) => warn!(error = %e, "merge refused"),
            ExecuteOutcome::UnexpectedFailure(detail) => warn!(%detail, "merge failed"),
        }
        Ok(outcome)
    }

    fn run(
        &self,
        model: &dyn DocumentModel,
        mode: MergeMode,
        output: &Path,
    ) -> Result<PathBuf, CoreError> {
        let target = model.load(Path::new(self.input(Slot::First).path()))?;
        let source = model.load(Path::new(self.input(Slot::Second).path()))?;
        let merged = model.merge(target, &source, mode)?;
        model.save(&merged, output)?;
        Ok(output.to_path_buf())
    }

    fn ensure_not_complete(&self, step: &'static str) -> Result<(), ValidationError> {
        if self.completed {
            return Err(ValidationError::InvalidStep {
                state: WorkflowState::Completed,
                step,
            });
        }
        Ok(())
    }
}

/// The extension of `path` including its dot, or `""` when it has none.
/// A trailing dot counts as the extension `"."`.
fn extension_of(path: &str) -> String {
    match Path::new(path).extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use crate::conflict::Merger;
    use crate::document::{Document, Dtype, Property, Section};
    use crate::errors::DocumentError;

    /// In-memory model: documents keyed by path, saves recorded.
    #[derive(Default)]
    struct MemoryModel {
        docs: HashMap<PathBuf, Document>,
        saved: RefCell<HashMap<PathBuf, Document>>,
        fail_save: bool,
    }

    impl MemoryModel {
        fn with(mut self, path: &str, x: &str) -> Self {
            let doc = Document::new()
                .with_section(Section::new("S").with_property(Property::new("x", Dtype::Int, [x])));
            self.docs.insert(PathBuf::from(path), doc);
            self
        }
    }

    impl DocumentModel for MemoryModel {
        fn load(&self, path: &Path) -> Result<Document, DocumentError> {
            self.docs
                .get(path)
                .cloned()
                .ok_or_else(|| DocumentError::FileNotFound(path.display().to_string()))
        }

        fn merge(&self, target: Document, source: &Document, mode: MergeMode) -> Result<Document, ConflictError> {
            Merger::merge(&target, source, mode)
        }

        fn save(&self, document: &Document, path: &Path) -> Result<(), DocumentError> {
            if self.fail_save {
                return Err(DocumentError::WriteError {
                    path: path.display().to_string(),
                    detail: "disk full".into(),
                });
            }
            self.saved.borrow_mut().insert(path.to_path_buf(), document.clone());
            Ok(())
        }
    }

    fn ready_session(mode: MergeMode) -> MergeSession {
        let mut session = MergeSession::new();
        session.set_input(Slot::First, "a.odml").unwrap();
        session.set_input(Slot::Second, "b.odml").unwrap();
        session.set_mode(mode);
        assert_eq!(session.set_output("out.odml"), OutputValidation::Ok);
        session
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = MergeSession::new();
        assert!(!session.input(Slot::First).is_set());
        assert!(!session.input(Slot::Second).is_set());
        assert_eq!(session.mode(), None);
        assert!(!session.output().is_set());
        assert_eq!(session.output().expected_extension(), ".odml");
        assert!(!session.is_complete());
    }

    #[test]
    fn test_set_input_rejects_empty_path() {
        let mut session = MergeSession::new();
        assert_eq!(
            session.set_input(Slot::Second, ""),
            Err(ValidationError::EmptyInputPath(Slot::Second))
        );
        // Any non-empty string is accepted, whatever its extension.
        assert!(session.set_input(Slot::Second, "notes.txt").is_ok());
        assert_eq!(session.input(Slot::Second).path(), "notes.txt");
    }

    #[test]
    fn test_ready_for_output_selection() {
        let mut session = MergeSession::new();
        assert!(!session.ready_for_output_selection());
        session.set_input(Slot::First, "a.odml").unwrap();
        session.set_mode(MergeMode::Strict);
        assert!(!session.ready_for_output_selection());
        assert_eq!(session.missing_input(), Some(Slot::Second));
        session.set_input(Slot::Second, "b.odml").unwrap();
        assert!(session.ready_for_output_selection());
    }

    #[test]
    fn test_output_extension_rules() {
        let mut session = MergeSession::new();
        assert_eq!(session.set_output("out.odml"), OutputValidation::Ok);
        assert_eq!(session.set_output("dir/out"), OutputValidation::Ok);
        assert_eq!(session.set_output("dir.v2/out"), OutputValidation::Ok);
        assert_eq!(session.set_output(""), OutputValidation::EmptyPath);
        for (path, found) in [
            ("out.csv", ".csv"),
            ("out.xls", ".xls"),
            ("out.ODML", ".ODML"),
            ("out.odml.bak", ".bak"),
            ("out.", "."),
        ] {
            assert_eq!(
                session.set_output(path),
                OutputValidation::WrongExtension { found: found.into() },
                "path {}",
                path
            );
        }
    }

    #[test]
    fn test_wrong_extension_keeps_previous_path_but_blocks_execute() {
        let mut session = ready_session(MergeMode::Overwrite);
        let check = session.set_output("out.csv");
        assert_eq!(
            check.to_error(),
            Some(ValidationError::WrongExtension {
                expected: ".odml".into(),
                found: ".csv".into()
            })
        );
        assert_eq!(session.output().path(), "out.odml");

        let model = MemoryModel::default().with("a.odml", "1").with("b.odml", "2");
        assert!(matches!(
            session.execute(&model),
            Err(ValidationError::OutputNotValidated)
        ));
        assert!(model.saved.borrow().is_empty());
    }

    #[test]
    fn test_execute_requires_every_step() {
        let model = MemoryModel::default().with("a.odml", "1").with("b.odml", "2");

        let mut session = MergeSession::new();
        assert_eq!(session.execute(&model).unwrap_err(), ValidationError::MissingInput(Slot::First));

        session.set_input(Slot::First, "a.odml").unwrap();
        session.set_input(Slot::Second, "b.odml").unwrap();
        assert_eq!(session.execute(&model).unwrap_err(), ValidationError::NoModeSelected);

        session.set_mode(MergeMode::Overwrite);
        assert_eq!(session.execute(&model).unwrap_err(), ValidationError::OutputNotValidated);

        session.set_output("");
        assert_eq!(session.execute(&model).unwrap_err(), ValidationError::OutputNotValidated);
        assert!(model.saved.borrow().is_empty());
    }

    #[test]
    fn test_execute_success_completes_session() {
        let model = MemoryModel::default().with("a.odml", "1").with("b.odml", "2");
        let mut session = ready_session(MergeMode::Overwrite);

        let outcome = session.execute(&model).unwrap();
        assert!(outcome.is_success());
        assert!(session.is_complete());

        let saved = model.saved.borrow();
        let merged = &saved[Path::new("out.odml")];
        assert_eq!(merged.property_at("/S:x").unwrap().values, vec!["2"]);

        drop(saved);
        assert!(matches!(
            session.set_input(Slot::First, "c.odml"),
            Err(ValidationError::InvalidStep { .. })
        ));
    }

    #[test]
    fn test_conflict_leaves_session_retryable() {
        let model = MemoryModel::default().with("a.odml", "1").with("b.odml", "2");
        let mut session = ready_session(MergeMode::Strict);

        let outcome = session.execute(&model).unwrap();
        assert!(matches!(outcome, ExecuteOutcome::MergeConflict(_)));
        assert!(!session.is_complete());
        assert_eq!(session.output().path(), "out.odml");
        assert!(model.saved.borrow().is_empty());

        // Switch mode and retry without choosing the output again.
        session.set_mode(MergeMode::Overwrite);
        assert!(session.execute(&model).unwrap().is_success());
    }

    #[test]
    fn test_load_and_save_failures_are_unexpected() {
        let model = MemoryModel::default().with("a.odml", "1");
        let mut session = ready_session(MergeMode::Strict);
        match session.execute(&model).unwrap() {
            ExecuteOutcome::UnexpectedFailure(detail) => assert!(detail.contains("b.odml")),
            other => panic!("expected failure, got {:?}", other),
        }

        let model = MemoryModel {
            fail_save: true,
            ..MemoryModel::default().with("a.odml", "1").with("b.odml", "2")
        };
        let mut session = ready_session(MergeMode::Overwrite);
        match session.execute(&model).unwrap() {
            ExecuteOutcome::UnexpectedFailure(detail) => assert!(detail.contains("disk full")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!session.is_complete());
    }
}
