//! Merge workflow state machine.
//!
//! The [`WorkflowController`] walks a [`MergeSession`] through a fixed
//! sequence of user decisions:
//!
//! ```text
//! ChoosingInputs -> ChoosingMode -> ChoosingOutput -> Executing -> Completed
//!                                        ^                |
//!                                        +---- Failed <---+
//! ```
//!
//! Any state before `Completed` may move to `Cancelled` once the user
//! confirms leaving without a saved file. Path selection and confirmation are
//! delegated to [`PathPicker`] and [`Confirmation`] so the whole workflow runs
//! without any user interface attached.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::conflict::MergeMode;
use crate::document::DocumentModel;
use crate::errors::ValidationError;
use crate::session::{ExecuteOutcome, MergeSession, OutputValidation, Slot, EXPECTED_EXTENSION};

/// Question asked before abandoning a workflow without a saved file.
pub const UNSAVED_EXIT_PROMPT: &str =
    "Are you sure you want to exit the program without saving your file?";

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Step the workflow is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    ChoosingInputs,
    ChoosingMode,
    ChoosingOutput,
    Executing,
    Completed,
    /// The last merge attempt failed. Behaves like `ChoosingOutput`: mode,
    /// inputs and output may be changed and the merge retried.
    Failed,
    Cancelled,
}

impl WorkflowState {
    /// `Completed` and `Cancelled` end the workflow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChoosingInputs => write!(f, "choosing inputs"),
            Self::ChoosingMode => write!(f, "choosing the merge mode"),
            Self::ChoosingOutput => write!(f, "choosing the output"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Why a path is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickPurpose {
    Open,
    Save,
}

/// Lets the user choose a file path.
pub trait PathPicker {
    /// Returns the chosen path, or `None` when the user cancelled.
    fn pick(
        &mut self,
        purpose: PickPurpose,
        required_extension: &str,
        initial_dir: Option<&Path>,
    ) -> Option<PathBuf>;
}

/// Asks the user a yes/no question.
pub trait Confirmation {
    fn confirm(&mut self, message: &str) -> bool;
}

/// Advisory starting points for path pickers, typically from the
/// persisted configuration. Never needed for correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHints {
    pub last_input: Option<PathBuf>,
    pub last_output: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives a [`MergeSession`] through the workflow states.
pub struct WorkflowController<M: DocumentModel> {
    session: MergeSession,
    state: WorkflowState,
    model: M,
    hints: PathHints,
}

impl<M: DocumentModel> WorkflowController<M> {
    pub fn new(model: M, hints: PathHints) -> Self {
        info!("starting merge workflow");
        Self {
            session: MergeSession::new(),
            state: WorkflowState::ChoosingInputs,
            model,
            hints,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn session(&self) -> &MergeSession {
        &self.session
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Record an input path directly (e.g. from the command line).
    pub fn set_input(&mut self, slot: Slot, path: impl Into<String>) -> Result<(), ValidationError> {
        self.require(
            &[
                WorkflowState::ChoosingInputs,
                WorkflowState::ChoosingMode,
                WorkflowState::ChoosingOutput,
                WorkflowState::Failed,
            ],
            "change an input",
        )?;
        self.session.set_input(slot, path)
    }

    /// Ask `picker` for an input file. Returns `false` when the user
    /// cancelled; the previous choice for `slot` is then kept.
    pub fn browse_input(
        &mut self,
        slot: Slot,
        picker: &mut dyn PathPicker,
    ) -> Result<bool, ValidationError> {
        self.require(
            &[
                WorkflowState::ChoosingInputs,
                WorkflowState::ChoosingMode,
                WorkflowState::ChoosingOutput,
                WorkflowState::Failed,
            ],
            "change an input",
        )?;

        let initial_dir = self.input_start_dir(slot);
        match picker.pick(PickPurpose::Open, EXPECTED_EXTENSION, initial_dir.as_deref()) {
            Some(path) if !path.as_os_str().is_empty() => {
                self.session.set_input(slot, path.to_string_lossy().into_owned())?;
                Ok(true)
            }
            _ => {
                debug!(%slot, "input selection cancelled");
                Ok(false)
            }
        }
    }

    /// Leave `ChoosingInputs` once both inputs are chosen.
    pub fn confirm_inputs(&mut self) -> Result<(), ValidationError> {
        self.require(&[WorkflowState::ChoosingInputs], "confirm the inputs")?;
        if let Some(slot) = self.session.missing_input() {
            return Err(ValidationError::MissingInput(slot));
        }
        self.transition(WorkflowState::ChoosingMode);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mode
    // -----------------------------------------------------------------------

    /// Select the merge mode. Allowed in every non-terminal state except
    /// while executing.
    pub fn select_mode(&mut self, mode: MergeMode) -> Result<(), ValidationError> {
        if self.state.is_terminal() || self.state == WorkflowState::Executing {
            return Err(ValidationError::InvalidStep {
                state: self.state,
                step: "change the merge mode",
            });
        }
        self.session.set_mode(mode);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Ask `picker` for the output file and validate it.
    ///
    /// From `ChoosingMode` this first checks that a mode is selected and
    /// enters `ChoosingOutput`. On [`OutputValidation::Ok`] the workflow moves
    /// to `Executing`; otherwise it stays in `ChoosingOutput` and the result
    /// explains why.
    pub fn choose_output(
        &mut self,
        picker: &mut dyn PathPicker,
    ) -> Result<OutputValidation, ValidationError> {
        self.enter_output_selection()?;
        let initial_dir = self.output_start_dir();
        let path = picker
            .pick(PickPurpose::Save, EXPECTED_EXTENSION, initial_dir.as_deref())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.apply_output(path))
    }

    /// Like [`Self::choose_output`] with an already known path.
    pub fn submit_output(&mut self, path: impl Into<String>) -> Result<OutputValidation, ValidationError> {
        self.enter_output_selection()?;
        Ok(self.apply_output(path.into()))
    }

    fn enter_output_selection(&mut self) -> Result<(), ValidationError> {
        match self.state {
            WorkflowState::ChoosingMode => {
                if self.session.mode().is_none() {
                    return Err(ValidationError::NoModeSelected);
                }
                if let Some(slot) = self.session.missing_input() {
                    return Err(ValidationError::MissingInput(slot));
                }
                self.transition(WorkflowState::ChoosingOutput);
                Ok(())
            }
            WorkflowState::ChoosingOutput | WorkflowState::Failed => {
                if let Some(slot) = self.session.missing_input() {
                    return Err(ValidationError::MissingInput(slot));
                }
                Ok(())
            }
            state => Err(ValidationError::InvalidStep {
                state,
                step: "choose the output file",
            }),
        }
    }

    fn apply_output(&mut self, path: String) -> OutputValidation {
        let check = self.session.set_output(path);
        if check.is_ok() {
            self.transition(WorkflowState::Executing);
        } else if self.state != WorkflowState::ChoosingOutput {
            self.transition(WorkflowState::ChoosingOutput);
        }
        check
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the merge. Allowed in `Executing`, and in `Failed` to retry with
    /// the last validated output.
    pub fn execute(&mut self) -> Result<ExecuteOutcome, ValidationError> {
        self.require(&[WorkflowState::Executing, WorkflowState::Failed], "execute the merge")?;

        let outcome = self.session.execute(&self.model)?;
        if outcome.is_success() {
            self.transition(WorkflowState::Completed);
        } else {
            self.transition(WorkflowState::Failed);
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Leaving
    // -----------------------------------------------------------------------

    /// Ask to leave the workflow. Returns `true` when the workflow has ended.
    ///
    /// Without a saved file the user must confirm first; declining leaves
    /// every piece of state as it was.
    pub fn request_exit(&mut self, confirmation: &mut dyn Confirmation) -> bool {
        if self.state.is_terminal() || self.session.is_complete() {
            return true;
        }
        if confirmation.confirm(UNSAVED_EXIT_PROMPT) {
            self.transition(WorkflowState::Cancelled);
            true
        } else {
            debug!(state = %self.state, "exit declined");
            false
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require(&self, allowed: &[WorkflowState], step: &'static str) -> Result<(), ValidationError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ValidationError::InvalidStep {
                state: self.state,
                step,
            })
        }
    }

    fn transition(&mut self, to: WorkflowState) {
        info!(from = %self.state, to = %to, "workflow transition");
        self.state = to;
    }

    fn input_start_dir(&self, slot: Slot) -> Option<PathBuf> {
        let other = self.session.input(slot.other());
        let own = self.session.input(slot);
        [other, own]
            .iter()
            .find(|input| input.is_set())
            .and_then(|input| parent_dir(Path::new(input.path())))
            .or_else(|| self.hints.last_input.as_deref().and_then(parent_dir))
    }

    fn output_start_dir(&self) -> Option<PathBuf> {
        let first = self.session.input(Slot::First);
        Some(first)
            .filter(|input| input.is_set())
            .and_then(|input| parent_dir(Path::new(input.path())))
            .or_else(|| self.hints.last_output.as_deref().and_then(parent_dir))
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
