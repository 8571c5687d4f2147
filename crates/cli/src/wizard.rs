//! Interactive merge wizard.
//!
//! Walks the user through choosing two odML files, a merge mode and an
//! output file, then runs the merge. The step order and every validation
//! rule come from [`WorkflowController`]; this module only asks questions
//! and prints results.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use console::Style;
use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};

use odmlmerge_core::config::AppConfig;
use odmlmerge_core::{
    Confirmation, ExecuteOutcome, MergeMode, OdmlFileModel, OutputValidation, PathPicker, Slot,
    WorkflowController, WorkflowState,
};

use crate::conflicts::conflict_table;
use crate::opener;
use crate::prompt::{TerminalConfirm, TerminalPicker, TerminalPrompt};
use crate::style;

type Workflow = WorkflowController<OdmlFileModel>;

/// How the wizard ended.
#[derive(Debug)]
pub enum WizardEnd {
    Merged(PathBuf),
    Cancelled,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the wizard. `input1`/`input2` prefill the input choices.
///
/// The remembered paths in `config` are updated from the session on the way
/// out, whatever the result.
pub fn run_wizard(
    config: &mut AppConfig,
    input1: Option<PathBuf>,
    input2: Option<PathBuf>,
) -> Result<WizardEnd> {
    let accent = Style::new().cyan().bold();
    println!();
    println!("{}", accent.apply_to("=== odML Merge Wizard ==="));
    println!();
    println!("Merge the contents of two odML files into a new one.");
    println!("Input 1 is the base; values from input 2 are merged into it.");
    println!();

    let mut wf = WorkflowController::new(OdmlFileModel, config.path_hints());
    for (slot, input) in [(Slot::First, input1), (Slot::Second, input2)] {
        if let Some(path) = input {
            wf.set_input(slot, path.to_string_lossy().into_owned())?;
        }
    }

    let mut picker = TerminalPicker::new("File");
    let mut confirm = TerminalConfirm::default();
    let result = drive(&mut wf, config, &mut picker, &mut confirm);
    config.remember_session(wf.session());
    result
}

fn drive<P, C>(
    wf: &mut Workflow,
    config: &AppConfig,
    picker: &mut P,
    confirm: &mut C,
) -> Result<WizardEnd>
where
    P: PathPicker + TerminalPrompt,
    C: Confirmation + TerminalPrompt,
{
    loop {
        match wf.state() {
            WorkflowState::ChoosingInputs => step_inputs(wf, picker, confirm)?,
            WorkflowState::ChoosingMode => step_mode(wf, config, picker, confirm)?,
            WorkflowState::ChoosingOutput => step_output(wf, config, picker, confirm)?,
            WorkflowState::Executing => step_execute(wf, config)?,
            WorkflowState::Failed => step_recover(wf, config, picker, confirm)?,
            WorkflowState::Completed => {
                let output = PathBuf::from(wf.session().output().path());
                return Ok(WizardEnd::Merged(output));
            }
            WorkflowState::Cancelled => {
                println!("{}", style::warn("Merge cancelled. No file was written."));
                return Ok(WizardEnd::Cancelled);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn step_inputs<P, C>(wf: &mut Workflow, picker: &mut P, confirm: &mut C) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
    C: Confirmation + TerminalPrompt,
{
    println!("{}", style::header("1/3  Input files"));
    println!();

    for slot in Slot::ALL {
        if wf.session().input(slot).is_set() {
            continue;
        }
        if !browse(wf, slot, picker)? {
            return request_exit(wf, confirm);
        }
    }

    print_inputs(wf);
    wf.confirm_inputs()?;
    Ok(())
}

fn step_mode<P, C>(
    wf: &mut Workflow,
    config: &AppConfig,
    picker: &mut P,
    confirm: &mut C,
) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
    C: Confirmation + TerminalPrompt,
{
    println!("{}", style::header("2/3  Merge mode"));
    println!();

    let mut items: Vec<&str> = MODE_ITEMS.to_vec();
    items.extend(["Change input 1", "Change input 2", "Exit"]);
    let choice = Select::new()
        .with_prompt("How should values present in both files be merged?")
        .items(&items)
        .default(mode_index(wf.session().mode().unwrap_or(config.merge.default_mode)))
        .interact()
        .context("failed to read merge mode")?;

    match choice {
        0 | 1 => {
            wf.select_mode(MODES[choice])?;
            println!();
            println!("{}", style::header("3/3  Output file"));
            println!();
            choose_output(wf, picker)
        }
        2 | 3 => change_input(wf, picker, if choice == 2 { Slot::First } else { Slot::Second }),
        _ => {
            request_exit(wf, confirm)
        }
    }
}

fn step_output<P, C>(
    wf: &mut Workflow,
    config: &AppConfig,
    picker: &mut P,
    confirm: &mut C,
) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
    C: Confirmation + TerminalPrompt,
{
    let items = [
        "Choose the output file",
        "Change merge mode",
        "Change input files",
        "Exit",
    ];
    let choice = Select::new()
        .with_prompt("No valid output file yet")
        .items(&items)
        .default(0)
        .interact()
        .context("failed to read choice")?;

    match choice {
        0 => choose_output(wf, picker),
        1 => pick_mode(wf, config),
        2 => change_inputs(wf, picker),
        _ => {
            request_exit(wf, confirm)
        }
    }
}

fn step_execute(wf: &mut Workflow, config: &AppConfig) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(
            spinner_style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    let mode = wf.session().mode().unwrap_or_default();
    spinner.set_message(format!("Merging ({} mode)...", mode));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = wf.execute();
    spinner.finish_and_clear();

    match outcome? {
        ExecuteOutcome::Success { output } => {
            println!();
            println!(
                "{}",
                style::success(&format!("Merged file written to {}", output.display()))
            );
            println!();
            offer_to_open(&output, config)?;
        }
        other => print_failure(&other),
    }
    Ok(())
}

fn step_recover<P, C>(
    wf: &mut Workflow,
    config: &AppConfig,
    picker: &mut P,
    confirm: &mut C,
) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
    C: Confirmation + TerminalPrompt,
{
    let items = [
        "Retry with a different merge mode",
        "Choose a different output file",
        "Change input files",
        "Abort",
    ];
    let choice = Select::new()
        .with_prompt("The merge did not succeed. What next?")
        .items(&items)
        .default(0)
        .interact()
        .context("failed to read choice")?;

    match choice {
        // Failed keeps the last validated output, so a retry can run directly.
        0 => {
            pick_mode(wf, config)?;
            step_execute(wf, config)
        }
        1 => choose_output(wf, picker),
        2 => {
            change_inputs(wf, picker)?;
            step_execute(wf, config)
        }
        _ => {
            request_exit(wf, confirm)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const MODES: [MergeMode; 2] = [MergeMode::Strict, MergeMode::Overwrite];

const MODE_ITEMS: [&str; 2] = [
    "strict     keep existing values; refuse the merge if two values differ",
    "overwrite  values from input 2 replace those of input 1",
];

fn mode_index(mode: MergeMode) -> usize {
    MODES.iter().position(|m| *m == mode).unwrap_or(0)
}

fn input_label(slot: Slot) -> String {
    match slot {
        Slot::First => "Input file 1 (base)".into(),
        Slot::Second => "Input file 2 (merged into 1)".into(),
    }
}

fn pick_mode(wf: &mut Workflow, config: &AppConfig) -> Result<()> {
    let current = wf.session().mode().unwrap_or(config.merge.default_mode);
    let choice = Select::new()
        .with_prompt("Merge mode")
        .items(&MODE_ITEMS)
        .default(mode_index(current))
        .interact()
        .context("failed to read merge mode")?;
    wf.select_mode(MODES[choice])?;
    println!("Merge mode: {}", style::mode(MODES[choice]));
    Ok(())
}

/// Let the user pick the file for `slot`. `Ok(false)` means the pick was
/// cancelled; a failed prompt is an error.
fn browse<P>(wf: &mut Workflow, slot: Slot, picker: &mut P) -> Result<bool>
where
    P: PathPicker + TerminalPrompt,
{
    picker.set_label(&input_label(slot));
    let chosen = wf.browse_input(slot, picker)?;
    match picker.take_failure() {
        Some(e) => Err(e),
        None => Ok(chosen),
    }
}

/// Ask whether to quit; `Cancelled` follows a "yes", anything else keeps the
/// current state.
fn request_exit<C>(wf: &mut Workflow, confirm: &mut C) -> Result<()>
where
    C: Confirmation + TerminalPrompt,
{
    wf.request_exit(confirm);
    match confirm.take_failure() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn change_input<P>(wf: &mut Workflow, picker: &mut P, slot: Slot) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
{
    if !browse(wf, slot, picker)? {
        println!("{}", style::dim("Kept the previous file."));
    }
    print_inputs(wf);
    Ok(())
}

fn change_inputs<P>(wf: &mut Workflow, picker: &mut P) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
{
    for slot in Slot::ALL {
        browse(wf, slot, picker)?;
    }
    print_inputs(wf);
    Ok(())
}

fn choose_output<P>(wf: &mut Workflow, picker: &mut P) -> Result<()>
where
    P: PathPicker + TerminalPrompt,
{
    picker.set_label("Output file");
    let check = wf.choose_output(picker)?;
    if let Some(e) = picker.take_failure() {
        return Err(e);
    }
    if let Some(message) = output_problem(&check) {
        println!("{}", style::warn(&message));
        println!();
    }
    Ok(())
}

fn print_inputs(wf: &Workflow) {
    println!();
    for slot in Slot::ALL {
        let input = wf.session().input(slot);
        let path = if input.is_set() { input.path() } else { "(none)" };
        println!("  Input {}: {}", slot, path);
    }
    println!();
}

/// Explanation for a rejected output choice.
fn output_problem(check: &OutputValidation) -> Option<String> {
    match check {
        OutputValidation::Ok => None,
        OutputValidation::EmptyPath => Some(
            "No output file selected. You need to select an output odML file to save your data."
                .into(),
        ),
        other => other.to_error().map(|e| capitalize(&e.to_string())),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_failure(outcome: &ExecuteOutcome) {
    println!();
    match outcome {
        ExecuteOutcome::MergeConflict(err) => {
            println!(
                "{}",
                style::error(
                    "Can not merge into non-default values in merge mode \"strict\". \
                     Data could be lost in the process."
                )
            );
            println!();
            println!("{}", conflict_table(err.conflicts()));
            println!();
            println!(
                "{}",
                style::dim("Fix your odML files or change to merge mode \"overwrite\".")
            );
        }
        ExecuteOutcome::UnexpectedFailure(detail) => {
            println!("{}", style::error(&format!("Unexpected error: {}", detail)));
        }
        ExecuteOutcome::Success { .. } => {}
    }
    println!();
}

fn offer_to_open(output: &std::path::Path, config: &AppConfig) -> Result<()> {
    let open = Confirm::new()
        .with_prompt("Open the merged file?")
        .default(config.ui.open_after_save)
        .interact()
        .context("failed to read confirmation")?;
    if open {
        if let Err(e) = opener::open_file(output) {
            println!("{}", style::warn(&format!("{:#}", e)));
        }
    }
    Ok(())
}
