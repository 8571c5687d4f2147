//! Non-interactive merge command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use odmlmerge_core::config::AppConfig;
use odmlmerge_core::{ExecuteOutcome, MergeMode, OdmlFileModel, Slot, WorkflowController};

use crate::conflicts::conflict_table;
use crate::style;

/// Merge `input2` into `input1` and write the result to `output`.
///
/// Runs through the same workflow as the wizard, so the output path is
/// validated the same way. A refused strict merge is an error.
pub fn run_merge(
    config: &mut AppConfig,
    input1: &Path,
    input2: &Path,
    mode: Option<MergeMode>,
    output: &Path,
) -> Result<PathBuf> {
    let mode = mode.unwrap_or(config.merge.default_mode);
    let mut wf = WorkflowController::new(OdmlFileModel, config.path_hints());

    wf.set_input(Slot::First, input1.to_string_lossy().into_owned())?;
    wf.set_input(Slot::Second, input2.to_string_lossy().into_owned())?;
    wf.confirm_inputs()?;
    wf.select_mode(mode)?;

    let check = wf.submit_output(output.to_string_lossy().into_owned())?;
    if let Some(err) = check.to_error() {
        return Err(err).context("invalid output file");
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(format!("Merging ({} mode)...", mode));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = wf.execute();
    spinner.finish_and_clear();
    config.remember_session(wf.session());

    match outcome? {
        ExecuteOutcome::Success { output } => {
            println!(
                "{}",
                style::success(&format!(
                    "Merged {} into {} ({} mode): {}",
                    input2.display(),
                    input1.display(),
                    style::mode(mode),
                    output.display()
                ))
            );
            Ok(output)
        }
        ExecuteOutcome::MergeConflict(err) => {
            eprintln!();
            eprintln!("{}", conflict_table(err.conflicts()));
            eprintln!();
            Err(err).context("merge refused; rerun with --mode overwrite to take the values of input 2")
        }
        ExecuteOutcome::UnexpectedFailure(detail) => {
            anyhow::bail!("merge failed: {}", detail)
        }
    }
}
