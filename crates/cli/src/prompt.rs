//! Terminal implementations of the workflow's picker and confirmation.
//!
//! The workflow traits answer with `None`/`false` only, so a prompt that
//! fails (closed stdin, no terminal) records the error where the wizard can
//! pick it up with [`TerminalPrompt::take_failure`].

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input};
use odmlmerge_core::{Confirmation, PathPicker, PickPurpose};
use tracing::warn;

use crate::expand_tilde;

/// Prompt state that does not fit through the workflow traits.
pub trait TerminalPrompt {
    /// Change what the next prompt asks for (e.g. "input file 1").
    fn set_label(&mut self, _label: &str) {}

    /// The error behind the last unanswered prompt, if it failed.
    fn take_failure(&mut self) -> Option<anyhow::Error>;
}

/// Asks for a path on the terminal. An empty answer cancels the pick.
pub struct TerminalPicker {
    label: String,
    failure: Option<anyhow::Error>,
}

impl TerminalPicker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failure: None,
        }
    }
}

impl TerminalPrompt for TerminalPicker {
    fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    fn take_failure(&mut self) -> Option<anyhow::Error> {
        self.failure.take()
    }
}

impl PathPicker for TerminalPicker {
    fn pick(
        &mut self,
        purpose: PickPurpose,
        required_extension: &str,
        initial_dir: Option<&Path>,
    ) -> Option<PathBuf> {
        let mut prompt = format!("{} (*{})", self.label, required_extension);
        if let Some(dir) = initial_dir {
            prompt.push_str(&format!(" [in {}]", dir.display()));
        }
        prompt.push_str(", empty to cancel");

        let start = initial_dir.map(Path::to_path_buf);
        let answer: Result<String, _> = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .validate_with(|input: &String| -> Result<(), String> {
                if input.trim().is_empty() || purpose == PickPurpose::Save {
                    return Ok(());
                }
                let path = resolve(input, start.as_deref());
                if path.is_file() {
                    Ok(())
                } else {
                    Err(format!("no such file: {}", path.display()))
                }
            })
            .interact_text();

        match answer {
            Ok(text) if !text.trim().is_empty() => Some(resolve(&text, initial_dir)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "path prompt failed");
                let context = format!("failed to read {}", self.label.to_lowercase());
                self.failure = Some(anyhow::Error::new(e).context(context));
                None
            }
        }
    }
}

/// Relative answers are taken relative to the directory the prompt showed.
fn resolve(input: &str, initial_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(expand_tilde(input.trim()));
    match initial_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

/// Yes/no question on the terminal, defaulting to "no".
#[derive(Default)]
pub struct TerminalConfirm {
    failure: Option<anyhow::Error>,
}

impl Confirmation for TerminalConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        match Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "confirmation prompt failed");
                self.failure = Some(anyhow::Error::new(e).context("failed to read confirmation"));
                false
            }
        }
    }
}

impl TerminalPrompt for TerminalConfirm {
    fn take_failure(&mut self) -> Option<anyhow::Error> {
        self.failure.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_prompt_dir() {
        assert_eq!(
            resolve(" b.odml ", Some(Path::new("/data"))),
            PathBuf::from("/data/b.odml")
        );
        assert_eq!(resolve("b.odml", None), PathBuf::from("b.odml"));
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        assert_eq!(
            resolve("/other/a.odml", Some(Path::new("/data"))),
            PathBuf::from("/other/a.odml")
        );
    }
}
