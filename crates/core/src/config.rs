//! TOML-based configuration for odmlmerge.
//!
//! Everything in the file is optional. A missing file yields the defaults,
//! so the tool works without any setup; the file mainly remembers where the
//! last inputs and output lived so the next session starts there.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::MergeMode;
use crate::errors::ConfigError;
use crate::session::{MergeSession, Slot};
use crate::workflow::PathHints;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub merge: MergeConfig,

    /// Paths remembered from the previous session.
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ui: UiConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Merge behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Mode preselected by the wizard and used by `merge` without `--mode`.
    #[serde(default)]
    pub default_mode: MergeMode,
}

/// Last used locations, only ever used as picker starting points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_input: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<PathBuf>,
}

/// Terminal behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Offer to open the merged file once it is written.
    #[serde(default)]
    pub open_after_save: bool,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            open_after_save: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading / saving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// `<config dir>/odmlmerge/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("odmlmerge").join("config.toml"))
    }

    /// Load and parse a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Like [`Self::load_from_file`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p, "no configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.ui.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ui.log_level".into(),
                detail: format!(
                    "'{}' is not one of {}",
                    self.ui.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Write the configuration, creating parent directories.
    ///
    /// An existing file keeps its layout and comments; only the `[paths]`
    /// keys are rewritten. A new file gets the commented layout of
    /// [`Self::to_commented_toml`].
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = if path.exists() {
            let existing = std::fs::read_to_string(path)?;
            let patched = self.patch_paths(&existing);
            match toml::from_str::<AppConfig>(&patched) {
                Ok(reread) if reread == *self => patched,
                _ => {
                    warn!(path = %path.display(), "could not update configuration in place, rewriting it");
                    self.to_commented_toml()
                }
            }
        } else {
            self.to_commented_toml()
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;

        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// The configuration as TOML with every option explained.
    pub fn to_commented_toml(&self) -> String {
        let path_line = |key: &str, value: &Option<PathBuf>, example: &str| match value {
            Some(p) => format!("{} = {}", key, toml_string(&p.to_string_lossy())),
            None => format!("# {} = \"{}\"", key, example),
        };

        format!(
            r#"# odmlmerge configuration

[merge]
# Mode preselected by the wizard and used by `odmlmerge merge` without --mode:
# "strict" refuses to replace existing values, "overwrite" takes the values
# of the second input.
default_mode = {mode}

[paths]
# Updated automatically; used as starting directories for file prompts.
{last_input}
{last_output}

[ui]
# Minimum log level: trace, debug, info, warn, error.
# RUST_LOG overrides this when set.
log_level = {log_level}

# Preselect "yes" when the wizard offers to open the merged file.
open_after_save = {open_after_save}
"#,
            mode = toml_string(&self.merge.default_mode.to_string()),
            last_input = path_line("last_input", &self.paths.last_input, "/path/to/input.odml"),
            last_output = path_line("last_output", &self.paths.last_output, "/path/to/merged.odml"),
            log_level = toml_string(&self.ui.log_level),
            open_after_save = self.ui.open_after_save,
        )
    }

    /// `contents` with the `[paths]` keys set from `self` and every other
    /// line left as written.
    fn patch_paths(&self, contents: &str) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut in_paths = false;
        let mut seen_paths = false;

        for line in contents.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('[') {
                if in_paths {
                    self.push_path_lines(&mut lines);
                }
                in_paths = trimmed.starts_with("[paths]");
                seen_paths |= in_paths;
            } else if in_paths && is_path_key(trimmed) {
                continue;
            }
            lines.push(line.to_string());
        }

        if in_paths {
            self.push_path_lines(&mut lines);
        } else if !seen_paths {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push("[paths]".into());
            self.push_path_lines(&mut lines);
        }

        let mut patched = lines.join("\n");
        patched.push('\n');
        patched
    }

    /// Append the remembered paths at the end of the current table, before
    /// its trailing blank lines.
    fn push_path_lines(&self, lines: &mut Vec<String>) {
        let mut blanks = 0;
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
            blanks += 1;
        }
        for (key, value) in [
            ("last_input", &self.paths.last_input),
            ("last_output", &self.paths.last_output),
        ] {
            if let Some(path) = value {
                lines.push(format!("{} = {}", key, toml_string(&path.to_string_lossy())));
            }
        }
        lines.extend(std::iter::repeat(String::new()).take(blanks));
    }

    /// Picker starting points derived from the remembered paths.
    pub fn path_hints(&self) -> PathHints {
        PathHints {
            last_input: self.paths.last_input.clone(),
            last_output: self.paths.last_output.clone(),
        }
    }

    /// Remember the locations used by `session`. Unset paths leave the
    /// previous values alone.
    pub fn remember_session(&mut self, session: &MergeSession) {
        let input = session.input(Slot::First);
        if input.is_set() {
            self.paths.last_input = Some(PathBuf::from(input.path()));
        }
        if session.output().is_set() {
            self.paths.last_output = Some(PathBuf::from(session.output().path()));
        }
    }
}

fn is_path_key(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| matches!(key.trim(), "last_input" | "last_output"))
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
