//! odmlmerge command-line tool.
//!
//! Merges two odML metadata files into a new one, either through an
//! interactive wizard or in a single non-interactive command, and previews
//! the conflicts a strict merge would refuse.

mod conflicts;
mod merge;
mod opener;
mod prompt;
mod style;
mod wizard;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use odmlmerge_core::config::AppConfig;
use odmlmerge_core::MergeMode;

use crate::wizard::WizardEnd;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Merge two odML metadata files.
#[derive(Parser, Debug)]
#[command(
    name = "odmlmerge",
    version,
    about = "Merge the contents of two odML metadata files into a new one"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// [default: <config dir>/odmlmerge/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive, step-by-step merge.
    Wizard {
        /// Base file (prefills input 1).
        input1: Option<PathBuf>,
        /// File merged into the base (prefills input 2).
        input2: Option<PathBuf>,
    },

    /// Merge INPUT2 into INPUT1 without prompting.
    Merge {
        input1: PathBuf,
        input2: PathBuf,

        /// Merge mode: strict or overwrite [default: from config, else strict].
        #[arg(short, long)]
        mode: Option<MergeMode>,

        /// Output file; must end in .odml or have no extension.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the values a strict merge of INPUT2 into INPUT1 would refuse.
    Conflicts { input1: PathBuf, input2: PathBuf },

    /// Write a commented default configuration file.
    InitConfig {
        /// Output path [default: the --config path].
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    // The config decides the default log level, so it is read first and any
    // error is reported once logging is up.
    let loaded = match &config_path {
        Some(path) if !matches!(cli.command, Commands::InitConfig { .. }) => {
            AppConfig::load_or_default(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))
                .and_then(|c| {
                    c.validate().context("invalid configuration")?;
                    Ok(c)
                })
        }
        _ => Ok(AppConfig::default()),
    };

    let level = match (&loaded, cli.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.ui.log_level.to_ascii_lowercase(),
        (Err(_), false) => "warn".to_string(),
    };
    init_logging(&level);

    let result = loaded.and_then(|config| run(cli.command, config, config_path.as_deref()));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(command: Commands, mut config: AppConfig, config_path: Option<&Path>) -> Result<()> {
    let loaded = config.clone();
    match command {
        Commands::Wizard { input1, input2 } => {
            let input1 = input1.map(|p| PathBuf::from(expand_tilde(&p.to_string_lossy())));
            let input2 = input2.map(|p| PathBuf::from(expand_tilde(&p.to_string_lossy())));
            let end = wizard::run_wizard(&mut config, input1, input2);
            store_config(&config, &loaded, config_path);
            match end? {
                WizardEnd::Merged(output) => {
                    debug!(output = %output.display(), "wizard finished with a merged file")
                }
                WizardEnd::Cancelled => debug!("wizard cancelled"),
            }
            Ok(())
        }
        Commands::Merge {
            input1,
            input2,
            mode,
            output,
        } => {
            let result = merge::run_merge(
                &mut config,
                &expand_path(&input1),
                &expand_path(&input2),
                mode,
                &expand_path(&output),
            );
            store_config(&config, &loaded, config_path);
            result.map(|_| ())
        }
        Commands::Conflicts { input1, input2 } => {
            conflicts::run_preview(&expand_path(&input1), &expand_path(&input2))
        }
        Commands::InitConfig { output } => {
            let path = output
                .map(|p| expand_path(&p))
                .or_else(|| config_path.map(Path::to_path_buf))
                .context("no configuration directory on this platform; pass --output")?;
            cmd_init_config(&path)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(expand_path(path)),
        None => AppConfig::default_path(),
    }
}

/// Save the remembered paths if they changed since `loaded`. Failing to do
/// so never fails the command.
fn store_config(config: &AppConfig, loaded: &AppConfig, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if config.paths == loaded.paths {
        debug!("remembered paths unchanged, configuration not written");
        return;
    }
    if let Err(e) = config.save_to_file(path) {
        warn!(path = %path.display(), error = %e, "could not save configuration");
    }
}

/// Expand `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_tilde(&path.to_string_lossy()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init_config(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    std::fs::write(output, AppConfig::default().to_commented_toml())
        .with_context(|| format!("failed to write configuration to {}", output.display()))?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge_command() {
        let cli = Cli::parse_from([
            "odmlmerge", "merge", "a.odml", "b.odml", "--mode", "overwrite", "-o", "out.odml",
        ]);
        match cli.command {
            Commands::Merge {
                input1,
                mode,
                output,
                ..
            } => {
                assert_eq!(input1, PathBuf::from("a.odml"));
                assert_eq!(mode, Some(MergeMode::Overwrite));
                assert_eq!(output, PathBuf::from("out.odml"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let result = Cli::try_parse_from([
            "odmlmerge", "merge", "a.odml", "b.odml", "--mode", "append", "-o", "out.odml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_wizard_inputs_optional() {
        let cli = Cli::parse_from(["odmlmerge", "-v", "wizard", "a.odml"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Wizard { input1, input2 } => {
                assert_eq!(input1, Some(PathBuf::from("a.odml")));
                assert_eq!(input2, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_init_config_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        cmd_init_config(&path).unwrap();
        assert_eq!(AppConfig::load_from_file(&path).unwrap(), AppConfig::default());
        assert!(cmd_init_config(&path).is_err());
    }

    #[test]
    fn test_store_config_skips_unchanged_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig::default();

        store_config(&config, &config.clone(), Some(&path));
        assert!(!path.exists());

        let mut changed = config.clone();
        changed.paths.last_output = Some(PathBuf::from("/out/m.odml"));
        store_config(&changed, &config, Some(&path));
        assert_eq!(AppConfig::load_from_file(&path).unwrap(), changed);
    }

    #[test]
    fn test_store_config_keeps_init_config_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        cmd_init_config(&path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        let mut config = loaded.clone();
        config.paths.last_input = Some(PathBuf::from("/data/a.odml"));
        store_config(&config, &loaded, Some(&path));

        let after = std::fs::read_to_string(&path).unwrap();
        for comment in before.lines().filter(|l| l.starts_with('#')) {
            assert!(after.contains(comment), "lost comment: {}", comment);
        }
        assert!(after.contains("last_input = \"/data/a.odml\""));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/a.odml"), "/abs/a.odml");
        assert_eq!(expand_tilde("rel/a.odml"), "rel/a.odml");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde("~/a.odml"),
                format!("{}/a.odml", home.display())
            );
        }
    }
}
