//! Open a file with the desktop's default application.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

/// Program and leading arguments that hand a file to the desktop.
fn launcher() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "windows") {
        ("cmd", &["/C", "start", ""])
    } else if cfg!(target_os = "macos") {
        ("open", &[])
    } else {
        ("xdg-open", &[])
    }
}

/// Launch the default viewer for `path` without waiting for it.
pub fn open_file(path: &Path) -> Result<()> {
    let (program, args) = launcher();
    debug!(program, path = %path.display(), "opening file");

    Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to run {} for {}", program, path.display()))?;
    Ok(())
}
