//! Conflict preview: what a strict merge would refuse to overwrite.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use odmlmerge_core::{ConflictDetector, DocumentModel, OdmlFileModel, ValueConflict};

use crate::style;

/// List value conflicts between `input1` (target) and `input2` (source).
pub fn run_preview(input1: &Path, input2: &Path) -> Result<()> {
    let model = OdmlFileModel;
    let target = model
        .load(input1)
        .with_context(|| format!("failed to load {}", input1.display()))?;
    let source = model
        .load(input2)
        .with_context(|| format!("failed to load {}", input2.display()))?;

    let conflicts = ConflictDetector::detect(&target, &source);

    println!();
    if conflicts.is_empty() {
        println!("{}", style::success("No conflicts: a strict merge would succeed"));
        println!();
        return Ok(());
    }

    println!(
        "{}",
        style::header(&format!("Value conflicts ({})", conflicts.len()))
    );
    println!();
    println!("{}", conflict_table(&conflicts));
    println!();
    println!(
        "{}",
        style::dim("A strict merge refuses these; overwrite mode takes the values of input 2.")
    );
    println!();

    Ok(())
}

/// Render conflicts as a table, one row per property.
pub fn conflict_table(conflicts: &[ValueConflict]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Property", "Input 1 (target)", "Input 2 (source)"]);

    for c in conflicts {
        table.add_row(vec![
            Cell::new(&c.path),
            Cell::new(c.target.join(", ")),
            Cell::new(c.source.join(", ")),
        ]);
    }
    table
}
