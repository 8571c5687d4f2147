//! Conflict detection logic.
//!
//! Given two documents, the detector walks the sections they share and
//! reports every property whose values a strict merge would refuse to
//! replace.

use std::fmt;

use tracing::{debug, info};

use super::resolver::{ConflictResolver, MergeMode, Resolution};
use crate::document::model::{property_path, section_path};
use crate::document::{Document, Property, Section};

/// A property holding different non-default values in both documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueConflict {
    /// Property path, e.g. `/Subject/Surgery:Weight`.
    pub path: String,
    /// Values (with unit, if any) in the target document.
    pub target: Vec<String>,
    /// Values (with unit, if any) in the source document.
    pub source: Vec<String>,
}

impl ValueConflict {
    pub(crate) fn new(path: String, target: &Property, source: &Property) -> Self {
        Self {
            path,
            target: render_values(target),
            source: render_values(source),
        }
    }
}

impl fmt::Display for ValueConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' (target [{}], source [{}])",
            self.path,
            self.target.join(", "),
            self.source.join(", ")
        )
    }
}

fn render_values(property: &Property) -> Vec<String> {
    match &property.unit {
        Some(unit) => property
            .values
            .iter()
            .map(|v| format!("{} {}", v, unit))
            .collect(),
        None => property.values.clone(),
    }
}

/// Stateless conflict detector over two document trees.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Every value conflict between `target` and `source` under strict mode,
    /// in depth-first document order.
    pub fn detect(target: &Document, source: &Document) -> Vec<ValueConflict> {
        info!(
            target_sections = target.sections.len(),
            source_sections = source.sections.len(),
            "detecting value conflicts"
        );

        let mut conflicts = Vec::new();
        detect_sections(&target.sections, &source.sections, "", &mut conflicts);

        info!(count = conflicts.len(), "conflict detection complete");
        conflicts
    }
}

fn detect_sections(
    target: &[Section],
    source: &[Section],
    parent: &str,
    conflicts: &mut Vec<ValueConflict>,
) {
    for target_section in target {
        let Some(source_section) = source.iter().find(|s| s.name == target_section.name) else {
            continue;
        };
        let path = section_path(parent, &target_section.name);

        for target_property in &target_section.properties {
            let Some(source_property) = source_section.property(&target_property.name) else {
                continue;
            };
            if ConflictResolver::resolve_value(MergeMode::Strict, target_property, source_property)
                == Resolution::Conflict
            {
                let conflict = ValueConflict::new(
                    property_path(&path, &target_property.name),
                    target_property,
                    source_property,
                );
                debug!(path = %conflict.path, "value conflict detected");
                conflicts.push(conflict);
            }
        }

        detect_sections(&target_section.sections, &source_section.sections, &path, conflicts);
    }
}
