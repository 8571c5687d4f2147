//! Document merge engine.
//!
//! Merges a *source* document into a *target* document. Sections are matched
//! by name (recursively) and properties by name within a section; anything
//! present on only one side ends up in the result. Overlapping properties
//! are settled by [`ConflictResolver`].

use tracing::{debug, info, warn};

use super::detector::{ConflictDetector, ValueConflict};
use super::resolver::{ConflictResolver, MergeMode, Resolution};
use crate::document::model::{property_path, section_path};
use crate::document::{Document, Property, Section};
use crate::errors::ConflictError;

/// Stateless merge engine.
pub struct Merger;

impl Merger {
    /// Merge `source` into a copy of `target`.
    ///
    /// In strict mode every conflict is collected first; if there is any,
    /// the merge is refused as a whole and `target` is not touched.
    pub fn merge(
        target: &Document,
        source: &Document,
        mode: MergeMode,
    ) -> Result<Document, ConflictError> {
        info!(%mode, "merging documents");

        if mode == MergeMode::Strict {
            let conflicts = ConflictDetector::detect(target, source);
            if !conflicts.is_empty() {
                warn!(count = conflicts.len(), "strict merge refused");
                return Err(ConflictError::StrictViolation { conflicts });
            }
        }

        let mut merged = target.clone();
        ConflictResolver::merge_attribute(mode, &mut merged.author, &source.author);
        ConflictResolver::merge_attribute(mode, &mut merged.date, &source.date);
        ConflictResolver::merge_attribute(mode, &mut merged.version, &source.version);
        ConflictResolver::merge_attribute(mode, &mut merged.repository, &source.repository);
        merge_sections(&mut merged.sections, &source.sections, "", mode)?;

        debug!(sections = merged.sections.len(), "merge complete");
        Ok(merged)
    }
}

fn merge_sections(
    target: &mut Vec<Section>,
    source: &[Section],
    parent: &str,
    mode: MergeMode,
) -> Result<(), ConflictError> {
    for source_section in source {
        match target.iter_mut().find(|s| s.name == source_section.name) {
            Some(target_section) => {
                let path = section_path(parent, &source_section.name);
                merge_section(target_section, source_section, &path, mode)?;
            }
            None => {
                debug!(section = %source_section.name, "adding section from source");
                target.push(source_section.clone());
            }
        }
    }
    Ok(())
}

fn merge_section(
    target: &mut Section,
    source: &Section,
    path: &str,
    mode: MergeMode,
) -> Result<(), ConflictError> {
    ConflictResolver::merge_attribute(mode, &mut target.section_type, &source.section_type);
    ConflictResolver::merge_attribute(mode, &mut target.definition, &source.definition);
    ConflictResolver::merge_attribute(mode, &mut target.reference, &source.reference);

    for source_property in &source.properties {
        match target
            .properties
            .iter_mut()
            .find(|p| p.name == source_property.name)
        {
            Some(target_property) => {
                let path = property_path(path, &source_property.name);
                merge_property(target_property, source_property, path, mode)?;
            }
            None => target.properties.push(source_property.clone()),
        }
    }

    merge_sections(&mut target.sections, &source.sections, path, mode)
}

fn merge_property(
    target: &mut Property,
    source: &Property,
    path: String,
    mode: MergeMode,
) -> Result<(), ConflictError> {
    match ConflictResolver::resolve_value(mode, target, source) {
        Resolution::TakeSource => {
            target.dtype = source.dtype;
            target.values = source.values.clone();
            if source.unit.is_some() {
                target.unit = source.unit.clone();
            }
        }
        Resolution::KeepTarget => {
            if target.unit.is_none() {
                target.unit = source.unit.clone();
            }
        }
        // Only reachable when detection and merge disagree on which nodes
        // pair up, e.g. for trees with duplicate sibling names.
        Resolution::Conflict => {
            warn!(%path, "conflict found while applying a strict merge");
            return Err(ConflictError::StrictViolation {
                conflicts: vec![ValueConflict::new(path, target, source)],
            });
        }
    }

    ConflictResolver::merge_attribute(mode, &mut target.uncertainty, &source.uncertainty);
    ConflictResolver::merge_attribute(mode, &mut target.definition, &source.definition);
    ConflictResolver::merge_attribute(mode, &mut target.reference, &source.reference);
    ConflictResolver::merge_attribute(mode, &mut target.value_origin, &source.value_origin);
    Ok(())
}
