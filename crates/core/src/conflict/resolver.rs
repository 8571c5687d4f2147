//! Merge modes and the per-value decision rule.
//!
//! The [`ConflictResolver`] decides, for a single property or attribute that
//! exists in both documents, whether the target keeps its value, takes the
//! source's value, or whether the two cannot be merged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Property;

/// Conflict policy for a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Never replace a non-default target value; refuse the merge instead.
    #[default]
    Strict,
    /// Source values always replace target values.
    Overwrite,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!(
                "invalid merge mode '{}': use 'strict' or 'overwrite'",
                other
            )),
        }
    }
}

/// Outcome of comparing one target value with one source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Leave the target as it is.
    KeepTarget,
    /// Replace the target with the source.
    TakeSource,
    /// The values cannot be merged under the active mode.
    Conflict,
}

/// Stateless decision rule shared by detection and merging.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Decide how a property present on both sides is merged.
    pub fn resolve_value(mode: MergeMode, target: &Property, source: &Property) -> Resolution {
        if target.same_value(source) {
            return Resolution::KeepTarget;
        }
        match mode {
            MergeMode::Overwrite => Resolution::TakeSource,
            MergeMode::Strict if target.is_default() => Resolution::TakeSource,
            MergeMode::Strict if source.is_default() => Resolution::KeepTarget,
            MergeMode::Strict => Resolution::Conflict,
        }
    }

    /// Decide how a descriptive attribute (definition, unit, author, ...) is
    /// merged. Attributes never conflict: missing ones are filled in, and
    /// only overwrite mode replaces a present one.
    pub fn resolve_attribute(
        mode: MergeMode,
        target: Option<&str>,
        source: Option<&str>,
    ) -> Resolution {
        match (target, source) {
            (_, None) => Resolution::KeepTarget,
            (None, Some(_)) => Resolution::TakeSource,
            (Some(t), Some(s)) if t == s => Resolution::KeepTarget,
            (Some(_), Some(_)) => match mode {
                MergeMode::Overwrite => Resolution::TakeSource,
                MergeMode::Strict => Resolution::KeepTarget,
            },
        }
    }

    /// Apply [`Self::resolve_attribute`] to an attribute in place.
    pub fn merge_attribute(mode: MergeMode, target: &mut Option<String>, source: &Option<String>) {
        if Self::resolve_attribute(mode, target.as_deref(), source.as_deref())
            == Resolution::TakeSource
        {
            *target = source.clone();
        }
    }
}
