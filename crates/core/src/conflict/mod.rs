//! Merge policy, conflict detection, and document merging.
//!
//! The conflict subsystem is responsible for:
//! 1. **Resolution** -- deciding, per property and merge mode, which side wins.
//! 2. **Detection** -- finding every value a strict merge would refuse to replace.
//! 3. **Merging** -- producing the union of two documents, all-or-nothing.

pub mod detector;
pub mod merger;
pub mod resolver;

pub use detector::{ConflictDetector, ValueConflict};
pub use merger::Merger;
pub use resolver::{ConflictResolver, MergeMode, Resolution};
