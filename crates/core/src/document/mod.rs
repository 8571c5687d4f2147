//! odML documents: the in-memory tree, the XML codec, and the
//! [`DocumentModel`] capability the merge workflow consumes.

pub mod model;
pub mod xml;

use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::conflict::{MergeMode, Merger};
use crate::errors::{ConflictError, DocumentError};

pub use model::{Document, Dtype, Property, Section};

/// Load / merge / save operations the merge workflow needs from a document
/// backend.
pub trait DocumentModel {
    /// Read a document from `path`.
    fn load(&self, path: &Path) -> Result<Document, DocumentError>;

    /// Merge `source` into `target` under `mode`.
    ///
    /// Either the fully merged document is returned or nothing is merged at
    /// all.
    fn merge(
        &self,
        target: Document,
        source: &Document,
        mode: MergeMode,
    ) -> Result<Document, ConflictError>;

    /// Write `document` to `path`. On failure nothing is left at `path`.
    fn save(&self, document: &Document, path: &Path) -> Result<(), DocumentError>;
}

/// [`DocumentModel`] backed by odML XML files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdmlFileModel;

impl DocumentModel for OdmlFileModel {
    fn load(&self, path: &Path) -> Result<Document, DocumentError> {
        info!(path = %path.display(), "loading odML document");

        if !path.exists() {
            return Err(DocumentError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path).map_err(|source| DocumentError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let document = xml::parse_document(&contents, &path.display().to_string())?;
        document.validate()?;

        debug!(
            sections = document.sections.len(),
            properties = document.properties().len(),
            "odML document loaded"
        );
        Ok(document)
    }

    fn merge(
        &self,
        target: Document,
        source: &Document,
        mode: MergeMode,
    ) -> Result<Document, ConflictError> {
        Merger::merge(&target, source, mode)
    }

    fn save(&self, document: &Document, path: &Path) -> Result<(), DocumentError> {
        info!(path = %path.display(), "saving odML document");
        write_atomically(path, &xml::to_xml(document))
    }
}

/// Write `contents` to a temporary file next to `path`, then rename it into
/// place.
pub fn write_atomically(path: &Path, contents: &str) -> Result<(), DocumentError> {
    let write_error = |detail: String| DocumentError::WriteError {
        path: path.display().to_string(),
        detail,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_error(e.to_string()))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| write_error(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| write_error(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_error(e.error.to_string()))?;

    debug!(path = %path.display(), bytes = contents.len(), "file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<odML version="1.1">
  <section>
    <name>Recording</name>
    <property><name>x</name><value>[1]</value><type>int</type></property>
  </section>
</odML>"#;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OdmlFileModel.load(&dir.path().join("absent.odml")).unwrap_err();
        assert!(matches!(err, DocumentError::FileNotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.odml");
        std::fs::write(&path, DOC.replace("[1]", "[one]")).unwrap();

        let err = OdmlFileModel.load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_rejects_duplicate_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.odml");
        let twice = DOC.replace(
            "</odML>",
            "  <section><name>Recording</name></section>\n</odML>",
        );
        std::fs::write(&path, twice).unwrap();

        let err = OdmlFileModel.load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateName { ref path } if path == "/Recording"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.odml");
        std::fs::write(&input, DOC).unwrap();

        let doc = OdmlFileModel.load(&input).unwrap();
        let output = dir.path().join("out.odml");
        OdmlFileModel.save(&doc, &output).unwrap();

        let reloaded = OdmlFileModel.load(&output).unwrap();
        assert_eq!(reloaded, doc);

        // Only the output itself remains; the temporary file was renamed.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn test_save_into_missing_directory_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("no-such-dir").join("out.odml");

        let err = OdmlFileModel.save(&Document::new(), &output).unwrap_err();
        assert!(matches!(err, DocumentError::WriteError { .. }));
        assert!(!output.exists());
    }
}
