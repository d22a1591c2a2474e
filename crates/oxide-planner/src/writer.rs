//! Migration artifact files.
//!
//! An artifact is a JSON document holding the rendered `up` and `down`
//! operations of one revision. Files are named `<revision>-<name>.json`.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::{PlanError, Result};
use crate::render::Operation;

/// Name used when no migration name is given.
pub const DEFAULT_MIGRATION_NAME: &str = "noname";

/// Builds the file stem for a revision, e.g. `0003-add_owner`.
///
/// Whitespace and dashes in `name` become underscores; a missing or blank
/// name becomes [`DEFAULT_MIGRATION_NAME`].
#[must_use]
pub fn generate_migration_name(revision: i64, name: Option<&str>) -> String {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let sanitized: String = match name {
        Some(n) => n
            .chars()
            .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
            .collect(),
        None => DEFAULT_MIGRATION_NAME.to_string(),
    };
    format!("{:04}-{}", revision, sanitized)
}

/// Contents of a migration file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationArtifact {
    /// Revision this file migrates to.
    pub revision: i64,
    /// File stem, see [`generate_migration_name`].
    pub name: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Forward operations.
    pub up: Vec<Operation>,
    /// Reverse operations.
    pub down: Vec<Operation>,
}

/// Writes migration artifacts into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    out_dir: PathBuf,
}

impl MigrationWriter {
    /// Creates a writer for `out_dir`.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Output directory.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Path an artifact named `name` is written to.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{}.json", name))
    }

    /// Renders the artifact as pretty-printed JSON.
    pub fn generate(&self, artifact: &MigrationArtifact) -> Result<String> {
        Ok(serde_json::to_string_pretty(artifact)?)
    }

    /// Writes `artifact` and returns its path.
    ///
    /// Fails if the directory is missing or the file already exists.
    pub fn write(&self, artifact: &MigrationArtifact) -> Result<PathBuf> {
        if !self.out_dir.is_dir() {
            return Err(PlanError::OutDirNotFound(self.out_dir.clone()));
        }

        let path = self.path_for(&artifact.name);
        let contents = self.generate(artifact)?;

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PlanError::ArtifactExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        fill_or_remove(&path, file, &contents)?;

        Ok(path)
    }
}

/// Writes `contents` to the freshly created `path`, deleting it again if
/// the write fails so a retry is not refused as an existing artifact.
fn fill_or_remove(path: &Path, mut out: impl Write, contents: &str) -> Result<()> {
    let written = out
        .write_all(contents.as_bytes())
        .and_then(|()| out.write_all(b"\n"))
        .and_then(|()| out.flush());
    if let Err(e) = written {
        drop(out);
        if let Err(remove) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %remove, "Failed to remove partial artifact");
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{OperationName, Param};

    fn artifact(name: &str) -> MigrationArtifact {
        MigrationArtifact {
            revision: 1,
            name: name.to_string(),
            comment: None,
            created_at: Utc::now(),
            up: vec![Operation {
                name: OperationName::DropTable,
                params: vec![Param::Str("Cars".to_string())],
            }],
            down: Vec::new(),
        }
    }

    struct BrokenDisk;

    impl Write for BrokenDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path());
        let path = writer.path_for("0001-noname");
        std::fs::write(&path, "{\"revision\"").unwrap();

        let result = fill_or_remove(&path, BrokenDisk, "{}");
        assert!(matches!(result, Err(PlanError::Io(_))));
        assert!(!path.exists());

        // The retry is not refused as a duplicate
        let written = writer.write(&artifact("0001-noname")).unwrap();
        assert_eq!(written, path);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_generate_migration_name() {
        assert_eq!(generate_migration_name(1, Some("mig gamma-1")), "0001-mig_gamma_1");
        assert_eq!(generate_migration_name(12, None), "0012-noname");
        assert_eq!(generate_migration_name(3, Some("  ")), "0003-noname");
        assert!(generate_migration_name(7, None).ends_with("-noname"));
    }

    #[test]
    fn test_write_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path());

        let path = writer.write(&artifact("0001-noname")).unwrap();
        assert_eq!(path, dir.path().join("0001-noname.json"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["revision"], 1);
        assert_eq!(json["up"][0]["fn"], "dropTable");
        assert_eq!(json["up"][0]["params"][0], "Cars");
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn test_existing_artifact_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path());

        writer.write(&artifact("0001-a")).unwrap();
        let result = writer.write(&artifact("0001-a"));
        assert!(matches!(result, Err(PlanError::ArtifactExists(_))));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path().join("nope"));

        let result = writer.write(&artifact("0001-a"));
        assert!(matches!(result, Err(PlanError::OutDirNotFound(_))));
    }
}
