//! Local-filesystem blob stage.
//!
//! Collections are directories under a root; file identifiers are paths
//! relative to their collection, always `/`-separated.

use blackout_core::BlobStage;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage root is not a directory: {0}")]
    MissingRoot(PathBuf),
    #[error("collection not found: {0}")]
    MissingCollection(PathBuf),
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
    #[error("invalid file identifier: {0:?}")]
    InvalidId(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct LocalStage {
    root: PathBuf,
}

impl LocalStage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StageError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StageError::MissingRoot(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A collection is a single directory directly under the root.
    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StageError> {
        let mut components = Path::new(collection).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !collection.contains(['/', '\\']) => {
                Ok(self.root.join(name))
            }
            _ => Err(StageError::InvalidCollection(collection.to_string())),
        }
    }

    /// Resolves `id` inside `collection`, refusing anything that could escape it.
    fn file_path(&self, collection: &str, id: &str) -> Result<PathBuf, StageError> {
        let relative = Path::new(id);
        let clean = !id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StageError::InvalidId(id.to_string()));
        }
        Ok(self.collection_dir(collection)?.join(relative))
    }

    pub fn list_files(&self, collection: &str) -> Result<Vec<String>, StageError> {
        let dir = self.collection_dir(collection)?;
        if !dir.is_dir() {
            return Err(StageError::MissingCollection(dir));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(id);
        }
        files.sort();
        log::debug!("[Stage] {} files in {}", files.len(), dir.display());
        Ok(files)
    }

    pub fn read_file(&self, collection: &str, id: &str) -> Result<Vec<u8>, StageError> {
        let path = self.file_path(collection, id)?;
        fs::read(&path).map_err(io_error(&path))
    }

    /// Writes through a temporary sibling and renames it into place, so a
    /// crash never leaves a half-written output under the final name.
    pub fn write_file(&self, collection: &str, id: &str, bytes: &[u8]) -> Result<(), StageError> {
        let path = self.file_path(collection, id)?;
        let parent = path
            .parent()
            .ok_or_else(|| StageError::InvalidId(id.to_string()))?;
        fs::create_dir_all(parent).map_err(io_error(parent))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| StageError::InvalidId(id.to_string()))?;
        let temp = parent.join(format!(".{}.partial", file_name.to_string_lossy()));
        fs::write(&temp, bytes).map_err(io_error(&temp))?;
        if let Err(source) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(StageError::Io { path, source });
        }
        log::debug!("[Stage] wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

impl BlobStage for LocalStage {
    fn list(&self, collection: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.list_files(collection)?)
    }

    fn read(&self, collection: &str, id: &str) -> anyhow::Result<Vec<u8>> {
        Ok(self.read_file(collection, id)?)
    }

    fn write(&self, collection: &str, id: &str, bytes: &[u8]) -> anyhow::Result<()> {
        Ok(self.write_file(collection, id, bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> (tempfile::TempDir, LocalStage) {
        let dir = tempfile::tempdir().unwrap();
        let stage = LocalStage::new(dir.path()).unwrap();
        (dir, stage)
    }

    #[test]
    fn test_list_is_sorted_and_relative() {
        let (dir, stage) = stage();
        let input = dir.path().join("inbox");
        fs::create_dir_all(input.join("2024")).unwrap();
        fs::write(input.join("b.pdf"), b"b").unwrap();
        fs::write(input.join("a file.pdf"), b"a").unwrap();
        fs::write(input.join("2024").join("c.pdf"), b"c").unwrap();

        let files = stage.list("inbox").unwrap();
        assert_eq!(files, ["2024/c.pdf", "a file.pdf", "b.pdf"]);
    }

    #[test]
    fn test_missing_collection() {
        let (_dir, stage) = stage();
        let err = stage.list_files("nowhere").unwrap_err();
        assert!(matches!(err, StageError::MissingCollection(_)));
        assert!(LocalStage::new("/definitely/not/here").is_err());
    }

    #[test]
    fn test_write_then_read() {
        let (dir, stage) = stage();
        stage
            .write("outbox", "nested/redacted_my doc.pdf", b"%PDF-1.5")
            .unwrap();
        assert_eq!(
            stage.read("outbox", "nested/redacted_my doc.pdf").unwrap(),
            b"%PDF-1.5"
        );
        // no temporary file left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("outbox/nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_rejects_escaping_collections() {
        let (dir, stage) = stage();
        fs::create_dir_all(dir.path().join("inbox")).unwrap();
        for collection in ["../x", "..", "/tmp", "", "inbox/../..", "a/b", "a\\b", "."] {
            assert!(
                matches!(stage.list_files(collection), Err(StageError::InvalidCollection(_))),
                "{collection:?} accepted"
            );
            assert!(
                matches!(
                    stage.write_file(collection, "a.pdf", b"x"),
                    Err(StageError::InvalidCollection(_))
                ),
                "{collection:?} accepted"
            );
        }
        assert!(stage.list_files("inbox").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_escaping_ids() {
        let (_dir, stage) = stage();
        for id in ["../secret.pdf", "/etc/passwd", "", "a/../../b.pdf"] {
            assert!(
                matches!(stage.read_file("inbox", id), Err(StageError::InvalidId(_))),
                "{id:?} accepted"
            );
        }
    }
}
