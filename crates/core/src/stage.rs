//! Blob-stage collaborator: list, read and write files in named collections.

use crate::{CoreError, Result};

pub trait BlobStage: Send + Sync {
    /// File identifiers in `collection`, in a stable, deterministic order.
    fn list(&self, collection: &str) -> anyhow::Result<Vec<String>>;

    fn read(&self, collection: &str, id: &str) -> anyhow::Result<Vec<u8>>;

    fn write(&self, collection: &str, id: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

/// Derives the output identifier by prefixing the file-name component.
///
/// Directory components, spaces and punctuation are preserved verbatim:
/// `"scans/my file (1).pdf"` becomes `"scans/redacted_my file (1).pdf"`.
pub fn output_name(prefix: &str, id: &str) -> Result<String> {
    let (dir, name) = match id.rfind('/') {
        Some(pos) => id.split_at(pos + 1),
        None => ("", id),
    };
    if name.is_empty() {
        return Err(CoreError::InvalidFileId(id.to_string()));
    }
    Ok(format!("{dir}{prefix}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_preserves_spaces() {
        assert_eq!(
            output_name("redacted_", "my important document.pdf").unwrap(),
            "redacted_my important document.pdf"
        );
    }

    #[test]
    fn test_output_name_keeps_directories() {
        assert_eq!(
            output_name("redacted_", "2024/q1/Statement #7 (final).pdf").unwrap(),
            "2024/q1/redacted_Statement #7 (final).pdf"
        );
    }

    #[test]
    fn test_output_name_rejects_directory_ids() {
        assert!(output_name("redacted_", "dir/").is_err());
        assert!(output_name("redacted_", "").is_err());
    }
}
