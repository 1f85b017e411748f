//! Checkpoint marker used as an implicit `since` bound
//!
//! The file holds one epoch-millisecond integer followed by a newline.

use std::path::{Path, PathBuf};

use crate::error::Result;

pub const CHECKPOINT_FILE_NAME: &str = ".guck-checkpoint";

pub fn checkpoint_path(store_dir: &Path) -> PathBuf {
    store_dir.join(CHECKPOINT_FILE_NAME)
}

/// Read the checkpoint; missing or garbled files yield `None`
pub fn read_checkpoint(store_dir: &Path) -> Option<i64> {
    let raw = std::fs::read_to_string(checkpoint_path(store_dir)).ok()?;
    raw.trim().parse().ok()
}

/// Write `ms` as the new checkpoint, creating the store directory if needed
pub fn write_checkpoint(store_dir: &Path, ms: i64) -> Result<PathBuf> {
    std::fs::create_dir_all(store_dir)?;
    let path = checkpoint_path(store_dir);
    std::fs::write(&path, format!("{}\n", ms))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_checkpoint(dir.path()), None);

        let path = write_checkpoint(dir.path(), 1_767_225_600_000).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "1767225600000\n");
        assert_eq!(read_checkpoint(dir.path()), Some(1_767_225_600_000));
    }

    #[test]
    fn test_garbled_checkpoint_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(checkpoint_path(dir.path()), "yesterday\n").unwrap();
        assert_eq!(read_checkpoint(dir.path()), None);
    }
}
