//! Byte sink for the mirror tree

use crate::mirror::path::MappedPath;
use crate::{ConfigError, WriteError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Target already held identical bytes
    Unchanged,
}

/// Persists mirrored files
///
/// Implementations must be idempotent (same path and bytes is a no-op) and
/// must never expose a partially written file under its final name.
pub trait MirrorWriter: Send + Sync {
    fn write(&self, path: &MappedPath, bytes: &[u8]) -> Result<WriteOutcome, WriteError>;

    /// Directory the mirror is written under
    fn root(&self) -> &Path;
}

/// Writes the mirror to the local filesystem
#[derive(Debug, Clone)]
pub struct FsMirrorWriter {
    root: PathBuf,
}

impl FsMirrorWriter {
    /// Creates the writer, verifying that `root` can be created and written
    ///
    /// # Returns
    ///
    /// * `Ok(FsMirrorWriter)` - The root exists and accepts files
    /// * `Err(ConfigError::OutputNotWritable)` - Checked before any crawling
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let not_writable = |e: std::io::Error| ConfigError::OutputNotWritable {
            path: root.display().to_string(),
            message: e.to_string(),
        };

        std::fs::create_dir_all(&root).map_err(not_writable)?;
        // Try a real file; directory permissions alone can lie
        NamedTempFile::new_in(&root).map_err(not_writable)?;

        Ok(Self { root })
    }
}

impl MirrorWriter for FsMirrorWriter {
    fn write(&self, path: &MappedPath, bytes: &[u8]) -> Result<WriteOutcome, WriteError> {
        if path.as_str().split('/').any(|s| s == ".." || s.is_empty()) {
            return Err(WriteError::Escape(path.to_string()));
        }

        let target = path.to_path_buf(&self.root);
        let io_err = |source: std::io::Error| WriteError::Io {
            path: target.display().to_string(),
            source,
        };

        if let Ok(existing) = std::fs::read(&target) {
            if existing == bytes {
                return Ok(WriteOutcome::Unchanged);
            }
        }

        let parent = target.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let mut temp = NamedTempFile::new_in(parent).map_err(io_err)?;
        temp.write_all(bytes).map_err(io_err)?;
        temp.flush().map_err(io_err)?;
        temp.persist(&target).map_err(|e| io_err(e.error))?;

        Ok(WriteOutcome::Written)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
