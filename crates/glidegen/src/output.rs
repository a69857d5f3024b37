//! Declaration file destination.
//!
//! The destination is validated before any fetch work, and rendered text is
//! staged in a temp file beside it so a failed run never leaves a partial
//! file behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, OutputError>;

#[derive(Error, Debug)]
pub enum OutputError {
    /// The file exists and overwriting was not requested
    #[error("Output file {0} already exists (use --force to overwrite)")]
    DestinationExists(PathBuf),

    #[error("Output directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("Output path {0} is a directory")]
    IsDirectory(PathBuf),

    #[error("Failed to write {path}: {origin}")]
    Io {
        path: PathBuf,
        #[source]
        origin: std::io::Error,
    },
}

impl OutputError {
    /// True for the checks `prepare` makes before any work is done.
    pub fn is_destination_conflict(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    fn io(path: &Path, origin: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            origin,
        }
    }
}

/// A validated destination for rendered declarations.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    path: PathBuf,
    directory: PathBuf,
    force: bool,
}

impl OutputTarget {
    /// Check that `path` can be written.
    ///
    /// An existing file is a conflict unless `force` is set; a missing
    /// parent directory is always a conflict.
    pub fn prepare(path: &Path, force: bool) -> Result<Self> {
        if path.is_dir() {
            return Err(OutputError::IsDirectory(path.to_path_buf()));
        }
        if path.exists() && !force {
            return Err(OutputError::DestinationExists(path.to_path_buf()));
        }
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !directory.is_dir() {
            return Err(OutputError::MissingDirectory(directory));
        }
        Ok(Self {
            path: path.to_path_buf(),
            directory,
            force,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage `text` beside the destination, then move it into place.
    ///
    /// Without `force`, a file that appeared since `prepare` is left alone
    /// and reported as [`OutputError::DestinationExists`].
    pub fn write(&self, text: &str) -> Result<()> {
        let mut staged =
            NamedTempFile::new_in(&self.directory).map_err(|e| OutputError::io(&self.directory, e))?;
        staged
            .write_all(text.as_bytes())
            .and_then(|_| staged.flush())
            .map_err(|e| OutputError::io(staged.path(), e))?;
        let persisted = if self.force {
            staged.persist(&self.path)
        } else {
            staged.persist_noclobber(&self.path)
        };
        persisted.map_err(|e| match e.error.kind() {
            std::io::ErrorKind::AlreadyExists if !self.force => {
                OutputError::DestinationExists(self.path.clone())
            }
            _ => OutputError::io(&self.path, e.error),
        })?;

        info!(path = %self.path.display(), bytes = text.len(), "Declarations written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn existing_files_need_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.d.ts");
        std::fs::write(&path, "old").unwrap();

        let err = OutputTarget::prepare(&path, false).unwrap_err();
        assert!(matches!(err, OutputError::DestinationExists(_)));
        assert!(err.is_destination_conflict());

        let target = OutputTarget::prepare(&path, true).unwrap();
        target.write("new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn files_created_after_prepare_survive_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.d.ts");
        let target = OutputTarget::prepare(&path, false).unwrap();
        std::fs::write(&path, "written meanwhile").unwrap();

        let err = target.write("rendered").unwrap_err();
        assert!(matches!(err, OutputError::DestinationExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "written meanwhile");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("types.d.ts")]);
    }

    #[test]
    fn forced_targets_replace_files_created_after_prepare() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.d.ts");
        let target = OutputTarget::prepare(&path, true).unwrap();
        std::fs::write(&path, "written meanwhile").unwrap();

        target.write("rendered").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "rendered");
    }

    #[test]
    fn missing_parent_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("types.d.ts");
        assert!(matches!(
            OutputTarget::prepare(&path, true),
            Err(OutputError::MissingDirectory(_))
        ));
    }

    #[test]
    fn directories_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            OutputTarget::prepare(dir.path(), true),
            Err(OutputError::IsDirectory(_))
        ));
    }

    #[test]
    fn writes_leave_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.d.ts");
        OutputTarget::prepare(&path, false)
            .unwrap()
            .write("declare namespace $$GlideRecord {\n}\n")
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("types.d.ts")]);
    }
}
