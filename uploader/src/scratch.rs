//! Temporary working directories with UTF-8 paths.

use crate::error::{Result, UploadError};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// A temporary directory deleted when dropped.
#[derive(Debug)]
pub struct Scratch {
    path: Utf8PathBuf,
    _dir: TempDir,
}

impl Scratch {
    /// Creates a new directory under the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] when the directory cannot be created or its
    /// path is not valid UTF-8.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).map_err(|err| {
            UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            ))
        })?;
        Ok(Self { path, _dir: dir })
    }

    /// Root of the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Path of `name` inside the scratch directory.
    #[must_use]
    pub fn file(&self, name: &str) -> Utf8PathBuf {
        self.path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let scratch = Scratch::new("courier-test").expect("scratch");
        let root = scratch.path().to_owned();
        std::fs::write(scratch.file("sample"), b"x").expect("write sample");
        assert!(root.exists());
        drop(scratch);
        assert!(!root.exists());
    }
}
