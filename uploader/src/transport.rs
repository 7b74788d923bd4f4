//! Outbound transport.
//!
//! The transport is the directory tree clients collect their deliveries from.
//! Paths are `/`-separated and relative to the transport root.

use crate::error::UploadError;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::io;

/// Errors arising from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A destination directory does not exist.
    #[error("directory {path} not found")]
    DirectoryMissing {
        /// The missing directory.
        path: String,
    },

    /// The transport refused access.
    #[error("permission denied for {path}: {reason}")]
    PermissionDenied {
        /// The refused path.
        path: String,
        /// Description of the denial.
        reason: String,
    },

    /// Any other failure.
    #[error("{path}: {reason}")]
    Other {
        /// The path being accessed.
        path: String,
        /// Description of the failure.
        reason: String,
    },
}

impl TransportError {
    fn from_io(path: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_owned(),
                reason: err.to_string(),
            },
            _ => Self::Other {
                path: path.to_owned(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::DirectoryMissing { path } => Self::DestinationMissing { path },
            TransportError::PermissionDenied { path, reason } => {
                Self::TransportPermission { path, reason }
            }
            TransportError::Other { path, reason } => Self::Transport { path, reason },
        }
    }
}

/// Directory-oriented file drop.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Drops and re-establishes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot be reached.
    fn reconnect(&self) -> Result<(), TransportError>;

    /// Checks that `dir` exists and can be written to.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DirectoryMissing`] when `dir` is missing.
    fn open_dir(&self, dir: &str) -> Result<(), TransportError>;

    /// Returns `true` when `path` exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot be queried.
    fn exists(&self, path: &str) -> Result<bool, TransportError>;

    /// Deletes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be removed.
    fn remove(&self, path: &str) -> Result<(), TransportError>;

    /// Moves the local file `source` to `path` in one step.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    fn move_in(&self, source: &Utf8Path, path: &str) -> Result<(), TransportError>;
}

/// Transport backed by a mounted directory tree.
#[derive(Debug, Clone)]
pub struct DirTransport {
    root: Utf8PathBuf,
}

impl DirTransport {
    /// Creates a transport rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path of the transport path `path`.
    #[must_use]
    pub fn local_path(&self, path: &str) -> Utf8PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Transport for DirTransport {
    fn reconnect(&self) -> Result<(), TransportError> {
        if self.root.is_dir() {
            debug!("transport root {} is reachable", self.root);
            Ok(())
        } else {
            Err(TransportError::Other {
                path: self.root.to_string(),
                reason: "transport root is not a directory".to_owned(),
            })
        }
    }

    fn open_dir(&self, dir: &str) -> Result<(), TransportError> {
        let missing = || TransportError::DirectoryMissing {
            path: dir.to_owned(),
        };
        match std::fs::metadata(self.local_path(dir)) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(missing()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(missing()),
            Err(err) => Err(TransportError::from_io(dir, &err)),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, TransportError> {
        self.local_path(path)
            .try_exists()
            .map_err(|err| TransportError::from_io(path, &err))
    }

    fn remove(&self, path: &str) -> Result<(), TransportError> {
        std::fs::remove_file(self.local_path(path))
            .map_err(|err| TransportError::from_io(path, &err))
    }

    fn move_in(&self, source: &Utf8Path, path: &str) -> Result<(), TransportError> {
        let target = self.local_path(path);
        let staging = target.with_file_name(format!(
            ".{}.part",
            target.file_name().unwrap_or("delivery")
        ));
        std::fs::copy(source, &staging)
            .and_then(|_| std::fs::rename(&staging, &target))
            .map_err(|err| {
                discard_staging(&staging);
                TransportError::from_io(path, &err)
            })
    }
}

fn discard_staging(staging: &Utf8Path) {
    match std::fs::remove_file(staging) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            warn!("could not remove {staging}: {err}");
        }
        _ => {}
    }
}
