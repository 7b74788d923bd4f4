//! Key store access.
//!
//! Client public keys live under `<country>/<code>/data/*.asc` relative to the
//! key store root.

use crate::gpg::KeyMaterial;
use camino::Utf8PathBuf;
use log::debug;

/// File extension of armored public keys.
pub const KEY_EXTENSION: &str = "asc";

/// Errors arising from key store operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// The requested directory does not exist.
    #[error("key directory not found: {path}")]
    DirectoryMissing {
        /// The missing directory.
        path: String,
    },

    /// Reading the store failed.
    #[error("key store I/O error at {path}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Lists and reads armored keys.
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore {
    /// Relative paths of every key file in `dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::DirectoryMissing`] when `dir` does not exist.
    fn list_keys(&self, dir: &str) -> Result<Vec<String>, KeyStoreError>;

    /// Reads the key at the relative path `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Io`] when the key cannot be read.
    fn read_key(&self, path: &str) -> Result<KeyMaterial, KeyStoreError>;
}

/// Key directory of a client inside the key store.
///
/// # Examples
///
/// ```
/// use courier_uploader::key_store::client_key_dir;
///
/// assert_eq!(client_key_dir("US", "ACME"), "US/ACME/data");
/// ```
#[must_use]
pub fn client_key_dir(country: &str, code: &str) -> String {
    format!("{country}/{code}/data")
}

/// Key store on a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct DirKeyStore {
    root: Utf8PathBuf,
}

impl DirKeyStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl KeyStore for DirKeyStore {
    fn list_keys(&self, dir: &str) -> Result<Vec<String>, KeyStoreError> {
        let full = self.root.join(dir);
        let entries = match full.read_dir_utf8() {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyStoreError::DirectoryMissing {
                    path: dir.to_owned(),
                });
            }
            Err(source) => {
                return Err(KeyStoreError::Io {
                    path: dir.to_owned(),
                    source,
                });
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| KeyStoreError::Io {
                path: dir.to_owned(),
                source,
            })?;
            let path = entry.path();
            if path.extension() == Some(KEY_EXTENSION) && path.is_file() {
                keys.push(format!("{}/{}", dir.trim_end_matches('/'), entry.file_name()));
            }
        }
        keys.sort();
        debug!("found {} key(s) in {dir}", keys.len());
        Ok(keys)
    }

    fn read_key(&self, path: &str) -> Result<KeyMaterial, KeyStoreError> {
        let data = std::fs::read(self.root.join(path)).map_err(|source| KeyStoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        let name = path.rsplit('/').next().unwrap_or(path);
        Ok(KeyMaterial::new(name, data))
    }
}
