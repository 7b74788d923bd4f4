//! Artifact store access.
//!
//! Provides a trait-based abstraction over Maven-layout repositories so the
//! senders can fetch clean archives and publish to secondary repositories
//! without caring whether the store is remote or a local directory tree.

use crate::error::{Result, UploadError};
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::Coordinate;
use log::debug;
use std::sync::OnceLock;
use std::time::Duration;

/// Network timeout for artifact store requests.
const STORE_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetch, publish and look up artifacts by coordinate.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactStore {
    /// Downloads the artifact addressed by `gav` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SourceNotFound`] when the store has no such
    /// artifact and [`UploadError::Store`] for other failures.
    fn fetch(&self, gav: &Coordinate, dest: &Utf8Path) -> Result<()>;

    /// Uploads `source` as `gav` into `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Store`] when the upload fails.
    fn push(&self, gav: &Coordinate, repository: &str, source: &Utf8Path) -> Result<()>;

    /// Returns `true` when `repository` holds `gav`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Store`] when the store cannot be queried.
    fn exists(&self, gav: &Coordinate, repository: &str) -> Result<bool>;
}

fn store_error(operation: &'static str, gav: &Coordinate, reason: impl ToString) -> UploadError {
    UploadError::Store {
        operation,
        delivery: gav.to_string(),
        reason: reason.to_string(),
    }
}

/// Artifact store speaking HTTP to a Maven-layout repository manager.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    base_url: String,
    download_repository: String,
    token: Option<String>,
}

impl HttpArtifactStore {
    /// Creates a store rooted at `base_url`, fetching from `download_repository`.
    #[must_use]
    pub fn new(base_url: &str, download_repository: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            download_repository: download_repository.trim_matches('/').to_owned(),
            token,
        }
    }

    /// URL of `gav` inside `repository`.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_common::Coordinate;
    /// use courier_uploader::artifact_store::HttpArtifactStore;
    ///
    /// let store = HttpArtifactStore::new("https://repo.example/", "releases", None);
    /// let gav = Coordinate::parse("com.acme:pkg:1.0:zip").unwrap();
    /// assert_eq!(
    ///     store.artifact_url(&gav, "releases"),
    ///     "https://repo.example/releases/com/acme/pkg/1.0/pkg-1.0.zip"
    /// );
    /// ```
    #[must_use]
    pub fn artifact_url(&self, gav: &Coordinate, repository: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            repository.trim_matches('/'),
            gav.repository_path()
        )
    }

    fn authorise<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

impl ArtifactStore for HttpArtifactStore {
    fn fetch(&self, gav: &Coordinate, dest: &Utf8Path) -> Result<()> {
        let url = self.artifact_url(gav, &self.download_repository);
        debug!("fetching {url}");
        let response = self
            .authorise(http_agent().get(&url))
            .call()
            .map_err(|err| map_ureq_error("fetch", gav, &err))?;
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file)
            .map_err(|err| store_error("fetch", gav, err))?;
        Ok(())
    }

    fn push(&self, gav: &Coordinate, repository: &str, source: &Utf8Path) -> Result<()> {
        let url = self.artifact_url(gav, repository);
        debug!("pushing {source} to {url}");
        let bytes = std::fs::read(source)?;
        self.authorise(http_agent().put(&url))
            .send(bytes.as_slice())
            .map_err(|err| store_error("push", gav, err))?;
        Ok(())
    }

    fn exists(&self, gav: &Coordinate, repository: &str) -> Result<bool> {
        let url = self.artifact_url(gav, repository);
        match self.authorise(http_agent().head(&url)).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(err) => Err(store_error("exists", gav, err)),
        }
    }
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(STORE_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error raised while fetching to an [`UploadError`].
fn map_ureq_error(operation: &'static str, gav: &Coordinate, err: &ureq::Error) -> UploadError {
    match err {
        ureq::Error::StatusCode(404) => UploadError::SourceNotFound {
            delivery: gav.to_string(),
        },
        other => store_error(operation, gav, other),
    }
}

/// Artifact store laid out as `<root>/<repository>/<maven path>` on disk.
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    root: Utf8PathBuf,
    download_repository: String,
}

impl DirArtifactStore {
    /// Creates a store rooted at `root`, fetching from `download_repository`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, download_repository: &str) -> Self {
        Self {
            root: root.into(),
            download_repository: download_repository.to_owned(),
        }
    }

    /// Filesystem path of `gav` inside `repository`.
    #[must_use]
    pub fn artifact_path(&self, gav: &Coordinate, repository: &str) -> Utf8PathBuf {
        self.root.join(repository).join(gav.repository_path())
    }

    /// Stores `content` as `gav` in the download repository.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] when the file cannot be written.
    pub fn put(&self, gav: &Coordinate, content: &[u8]) -> Result<()> {
        let path = self.artifact_path(gav, &self.download_repository);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl ArtifactStore for DirArtifactStore {
    fn fetch(&self, gav: &Coordinate, dest: &Utf8Path) -> Result<()> {
        let path = self.artifact_path(gav, &self.download_repository);
        match std::fs::copy(&path, dest) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(UploadError::SourceNotFound {
                    delivery: gav.to_string(),
                })
            }
            Err(err) => Err(store_error("fetch", gav, err)),
        }
    }

    fn push(&self, gav: &Coordinate, repository: &str, source: &Utf8Path) -> Result<()> {
        let path = self.artifact_path(gav, repository);
        let copied = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::copy(source, &path));
        copied.map(|_| ()).map_err(|err| store_error("push", gav, err))
    }

    fn exists(&self, gav: &Coordinate, repository: &str) -> Result<bool> {
        Ok(self.artifact_path(gav, repository).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn gav() -> Coordinate {
        Coordinate::parse("com.example.ACME:pkg:1.0:zip").expect("valid coordinate")
    }

    #[fixture]
    fn store_root() -> (TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        (dir, root)
    }

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = map_ureq_error("fetch", &gav(), &ureq::Error::StatusCode(404));
        assert!(matches!(err, UploadError::SourceNotFound { .. }));
    }

    #[test]
    fn map_ureq_error_maps_other_status_to_store_error() {
        let err = map_ureq_error("fetch", &gav(), &ureq::Error::StatusCode(500));
        assert!(matches!(err, UploadError::Store { operation: "fetch", .. }));
    }

    #[test]
    fn http_urls_follow_maven_layout() {
        let store = HttpArtifactStore::new("https://repo.example", "/int-releases/", None);
        assert_eq!(
            store.artifact_url(&gav(), &store.download_repository),
            "https://repo.example/int-releases/com/example/ACME/pkg/1.0/pkg-1.0.zip"
        );
    }

    #[rstest]
    fn dir_store_round_trips_content(store_root: (TempDir, Utf8PathBuf)) {
        let (_dir, root) = store_root;
        let store = DirArtifactStore::new(root.join("store"), "int");
        store.put(&gav(), b"hello").expect("put");

        let dest = root.join("fetched.zip");
        store.fetch(&gav(), &dest).expect("fetch");
        assert_eq!(std::fs::read(&dest).expect("read"), b"hello");

        assert!(!store.exists(&gav(), "ext").expect("exists"));
        store.push(&gav(), "ext", &dest).expect("push");
        assert!(store.exists(&gav(), "ext").expect("exists"));
    }

    #[rstest]
    fn dir_store_reports_missing_artifact(store_root: (TempDir, Utf8PathBuf)) {
        let (_dir, root) = store_root;
        let store = DirArtifactStore::new(root.clone(), "int");
        let err = store
            .fetch(&gav(), &root.join("out.zip"))
            .expect_err("nothing stored");
        assert!(matches!(err, UploadError::SourceNotFound { .. }));
    }
}
