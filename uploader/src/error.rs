//! Error types for the delivery uploader.
//!
//! Every failure the pipeline can record belongs to an [`ErrorKind`]. The kind
//! decides how far a failure travels: delivery-level errors stay with their
//! delivery, client-setup errors skip one client, and environment errors abort
//! the run. Everything except [`ErrorKind::DeliveryExists`] is severe and turns
//! the run into a failure once every client has been attempted.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing or sending deliveries.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The delivery's coordinate names another client.
    #[error("delivery {delivery} belongs to client {owner}, not {client}")]
    WrongClient {
        /// Coordinate of the rejected delivery.
        delivery: String,
        /// Client derived from the coordinate.
        owner: String,
        /// Client the sender was built for.
        client: String,
    },

    /// The clean archive is missing from the artifact store.
    #[error("{delivery} not found in the artifact store")]
    SourceNotFound {
        /// Coordinate that was requested.
        delivery: String,
    },

    /// The destination already holds an object with the same name.
    #[error("delivery already exists at {path}")]
    DeliveryExists {
        /// Destination path of the existing object.
        path: String,
    },

    /// Encrypting a delivery failed.
    #[error("encryption failed for {delivery}: {reason}")]
    EncryptionFailed {
        /// Coordinate of the delivery.
        delivery: String,
        /// Status reported by gpg.
        reason: String,
    },

    /// Signing a delivery failed.
    #[error("signing failed for {delivery}: {reason}")]
    SigningFailed {
        /// Coordinate of the delivery.
        delivery: String,
        /// Status reported by gpg.
        reason: String,
    },

    /// A key could not be imported or yielded no fingerprint.
    #[error("unable to import key {key}: {reason}")]
    KeyImport {
        /// Name of the key material.
        key: String,
        /// Status reported by gpg.
        reason: String,
    },

    /// The private key failed its encrypt, decrypt and sign round trip.
    #[error("private key self-test failed during {step}: {reason}")]
    KeySelfTest {
        /// Step of the round trip that failed.
        step: &'static str,
        /// Status reported by gpg.
        reason: String,
    },

    /// The client's key directory holds no public keys.
    #[error("client {client} has no public keys in {path}")]
    NoClientKeys {
        /// Client code.
        client: String,
        /// Key directory that was searched.
        path: String,
    },

    /// The client's key directory does not exist.
    #[error("key directory {path} for client {client} does not exist")]
    KeyDirectoryMissing {
        /// Client code.
        client: String,
        /// Missing directory.
        path: String,
    },

    /// The destination directory does not exist on the transport.
    #[error("destination directory {path} does not exist on the transport")]
    DestinationMissing {
        /// Missing directory.
        path: String,
    },

    /// The system's own key file is missing.
    #[error("system key file {path} not found")]
    SystemKeyMissing {
        /// Configured key file.
        path: Utf8PathBuf,
    },

    /// A required setting was not supplied.
    #[error("{setting} is not configured")]
    MissingSetting {
        /// Name of the command-line flag.
        setting: &'static str,
    },

    /// The gpg binary could not be run.
    #[error("unable to run gpg: {reason}")]
    GpgUnavailable {
        /// Description of the spawn failure.
        reason: String,
    },

    /// The routing configuration file could not be parsed.
    #[error("invalid delivery destinations file {path}: {reason}")]
    InvalidDestinations {
        /// Path to the routing file.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// The delivery record store could not be read or written.
    #[error("record store {path}: {reason}")]
    RecordStore {
        /// Path to the record file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The transport refused access.
    #[error("permission denied on transport at {path}: {reason}")]
    TransportPermission {
        /// Path that was being written.
        path: String,
        /// Description of the denial.
        reason: String,
    },

    /// Any other transport failure.
    #[error("transport failure at {path}: {reason}")]
    Transport {
        /// Path that was being accessed.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// The artifact store rejected or failed an operation.
    #[error("artifact store {operation} failed for {delivery}: {reason}")]
    Store {
        /// Operation that failed (fetch, push, exists).
        operation: &'static str,
        /// Coordinate involved.
        delivery: String,
        /// Description of the failure.
        reason: String,
    },

    /// An I/O operation on local scratch storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run recorded severe errors.
    #[error("upload run failed with {severe} severe error(s) out of {total}")]
    RunFailed {
        /// Number of severe errors recorded.
        severe: usize,
        /// Number of errors recorded.
        total: usize,
    },

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Classification of [`UploadError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Failure of a single delivery; the next delivery is attempted.
    Delivery,
    /// The destination already held the delivery. Not severe.
    DeliveryExists,
    /// Encryption, signing or key import failure.
    Encryption,
    /// A client's prerequisites are broken; the client is skipped.
    ClientSetup,
    /// The system's own configuration is broken; the run aborts.
    EnvironmentSetup,
    /// Transport or process failure; the run fails once all clients ran.
    Transport,
    /// Artifact or record store failure.
    Store,
    /// Aggregate failure of a completed run.
    Run,
}

impl UploadError {
    /// Returns the kind of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_uploader::error::{ErrorKind, UploadError};
    ///
    /// let err = UploadError::SourceNotFound { delivery: "com.acme:pkg:1.0".to_owned() };
    /// assert_eq!(err.kind(), ErrorKind::Delivery);
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongClient { .. } | Self::SourceNotFound { .. } => ErrorKind::Delivery,
            Self::DeliveryExists { .. } => ErrorKind::DeliveryExists,
            Self::EncryptionFailed { .. }
            | Self::SigningFailed { .. }
            | Self::KeyImport { .. }
            | Self::KeySelfTest { .. } => ErrorKind::Encryption,
            Self::NoClientKeys { .. }
            | Self::KeyDirectoryMissing { .. }
            | Self::DestinationMissing { .. } => ErrorKind::ClientSetup,
            Self::SystemKeyMissing { .. }
            | Self::MissingSetting { .. }
            | Self::GpgUnavailable { .. }
            | Self::InvalidDestinations { .. }
            | Self::RecordStore { .. } => ErrorKind::EnvironmentSetup,
            Self::TransportPermission { .. } | Self::Transport { .. } | Self::Io(_) => {
                ErrorKind::Transport
            }
            Self::Store { .. } => ErrorKind::Store,
            Self::RunFailed { .. } => ErrorKind::Run,
            #[cfg(any(test, feature = "test-support"))]
            Self::StubMismatch { .. } => ErrorKind::EnvironmentSetup,
        }
    }

    /// Returns `true` when this error fails the run.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        self.kind() != ErrorKind::DeliveryExists
    }

    /// Returns `true` for errors that must abort the run immediately.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::EnvironmentSetup
    }
}

/// Result type for uploader operations.
pub type Result<T> = std::result::Result<T, UploadError>;
