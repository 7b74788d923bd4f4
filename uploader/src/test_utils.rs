//! Shared test utilities for the uploader crate.

use crate::artifact_store::DirArtifactStore;
use crate::error::Result;
use crate::gpg::{CommandExecutor, KeyMaterial, SystemCommandExecutor, gpg_available};
use crate::key_store::{DirKeyStore, client_key_dir};
use crate::records::{JsonRecordStore, RecordData};
use crate::sender::{Connections, ENCRYPTED_DROP, SystemKey};
use crate::transport::DirTransport;
use camino::Utf8PathBuf;
use courier_common::{Client, Coordinate, Delivery};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};
use tempfile::TempDir;

/// Passphrase protecting every fixture secret key.
pub const FIXTURE_PASSPHRASE: &str = "testkey";
/// Fingerprint of `company.asc` and `company_pub.asc`.
pub const COMPANY_FINGERPRINT: &str = "6A3AA1E04B0197FF5F5EF8F17F53099C8926B8D6";
/// Fingerprint of `client_pub.asc` and `client_priv.asc`.
pub const CLIENT_FINGERPRINT: &str = "8F358A5E3B56CE0E17B8F5C0E6BDD87AEF6895A6";
/// Fingerprint of `expired_pub.asc`.
pub const EXPIRED_FINGERPRINT: &str = "C4395358DF3ACF4D9ABD433E19F5A7EAC4CDAB5E";
/// Download repository used by [`TestBed`].
pub const DOWNLOAD_REPOSITORY: &str = "internal";

#[cfg(unix)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// gpg flags naming the operation of an invocation.
const GPG_OPERATIONS: [&str; 6] = [
    "--version",
    "--import",
    "--list-keys",
    "--encrypt",
    "--sign",
    "--decrypt",
];

/// A scripted answer to one gpg operation.
#[derive(Debug, Clone)]
pub struct GpgReply {
    /// Operation flag this reply answers, such as `--import`.
    pub operation: &'static str,
    /// Exit code reported by gpg.
    pub code: i32,
    /// Status lines without the `[GNUPG:] ` prefix.
    pub status: Vec<String>,
    /// Diagnostic text on stderr.
    pub stderr: &'static str,
}

impl GpgReply {
    /// A clean exit reporting `status`.
    pub fn ok(operation: &'static str, status: &[&str]) -> Self {
        Self {
            operation,
            code: 0,
            status: status.iter().map(|line| (*line).to_owned()).collect(),
            stderr: "",
        }
    }

    /// A failed exit reporting `status` and `stderr`.
    pub fn failed(operation: &'static str, status: &[&str], stderr: &'static str) -> Self {
        Self {
            code: 2,
            stderr,
            ..Self::ok(operation, status)
        }
    }

    /// Renders the reply as captured process output.
    pub fn output(self) -> Output {
        let stdout: String = self
            .status
            .iter()
            .map(|line| format!("[GNUPG:] {line}\n"))
            .collect();
        Output {
            status: exit_status(self.code),
            stdout: stdout.into_bytes(),
            stderr: self.stderr.as_bytes().to_vec(),
        }
    }
}

/// A `CommandExecutor` answering gpg operations from a script.
///
/// Replies are consumed in order and matched on the operation flag only, so
/// the per-keyring home directory never has to be predicted. `gpgconf` calls
/// always succeed.
#[derive(Debug, Default)]
pub struct ScriptedGpg {
    replies: RefCell<VecDeque<GpgReply>>,
    operations: RefCell<Vec<&'static str>>,
}

impl ScriptedGpg {
    /// Creates an executor answering with `replies` in order.
    pub fn new(replies: Vec<GpgReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            operations: RefCell::new(Vec::new()),
        }
    }

    /// Operations invoked so far.
    pub fn operations(&self) -> Vec<&'static str> {
        self.operations.borrow().clone()
    }

    /// Asserts that every scripted reply was consumed.
    ///
    /// # Panics
    ///
    /// Panics if replies remain.
    pub fn assert_finished(&self) {
        let left = self.replies.borrow();
        assert!(left.is_empty(), "unused gpg replies: {left:?}");
    }
}

impl CommandExecutor for ScriptedGpg {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        if cmd == "gpgconf" {
            return Ok(GpgReply::ok("gpgconf", &[]).output());
        }
        let mismatch = |message: String| crate::error::UploadError::StubMismatch { message };
        let operation = GPG_OPERATIONS
            .into_iter()
            .find(|flag| args.contains(flag))
            .ok_or_else(|| mismatch(format!("no gpg operation in: {cmd} {}", args.join(" "))))?;
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| mismatch(format!("unscripted gpg {operation}")))?;
        if reply.operation != operation {
            return Err(mismatch(format!(
                "expected gpg {}, got gpg {operation}",
                reply.operation
            )));
        }
        self.operations.borrow_mut().push(operation);
        Ok(reply.output())
    }
}

/// Returns `true` when a usable gpg is installed on the host.
pub fn gpg_installed() -> bool {
    gpg_available(&SystemCommandExecutor)
}

/// Path of a bundled fixture key.
pub fn fixture_key_path(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/keys")
        .join(name)
}

/// Reads a bundled fixture key.
///
/// # Panics
///
/// Panics if the fixture does not exist.
pub fn fixture_key(name: &str) -> KeyMaterial {
    let data = std::fs::read(fixture_key_path(name)).expect("fixture key exists");
    KeyMaterial::new(name, data)
}

/// The system key pair fixture with its passphrase.
pub fn own_key() -> KeyMaterial {
    fixture_key("company.asc").with_passphrase(Some(FIXTURE_PASSPHRASE.to_owned()))
}

/// A complete local environment for pipeline tests.
///
/// Lays out an artifact store, a secondary repository, a key store, a
/// transport drop, and the system key under one temporary directory.
#[derive(Debug)]
pub struct TestBed {
    _dir: TempDir,
    root: Utf8PathBuf,
    /// Store holding clean archives.
    pub store: DirArtifactStore,
    /// Store receiving secondary uploads.
    pub repositories: DirArtifactStore,
    /// Key store with client public keys.
    pub keys: DirKeyStore,
    /// Outbound drop.
    pub transport: DirTransport,
    /// Records handed to [`TestBed::records`].
    pub data: RecordData,
}

impl TestBed {
    /// Creates an empty environment with the system key in place.
    ///
    /// # Panics
    ///
    /// Panics if the temporary layout cannot be created.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        for sub in ["store", "keys", "drop", "own"] {
            std::fs::create_dir_all(root.join(sub)).expect("create layout");
        }
        std::fs::copy(fixture_key_path("company.asc"), root.join("own/company.asc"))
            .expect("install system key");
        Self {
            store: DirArtifactStore::new(root.join("store"), DOWNLOAD_REPOSITORY),
            repositories: DirArtifactStore::new(root.join("store"), DOWNLOAD_REPOSITORY),
            keys: DirKeyStore::new(root.join("keys")),
            transport: DirTransport::new(root.join("drop")),
            data: RecordData::default(),
            root,
            _dir: dir,
        }
    }

    /// Registers `client`, optionally with its public key and drop directory.
    ///
    /// # Panics
    ///
    /// Panics if the layout cannot be written.
    pub fn add_client(&mut self, client: Client, with_key: bool, with_drop: bool) {
        let key_dir = self
            .root
            .join("keys")
            .join(client_key_dir(&client.country, &client.code));
        if with_key {
            std::fs::create_dir_all(&key_dir).expect("create key dir");
            std::fs::copy(fixture_key_path("client_pub.asc"), key_dir.join("client.asc"))
                .expect("install client key");
        }
        if with_drop {
            std::fs::create_dir_all(self.drop_path(&format!("{}/{ENCRYPTED_DROP}", client.code)))
                .expect("create drop");
        }
        self.data.clients.push(client);
    }

    /// Creates a directory on the transport.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn add_drop(&self, path: &str) {
        std::fs::create_dir_all(self.drop_path(path)).expect("create drop");
    }

    /// Records an approved delivery, storing `content` as its clean archive
    /// when given.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is invalid or the archive cannot be stored.
    pub fn add_delivery(&mut self, gav: &str, content: Option<&[u8]>) -> Delivery {
        let gav = Coordinate::parse(gav).expect("valid coordinate");
        if let Some(content) = content {
            self.store
                .put(&gav.with_packaging("zip"), content)
                .expect("store archive");
        }
        let delivery = Delivery::approved(gav);
        self.data.deliveries.push(delivery.clone());
        delivery
    }

    /// An in-memory record store seeded with the registered records.
    pub fn records(&self) -> JsonRecordStore {
        JsonRecordStore::in_memory(self.data.clone())
    }

    /// Connections over this environment.
    pub fn connections<'a>(&'a self, gpg: &'a dyn CommandExecutor) -> Connections<'a> {
        Connections {
            artifacts: &self.store,
            repositories: &self.repositories,
            keys: &self.keys,
            transport: &self.transport,
            gpg,
        }
    }

    /// The installed system key.
    pub fn system_key(&self) -> SystemKey {
        SystemKey {
            path: self.root.join("own/company.asc"),
            passphrase: Some(FIXTURE_PASSPHRASE.to_owned()),
        }
    }

    /// Removes the system key file.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be removed.
    pub fn remove_system_key(&self) {
        std::fs::remove_file(self.root.join("own/company.asc")).expect("remove system key");
    }

    /// Local path of a transport path.
    pub fn drop_path(&self, path: &str) -> Utf8PathBuf {
        self.transport.local_path(path)
    }

    /// Root of the environment.
    pub fn root(&self) -> &camino::Utf8Path {
        &self.root
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}
