//! Key material and start-up validation of the system's private key.

use super::executor::CommandExecutor;
use super::keyring::Keyring;
use crate::error::{Result, UploadError};
use crate::scratch::Scratch;
use camino::Utf8Path;
use log::info;

const SAMPLE: &[u8] = b"courier key self-test\n";

/// An ASCII-armored key plus the passphrase protecting its secret part.
#[derive(Clone)]
pub struct KeyMaterial {
    name: String,
    data: Vec<u8>,
    passphrase: Option<String>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

impl KeyMaterial {
    /// Wraps raw key bytes under a display name.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            passphrase: None,
        }
    }

    /// Attaches the passphrase unlocking the secret key.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    /// Reads the system's own key file.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SystemKeyMissing`] when the file does not exist
    /// and [`UploadError::Io`] for other read failures.
    pub fn read_system_key(path: &Utf8Path, passphrase: Option<String>) -> Result<Self> {
        match std::fs::read(path) {
            Ok(data) => Ok(Self::new(path.file_name().unwrap_or(path.as_str()), data)
                .with_passphrase(passphrase)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(UploadError::SystemKeyMissing {
                    path: path.to_owned(),
                })
            }
            Err(err) => Err(UploadError::Io(err)),
        }
    }

    /// Display name, usually the key file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Armored key bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Passphrase of the secret key, if any.
    #[must_use]
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

/// Runs the encrypt, decrypt and sign round trip against `fingerprint`.
///
/// The keyring must hold the secret key and have been opened with its
/// passphrase.
///
/// # Errors
///
/// Returns [`UploadError::KeySelfTest`] naming the step that failed.
pub fn self_test(keyring: &Keyring<'_>, fingerprint: &str) -> Result<()> {
    let scratch = Scratch::new("courier-selftest")?;
    let sample = scratch.file("sample.txt");
    let encrypted = scratch.file("sample.gpg");
    let decrypted = scratch.file("sample.out");
    let signed = scratch.file("sample.sig");
    std::fs::write(&sample, SAMPLE)?;

    let status = keyring.encrypt(&sample, &encrypted, &[fingerprint.to_owned()], "sample.txt")?;
    if !status.succeeded() {
        return Err(UploadError::KeySelfTest {
            step: "encrypt",
            reason: status.summary(),
        });
    }

    let status = keyring.decrypt(&encrypted, &decrypted)?;
    if !status.succeeded() || std::fs::read(&decrypted)? != SAMPLE {
        return Err(UploadError::KeySelfTest {
            step: "decrypt",
            reason: status.summary(),
        });
    }

    let status = keyring.sign(&sample, &signed, "sample.txt")?;
    if !status.succeeded() {
        return Err(UploadError::KeySelfTest {
            step: "sign",
            reason: status.summary(),
        });
    }
    Ok(())
}

/// Checks that the system's private key imports and that its passphrase
/// unlocks it.
///
/// Used at start-up so key defects surface before any delivery is sent.
///
/// # Errors
///
/// Returns [`UploadError::SystemKeyMissing`] when the file does not exist,
/// [`UploadError::KeyImport`] when it does not import and
/// [`UploadError::KeySelfTest`] when the passphrase round trip fails.
pub fn check_private_key(
    executor: &dyn CommandExecutor,
    path: &Utf8Path,
    passphrase: Option<String>,
) -> Result<()> {
    let key = KeyMaterial::read_system_key(path, passphrase)?;
    let keyring = Keyring::open(executor, key.passphrase())?;
    let fingerprints = keyring.import(&key)?;
    for fingerprint in &fingerprints {
        self_test(&keyring, fingerprint)?;
    }
    info!("private key {path} passed validation");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpg::SystemCommandExecutor;
    use crate::test_utils::{FIXTURE_PASSPHRASE, fixture_key_path, gpg_installed};

    #[test]
    fn debug_masks_passphrase() {
        let key = KeyMaterial::new("own.asc", b"armored".to_vec())
            .with_passphrase(Some("hunter2".to_owned()));
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn missing_system_key_is_environment_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8Path::from_path(dir.path())
            .expect("UTF-8 path")
            .join("own.asc");
        let err = KeyMaterial::read_system_key(&path, None).expect_err("file is missing");
        assert!(matches!(err, UploadError::SystemKeyMissing { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn private_key_with_correct_passphrase_passes() {
        if !gpg_installed() {
            return;
        }
        check_private_key(
            &SystemCommandExecutor,
            &fixture_key_path("company.asc"),
            Some(FIXTURE_PASSPHRASE.to_owned()),
        )
        .expect("valid key");
    }

    #[test]
    fn wrong_passphrase_fails_self_test() {
        if !gpg_installed() {
            return;
        }
        let err = check_private_key(
            &SystemCommandExecutor,
            &fixture_key_path("company.asc"),
            Some("not-the-passphrase".to_owned()),
        )
        .expect_err("passphrase is wrong");
        assert!(matches!(err, UploadError::KeySelfTest { step: "decrypt", .. }));
    }

    #[test]
    fn public_key_alone_cannot_sign() {
        if !gpg_installed() {
            return;
        }
        let err = check_private_key(
            &SystemCommandExecutor,
            &fixture_key_path("company_pub.asc"),
            None,
        )
        .expect_err("no secret key");
        assert!(matches!(err, UploadError::KeySelfTest { .. }));
    }
}
