//! Content transforms applied before a delivery leaves the system.
//!
//! A transform is built once per sender. Building it imports every key into
//! the sender's ephemeral keyring and proves the key material works, so key
//! defects surface before the first delivery instead of halfway through a
//! client's batch.

use crate::error::{Result, UploadError};
use crate::gpg::{CommandExecutor, KeyMaterial, Keyring, self_test};
use crate::scratch::Scratch;
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::Coordinate;
use log::debug;

/// Packaging of the clean archives fetched from the artifact store.
pub const SOURCE_PACKAGING: &str = "zip";

/// Packaging of delivered, transformed archives.
pub const DELIVERED_PACKAGING: &str = "pgp";

/// Name embedded into transformed content so the recipient recovers the
/// original archive name.
#[must_use]
pub fn embedded_name(gav: &Coordinate) -> String {
    gav.with_packaging(SOURCE_PACKAGING).filename()
}

/// Transform variants.
#[derive(Debug)]
pub enum DeliveryTransform<'a> {
    /// Content is delivered unchanged.
    Passthrough,
    /// Content is encrypted to a set of recipients.
    EncryptTo(EncryptTo<'a>),
    /// Content is wrapped in a binary signature.
    SignWith(SignWith<'a>),
}

impl DeliveryTransform<'_> {
    /// Applies the transform to `clean`, writing into `work` when needed.
    ///
    /// Returns the path of the content to deliver.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::EncryptionFailed`] or
    /// [`UploadError::SigningFailed`] when gpg reports failure.
    pub fn apply(&self, gav: &Coordinate, clean: &Utf8Path, work: &Scratch) -> Result<Utf8PathBuf> {
        match self {
            Self::Passthrough => Ok(clean.to_owned()),
            Self::EncryptTo(encrypt) => {
                let output = work.file(&gav.with_packaging(DELIVERED_PACKAGING).filename());
                encrypt.apply(gav, clean, &output)?;
                Ok(output)
            }
            Self::SignWith(sign) => {
                let output = work.file(&gav.with_packaging(DELIVERED_PACKAGING).filename());
                sign.apply(gav, clean, &output)?;
                Ok(output)
            }
        }
    }
}

/// Encryption to every client key plus the system's own key.
#[derive(Debug)]
pub struct EncryptTo<'a> {
    keyring: Keyring<'a>,
    recipients: Vec<String>,
}

impl<'a> EncryptTo<'a> {
    /// Imports `keys` into a fresh keyring.
    ///
    /// The keyring is opened with the passphrase of the first key carrying
    /// one, normally the system's own key pair.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::KeyImport`] when any key does not import.
    pub fn new(executor: &'a dyn CommandExecutor, keys: &[KeyMaterial]) -> Result<Self> {
        let passphrase = keys.iter().find_map(KeyMaterial::passphrase);
        let keyring = Keyring::open(executor, passphrase)?;
        let mut recipients: Vec<String> = Vec::new();
        for key in keys {
            for fingerprint in keyring.import(key)? {
                if !recipients.contains(&fingerprint) {
                    recipients.push(fingerprint);
                }
            }
        }
        debug!("encrypting to {} recipient(s)", recipients.len());
        Ok(Self {
            keyring,
            recipients,
        })
    }

    /// Fingerprints every delivery is encrypted to.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn apply(&self, gav: &Coordinate, input: &Utf8Path, output: &Utf8Path) -> Result<()> {
        let status = self
            .keyring
            .encrypt(input, output, &self.recipients, &embedded_name(gav))?;
        if status.succeeded() {
            Ok(())
        } else {
            Err(UploadError::EncryptionFailed {
                delivery: gav.to_string(),
                reason: status.summary(),
            })
        }
    }
}

/// Signing with the system's own private key.
#[derive(Debug)]
pub struct SignWith<'a> {
    keyring: Keyring<'a>,
    fingerprint: String,
}

impl<'a> SignWith<'a> {
    /// Imports `key` and runs the passphrase self-test.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::KeyImport`] when the key does not import and
    /// [`UploadError::KeySelfTest`] when its passphrase does not unlock it.
    pub fn new(executor: &'a dyn CommandExecutor, key: &KeyMaterial) -> Result<Self> {
        let keyring = Keyring::open(executor, key.passphrase())?;
        let fingerprints = keyring.import(key)?;
        for fingerprint in &fingerprints {
            self_test(&keyring, fingerprint)?;
        }
        let fingerprint = fingerprints.into_iter().next().unwrap_or_default();
        Ok(Self {
            keyring,
            fingerprint,
        })
    }

    /// Fingerprint of the signing key.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn apply(&self, gav: &Coordinate, input: &Utf8Path, output: &Utf8Path) -> Result<()> {
        let status = self.keyring.sign(input, output, &embedded_name(gav))?;
        if status.succeeded() {
            Ok(())
        } else {
            Err(UploadError::SigningFailed {
                delivery: gav.to_string(),
                reason: status.summary(),
            })
        }
    }
}
