//! Ephemeral GnuPG keyrings.
//!
//! A [`Keyring`] owns a private GnuPG home directory. Keys imported into it
//! never touch the user's keyring, and dropping the handle stops the agent
//! serving that home before the directory is deleted.

use super::executor::CommandExecutor;
use super::material::KeyMaterial;
use crate::error::{Result, UploadError};
use crate::scratch::Scratch;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::process::Output;

const STATUS_PREFIX: &str = "[GNUPG:] ";
const PASSPHRASE_FILE: &str = "passphrase";
const IMPORT_FILE: &str = "import.asc";

/// Machine-readable outcome of one gpg invocation.
#[derive(Debug, Clone)]
pub struct GpgStatus {
    ok: bool,
    lines: Vec<String>,
    stderr: String,
}

impl GpgStatus {
    fn from_output(output: &Output, marker: &str) -> Self {
        let lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.strip_prefix(STATUS_PREFIX))
            .map(str::to_owned)
            .collect();
        let ok = output.status.success() && lines.iter().any(|line| keyword(line) == marker);
        Self {
            ok,
            lines,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
    }

    /// Returns `true` when gpg exited cleanly and reported the expected marker.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.ok
    }

    /// Arguments of every status line with the given keyword.
    pub fn arguments<'s>(&'s self, wanted: &'s str) -> impl Iterator<Item = Vec<&'s str>> + 's {
        self.lines.iter().filter_map(move |line| {
            let mut parts = line.split_whitespace();
            (parts.next() == Some(wanted)).then(|| parts.collect())
        })
    }

    /// Short description of why the invocation failed.
    #[must_use]
    pub fn summary(&self) -> String {
        let problems: Vec<&str> = self
            .lines
            .iter()
            .map(String::as_str)
            .filter(|line| {
                matches!(
                    keyword(line),
                    "FAILURE" | "ERROR" | "INV_RECP" | "INV_SGNR" | "NODATA" | "BAD_PASSPHRASE"
                        | "DECRYPTION_FAILED" | "NO_SECKEY" | "BADSIG" | "KEYEXPIRED"
                )
            })
            .collect();
        if !problems.is_empty() {
            return problems.join("; ");
        }
        match self.stderr.lines().last() {
            Some(line) if !line.is_empty() => line.to_owned(),
            _ => "gpg reported no success status".to_owned(),
        }
    }
}

fn keyword(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or_default()
}

/// A throwaway keyring backed by a temporary GnuPG home directory.
pub struct Keyring<'a> {
    executor: &'a dyn CommandExecutor,
    home: Scratch,
    passphrase_file: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for Keyring<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("home", &self.home.path())
            .field("unlocks_secret_keys", &self.passphrase_file.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Keyring<'a> {
    /// Creates an empty keyring.
    ///
    /// When `passphrase` is given, every operation that needs a secret key
    /// unlocks it with that passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] when the home directory or passphrase file
    /// cannot be created.
    pub fn open(executor: &'a dyn CommandExecutor, passphrase: Option<&str>) -> Result<Self> {
        let home = Scratch::new("courier-gnupg")?;
        let passphrase_file = match passphrase {
            Some(secret) => {
                let path = home.file(PASSPHRASE_FILE);
                std::fs::write(&path, secret)?;
                Some(path)
            }
            None => None,
        };
        debug!("opened ephemeral keyring at {}", home.path());
        Ok(Self {
            executor,
            home,
            passphrase_file,
        })
    }

    /// GnuPG home directory of this keyring.
    #[must_use]
    pub fn home(&self) -> &Utf8Path {
        self.home.path()
    }

    /// Imports `key` and returns the fingerprints it yielded.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::KeyImport`] when gpg imports nothing.
    pub fn import(&self, key: &KeyMaterial) -> Result<Vec<String>> {
        let file = self.home.file(IMPORT_FILE);
        std::fs::write(&file, key.data())?;
        let status = self.gpg(&["--import", file.as_str()], "IMPORT_OK")?;
        let mut fingerprints: Vec<String> = Vec::new();
        for fpr in status
            .arguments("IMPORT_OK")
            .filter_map(|args| args.get(1).map(|fpr| (*fpr).to_owned()))
        {
            if !fingerprints.contains(&fpr) {
                fingerprints.push(fpr);
            }
        }
        if fingerprints.is_empty() {
            return Err(UploadError::KeyImport {
                key: key.name().to_owned(),
                reason: status.summary(),
            });
        }
        debug!("imported {} as {}", key.name(), fingerprints.join(", "));
        Ok(fingerprints)
    }

    /// Fingerprints of every primary key in the keyring.
    ///
    /// # Errors
    ///
    /// Returns an error when gpg cannot be run.
    pub fn fingerprints(&self) -> Result<Vec<String>> {
        let args = self.base_args();
        let mut full: Vec<&str> = args.iter().map(String::as_str).collect();
        full.extend(["--with-colons", "--list-keys"]);
        let output = self.executor.run("gpg", &full)?;
        let listing = String::from_utf8_lossy(&output.stdout);
        let mut fingerprints = Vec::new();
        let mut after_primary = false;
        // Only the fingerprint line right after a `pub` record names a primary key.
        for line in listing.lines() {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.first().copied() {
                Some("pub") => after_primary = true,
                Some("fpr") if after_primary => {
                    if let Some(fpr) = fields.get(9) {
                        fingerprints.push((*fpr).to_owned());
                    }
                    after_primary = false;
                }
                _ => {}
            }
        }
        Ok(fingerprints)
    }

    /// Encrypts `input` to every recipient, embedding `embedded_name`.
    ///
    /// Imported keys are trusted unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error when gpg cannot be run; a gpg failure is reported
    /// through the returned status.
    pub fn encrypt(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        recipients: &[String],
        embedded_name: &str,
    ) -> Result<GpgStatus> {
        let mut args = vec![
            "--trust-model",
            "always",
            "--set-filename",
            embedded_name,
            "--output",
            output.as_str(),
            "--encrypt",
        ];
        for recipient in recipients {
            args.extend(["--recipient", recipient.as_str()]);
        }
        args.push(input.as_str());
        self.gpg(&args, "END_ENCRYPTION")
    }

    /// Produces a binary signature of `input` that wraps the content.
    ///
    /// # Errors
    ///
    /// Returns an error when gpg cannot be run; a gpg failure is reported
    /// through the returned status.
    pub fn sign(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        embedded_name: &str,
    ) -> Result<GpgStatus> {
        self.gpg(
            &[
                "--set-filename",
                embedded_name,
                "--output",
                output.as_str(),
                "--sign",
                input.as_str(),
            ],
            "SIG_CREATED",
        )
    }

    /// Decrypts `input` with a secret key held by this keyring.
    ///
    /// # Errors
    ///
    /// Returns an error when gpg cannot be run; a gpg failure is reported
    /// through the returned status.
    pub fn decrypt(&self, input: &Utf8Path, output: &Utf8Path) -> Result<GpgStatus> {
        self.gpg(
            &["--output", output.as_str(), "--decrypt", input.as_str()],
            "DECRYPTION_OKAY",
        )
    }

    /// Checks a signed message and writes the signed content to `output`.
    ///
    /// Returns the primary fingerprint of the signer when the signature is
    /// valid.
    ///
    /// # Errors
    ///
    /// Returns an error when gpg cannot be run.
    pub fn verify(&self, input: &Utf8Path, output: &Utf8Path) -> Result<Option<String>> {
        let status = self.gpg(
            &["--output", output.as_str(), "--decrypt", input.as_str()],
            "VALIDSIG",
        )?;
        if !status.succeeded() {
            debug!("signature check failed: {}", status.summary());
            return Ok(None);
        }
        Ok(status
            .arguments("VALIDSIG")
            .next()
            .and_then(|args| args.last().map(|fpr| (*fpr).to_owned())))
    }

    fn base_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--homedir",
            self.home.path().as_str(),
            "--batch",
            "--yes",
            "--no-tty",
            "--status-fd",
            "1",
            "--pinentry-mode",
            "loopback",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        if let Some(file) = &self.passphrase_file {
            args.push("--passphrase-file".to_owned());
            args.push(file.to_string());
        }
        args
    }

    fn gpg(&self, args: &[&str], marker: &str) -> Result<GpgStatus> {
        let base = self.base_args();
        let mut full: Vec<&str> = base.iter().map(String::as_str).collect();
        full.extend_from_slice(args);
        let output = self.executor.run("gpg", &full)?;
        let status = GpgStatus::from_output(&output, marker);
        if !status.succeeded() {
            debug!("gpg {} did not report {marker}", args.join(" "));
        }
        Ok(status)
    }
}

impl Drop for Keyring<'_> {
    fn drop(&mut self) {
        let home = self.home.path().as_str();
        if let Err(err) = self
            .executor
            .run("gpgconf", &["--homedir", home, "--kill", "gpg-agent"])
        {
            warn!("unable to stop gpg-agent for {home}: {err}");
        }
    }
}
