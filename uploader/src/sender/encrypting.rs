//! Sender encrypting deliveries to the client's public keys.

use super::{Connections, DeliverySender, SystemKey, deliver_to_transport, fetch_from_store};
use crate::error::{Result, UploadError};
use crate::key_store::{KeyStoreError, client_key_dir};
use crate::scratch::Scratch;
use crate::transform::{DeliveryTransform, EncryptTo};
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::{Client, Delivery};
use log::info;

/// Directory below the client code receiving encrypted deliveries.
pub const ENCRYPTED_DROP: &str = "TO_BNK";

/// Encrypts to every client key plus the system key and drops the result
/// into `<client>/TO_BNK`.
#[derive(Debug)]
pub struct EncryptingSender<'a> {
    client: String,
    override_directory: Option<String>,
    transform: DeliveryTransform<'a>,
    connections: Connections<'a>,
}

impl<'a> EncryptingSender<'a> {
    /// Builds the sender and its keyring.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SystemKeyMissing`] when the system key file is
    /// missing, [`UploadError::KeyDirectoryMissing`] or
    /// [`UploadError::NoClientKeys`] when the client has no keys, and
    /// [`UploadError::KeyImport`] when a key does not import.
    pub fn new(
        connections: Connections<'a>,
        client: &Client,
        system_key: &SystemKey,
        override_directory: Option<&str>,
    ) -> Result<Self> {
        let own = system_key.load()?;
        let dir = client_key_dir(&client.country, &client.code);
        let paths = connections
            .keys
            .list_keys(&dir)
            .map_err(|err| key_store_error(&client.code, err))?;
        if paths.is_empty() {
            return Err(UploadError::NoClientKeys {
                client: client.code.clone(),
                path: dir,
            });
        }

        let mut keys = Vec::with_capacity(paths.len() + 1);
        for path in &paths {
            keys.push(
                connections
                    .keys
                    .read_key(path)
                    .map_err(|err| key_store_error(&client.code, err))?,
            );
        }
        keys.push(own);
        info!(
            "{}: encrypting to {} client key(s) from {dir}",
            client.code,
            paths.len()
        );

        let transform = DeliveryTransform::EncryptTo(EncryptTo::new(connections.gpg, &keys)?);
        Ok(Self {
            client: client.code.clone(),
            override_directory: override_directory.map(str::to_owned),
            transform,
            connections,
        })
    }
}

fn key_store_error(client: &str, err: KeyStoreError) -> UploadError {
    match err {
        KeyStoreError::DirectoryMissing { path } => UploadError::KeyDirectoryMissing {
            client: client.to_owned(),
            path,
        },
        KeyStoreError::Io { path, source } => UploadError::KeyImport {
            key: path,
            reason: source.to_string(),
        },
    }
}

impl DeliverySender for EncryptingSender<'_> {
    fn client_code(&self) -> &str {
        &self.client
    }

    fn resolve_destination(&self) -> String {
        self.override_directory
            .clone()
            .unwrap_or_else(|| format!("{}/{ENCRYPTED_DROP}", self.client))
    }

    fn fetch_clean(&self, delivery: &Delivery, work: &Scratch) -> Result<Utf8PathBuf> {
        fetch_from_store(self.connections.artifacts, delivery, work)
    }

    fn transform(
        &self,
        delivery: &Delivery,
        clean: &Utf8Path,
        work: &Scratch,
    ) -> Result<Utf8PathBuf> {
        self.transform.apply(&delivery.gav, clean, work)
    }

    fn deliver(&self, delivery: &Delivery, processed: &Utf8Path, destination: &str) -> Result<()> {
        deliver_to_transport(self.connections.transport, delivery, processed, destination)
    }
}
