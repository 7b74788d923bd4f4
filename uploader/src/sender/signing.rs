//! Sender signing deliveries with the system key.

use super::{Connections, DeliverySender, SystemKey, deliver_to_transport, fetch_from_store};
use crate::error::Result;
use crate::scratch::Scratch;
use crate::transform::{DeliveryTransform, SignWith};
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::{Client, Delivery};
use log::info;

/// Shared directory receiving signed deliveries.
pub const SIGNED_DROP: &str = "PUBLIC/CriticalPatch";

/// Signs with the system key and drops the result into the shared public
/// directory.
#[derive(Debug)]
pub struct SigningSender<'a> {
    client: String,
    override_directory: Option<String>,
    transform: DeliveryTransform<'a>,
    connections: Connections<'a>,
}

impl<'a> SigningSender<'a> {
    /// Builds the sender, importing the system key and proving its passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SystemKeyMissing`](crate::error::UploadError::SystemKeyMissing)
    /// when the key file is missing and an encryption-class error when the key
    /// does not import or its passphrase does not unlock it.
    pub fn new(
        connections: Connections<'a>,
        client: &Client,
        system_key: &SystemKey,
        override_directory: Option<&str>,
    ) -> Result<Self> {
        let own = system_key.load()?;
        let transform = DeliveryTransform::SignWith(SignWith::new(connections.gpg, &own)?);
        info!("{}: signing deliveries with {}", client.code, own.name());
        Ok(Self {
            client: client.code.clone(),
            override_directory: override_directory.map(str::to_owned),
            transform,
            connections,
        })
    }
}

impl DeliverySender for SigningSender<'_> {
    fn client_code(&self) -> &str {
        &self.client
    }

    fn resolve_destination(&self) -> String {
        self.override_directory
            .clone()
            .unwrap_or_else(|| SIGNED_DROP.to_owned())
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
