//! Delivery senders.
//!
//! A sender is bound to one client and knows where that client's deliveries
//! go and how they are transformed on the way. The lifecycle shared by every
//! sender lives in [`send_delivery`]; senders only supply the individual
//! steps through [`DeliverySender`].
//!
//! - [`EncryptingSender`] encrypts to the client's keys and drops the result
//!   into `<client>/TO_BNK`.
//! - [`SigningSender`] signs with the system key and drops the result into
//!   `PUBLIC/CriticalPatch`.
//! - [`RepositorySender`] publishes the clean archive to a secondary
//!   repository.

mod encrypting;
mod repository;
mod signing;

pub use encrypting::{ENCRYPTED_DROP, EncryptingSender};
pub use repository::RepositorySender;
pub use signing::{SIGNED_DROP, SigningSender};

use crate::artifact_store::ArtifactStore;
use crate::error::{Result, UploadError};
use crate::gpg::{CommandExecutor, KeyMaterial};
use crate::key_store::KeyStore;
use crate::records::DeliveryRecords;
use crate::scratch::Scratch;
use crate::transform::{DELIVERED_PACKAGING, SOURCE_PACKAGING};
use crate::transport::Transport;
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::Delivery;
use log::{debug, info, warn};

/// Shared connections used by every sender of a run.
#[derive(Clone, Copy)]
pub struct Connections<'a> {
    /// Store holding the clean archives.
    pub artifacts: &'a dyn ArtifactStore,
    /// Store receiving secondary-repository uploads.
    pub repositories: &'a dyn ArtifactStore,
    /// Store holding client public keys.
    pub keys: &'a dyn KeyStore,
    /// Outbound file drop.
    pub transport: &'a dyn Transport,
    /// Runner for the gpg tool chain.
    pub gpg: &'a dyn CommandExecutor,
}

impl std::fmt::Debug for Connections<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections").finish_non_exhaustive()
    }
}

/// Location and passphrase of the system's own key pair.
#[derive(Clone)]
pub struct SystemKey {
    /// Armored key file holding the public and private key.
    pub path: Utf8PathBuf,
    /// Passphrase of the private key.
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for SystemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemKey")
            .field("path", &self.path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SystemKey {
    /// Reads the key file afresh.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SystemKeyMissing`] when the file does not exist.
    pub fn load(&self) -> Result<KeyMaterial> {
        KeyMaterial::read_system_key(&self.path, self.passphrase.clone())
    }
}

/// The steps of sending one delivery.
pub trait DeliverySender {
    /// Code of the client this sender serves.
    fn client_code(&self) -> &str;

    /// Where deliveries are placed.
    fn resolve_destination(&self) -> String;

    /// Retrieves the clean archive of `delivery` into `work`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SourceNotFound`] when the archive is missing.
    fn fetch_clean(&self, delivery: &Delivery, work: &Scratch) -> Result<Utf8PathBuf>;

    /// Transforms the clean archive and returns the path to deliver.
    ///
    /// # Errors
    ///
    /// Returns an encryption-class error when the transform fails.
    fn transform(&self, delivery: &Delivery, clean: &Utf8Path, work: &Scratch)
    -> Result<Utf8PathBuf>;

    /// Places `processed` at `destination`.
    ///
    /// # Errors
    ///
    /// Returns transport, client-setup or store errors.
    fn deliver(&self, delivery: &Delivery, processed: &Utf8Path, destination: &str) -> Result<()>;
}

/// Sends one delivery through `sender` and marks it uploaded.
///
/// The delivery is marked uploaded only after every step succeeded. Sending a
/// delivery again overwrites the previous copy at the destination.
///
/// # Errors
///
/// Returns [`UploadError::WrongClient`] when the delivery belongs to another
/// client, otherwise the first error raised by a step.
pub fn send_delivery(
    sender: &dyn DeliverySender,
    delivery: &Delivery,
    records: &dyn DeliveryRecords,
) -> Result<()> {
    publish_delivery(sender, delivery)?;
    records.mark_uploaded(&delivery.gav)
}

/// Runs the steps of [`send_delivery`] without touching the records.
///
/// # Errors
///
/// Returns [`UploadError::WrongClient`] when the delivery belongs to another
/// client, otherwise the first error raised by a step.
pub fn publish_delivery(sender: &dyn DeliverySender, delivery: &Delivery) -> Result<()> {
    let client = sender.client_code();
    if delivery.client_code() != client {
        return Err(UploadError::WrongClient {
            delivery: delivery.gav.to_string(),
            owner: delivery.client_code().to_owned(),
            client: client.to_owned(),
        });
    }

    let destination = sender.resolve_destination();
    info!("sending {} to {destination}", delivery.gav);
    let work = Scratch::new("courier-delivery")?;
    let clean = sender.fetch_clean(delivery, &work)?;
    let processed = sender.transform(delivery, &clean, &work)?;
    sender.deliver(delivery, &processed, &destination)?;
    info!("{} delivered to {destination}", delivery.gav);
    Ok(())
}

/// Fetches the `zip` archive of `delivery` from `store` into `work`.
///
/// # Errors
///
/// Returns [`UploadError::SourceNotFound`] when the store lacks the archive.
pub fn fetch_from_store(
    store: &dyn ArtifactStore,
    delivery: &Delivery,
    work: &Scratch,
) -> Result<Utf8PathBuf> {
    let source = delivery.gav.with_packaging(SOURCE_PACKAGING);
    let path = work.file(&source.filename());
    store.fetch(&source, &path)?;
    debug!("fetched {source} into {path}");
    Ok(path)
}

/// File name a delivery is dropped under.
#[must_use]
pub fn delivered_name(delivery: &Delivery) -> String {
    delivery.gav.with_packaging(DELIVERED_PACKAGING).filename()
}

/// Moves `processed` into `destination` on the transport, replacing any
/// previous copy.
///
/// # Errors
///
/// Returns [`UploadError::DestinationMissing`] when the directory is absent,
/// [`UploadError::TransportPermission`] when access is refused and
/// [`UploadError::Transport`] otherwise.
pub fn deliver_to_transport(
    transport: &dyn Transport,
    delivery: &Delivery,
    processed: &Utf8Path,
    destination: &str,
) -> Result<()> {
    let destination = destination.trim_end_matches('/');
    let target = format!("{destination}/{}", delivered_name(delivery));
    transport.reconnect()?;
    transport.open_dir(destination)?;
    if transport.exists(&target)? {
        warn!("{target} already exists and will be replaced");
        transport.remove(&target)?;
    }
    transport.move_in(processed, &target)?;
    Ok(())
}
