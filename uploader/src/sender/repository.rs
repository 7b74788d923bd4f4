//! Sender publishing clean archives to a secondary repository.

use super::{Connections, DeliverySender, fetch_from_store};
use crate::error::{Result, UploadError};
use crate::scratch::Scratch;
use crate::transform::{DeliveryTransform, SOURCE_PACKAGING};
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::{Client, Delivery};

/// Pushes the clean archive, unchanged, to a client's secondary repository.
#[derive(Debug)]
pub struct RepositorySender<'a> {
    client: String,
    repository: String,
    transform: DeliveryTransform<'a>,
    connections: Connections<'a>,
}

impl<'a> RepositorySender<'a> {
    /// Creates a sender publishing to `repository`.
    #[must_use]
    pub fn new(connections: Connections<'a>, client: &Client, repository: &str) -> Self {
        Self {
            client: client.code.clone(),
            repository: repository.to_owned(),
            transform: DeliveryTransform::Passthrough,
            connections,
        }
    }
}

impl DeliverySender for RepositorySender<'_> {
    fn client_code(&self) -> &str {
        &self.client
    }

    fn resolve_destination(&self) -> String {
        self.repository.clone()
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
        let published = delivery.gav.with_packaging(SOURCE_PACKAGING);
        let store = self.connections.repositories;
        store.push(&published, destination, processed)?;
        if store.exists(&published, destination)? {
            Ok(())
        } else {
            Err(UploadError::Store {
                operation: "exists",
                delivery: published.to_string(),
                reason: format!("not visible in {destination} after upload"),
            })
        }
    }
}
