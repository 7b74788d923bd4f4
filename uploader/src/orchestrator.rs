//! Per-client and per-run orchestration.
//!
//! Results are threaded through the loops as [`UploadResult`] values and
//! merged by concatenation. Failures are isolated at two levels: a failed
//! delivery does not stop the client's other deliveries, and a client whose
//! setup is broken does not stop other clients. Only environment errors
//! abort the run.

use crate::destinations::DeliveryDestinations;
use crate::error::{ErrorKind, Result, UploadError};
use crate::records::DeliveryRecords;
use crate::sender::{
    Connections, DeliverySender, EncryptingSender, RepositorySender, SigningSender, SystemKey,
    publish_delivery, send_delivery,
};
use courier_common::{Client, Delivery};
use log::{debug, error, info, warn};

/// Deliveries sent and errors recorded by some part of a run.
#[derive(Debug, Default)]
pub struct UploadResult {
    /// Deliveries sent successfully.
    pub sent: Vec<Delivery>,
    /// Errors recorded along the way.
    pub errors: Vec<UploadError>,
}

impl UploadResult {
    /// A result holding a single error.
    #[must_use]
    pub fn from_error(error: UploadError) -> Self {
        Self {
            sent: Vec::new(),
            errors: vec![error],
        }
    }

    /// Concatenates two results.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.sent.extend(other.sent);
        self.errors.extend(other.errors);
        self
    }
}

/// Builds the senders of one client.
pub trait SenderFactory {
    /// Sender encrypting to the client's keys.
    ///
    /// # Errors
    ///
    /// Returns client-setup, encryption or environment errors raised while
    /// preparing keys.
    fn encrypting<'s>(
        &'s self,
        client: &Client,
        override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>>;

    /// Sender signing with the system key.
    ///
    /// # Errors
    ///
    /// Returns encryption or environment errors raised while preparing keys.
    fn signing<'s>(
        &'s self,
        client: &Client,
        override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>>;

    /// Sender publishing to a secondary repository.
    ///
    /// # Errors
    ///
    /// Returns an error when the sender cannot be prepared.
    fn repository<'s>(
        &'s self,
        client: &Client,
        repository: &str,
    ) -> Result<Box<dyn DeliverySender + 's>>;
}

/// Factory building the gpg-backed senders.
#[derive(Debug, Clone)]
pub struct GpgSenderFactory<'a> {
    connections: Connections<'a>,
    system_key: SystemKey,
}

impl<'a> GpgSenderFactory<'a> {
    /// Creates a factory over the run's connections.
    #[must_use]
    pub fn new(connections: Connections<'a>, system_key: SystemKey) -> Self {
        Self {
            connections,
            system_key,
        }
    }
}

impl SenderFactory for GpgSenderFactory<'_> {
    fn encrypting<'s>(
        &'s self,
        client: &Client,
        override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        let sender =
            EncryptingSender::new(self.connections, client, &self.system_key, override_directory)?;
        Ok(Box::new(sender))
    }

    fn signing<'s>(
        &'s self,
        client: &Client,
        override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        let sender =
            SigningSender::new(self.connections, client, &self.system_key, override_directory)?;
        Ok(Box::new(sender))
    }

    fn repository<'s>(
        &'s self,
        client: &Client,
        repository: &str,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        Ok(Box::new(RepositorySender::new(
            self.connections,
            client,
            repository,
        )))
    }
}

/// Pending deliveries of `client` whose archive was not removed from the
/// artifact store.
///
/// # Errors
///
/// Returns an error when the record store cannot be read.
pub fn sendable_deliveries(records: &dyn DeliveryRecords, client: &str) -> Result<Vec<Delivery>> {
    let (sendable, removed): (Vec<Delivery>, Vec<Delivery>) = records
        .pending_deliveries(client)?
        .into_iter()
        .partition(Delivery::is_sendable);
    for delivery in &removed {
        warn!("{} was removed from the artifact store; skipping", delivery.gav);
    }
    Ok(sendable)
}

/// What happens to the record of a delivery that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Mark the delivery uploaded.
    MarkUploaded,
    /// Leave the delivery pending for the route that decides its state.
    LeavePending,
}

/// Sends every delivery through `sender`.
///
/// Delivery-level errors are recorded and the next delivery is attempted. A
/// client-setup error stops this client's remaining deliveries.
///
/// # Errors
///
/// Returns environment errors, which abort the run.
pub fn process_client_deliveries(
    sender: &dyn DeliverySender,
    deliveries: &[Delivery],
    records: &dyn DeliveryRecords,
    completion: Completion,
) -> Result<UploadResult> {
    let mut result = UploadResult::default();
    for delivery in deliveries {
        let outcome = match completion {
            Completion::MarkUploaded => send_delivery(sender, delivery, records),
            Completion::LeavePending => publish_delivery(sender, delivery),
        };
        match outcome {
            Ok(()) => result.sent.push(delivery.clone()),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) if err.kind() == ErrorKind::ClientSetup => {
                error!("{}: {err}; skipping remaining deliveries", sender.client_code());
                result.errors.push(err);
                break;
            }
            Err(err) => {
                error!("{}: {err}", delivery.gav);
                result.errors.push(err);
            }
        }
    }
    Ok(result)
}

/// Processes every pending delivery of one client.
///
/// # Errors
///
/// Returns environment errors, which abort the run.
pub fn process_client(
    client: &Client,
    records: &dyn DeliveryRecords,
    destinations: &dyn DeliveryDestinations,
    factory: &dyn SenderFactory,
) -> Result<UploadResult> {
    let options = courier_common::effective_options(records.client_options(&client.code)?);
    if !options.can_receive {
        warn!("{} cannot receive deliveries; skipping", client.code);
        return Ok(UploadResult::default());
    }

    let deliveries = sendable_deliveries(records, &client.code)?;
    if deliveries.is_empty() {
        debug!("{} has no pending deliveries", client.code);
        return Ok(UploadResult::default());
    }
    info!("{}: {} pending delivery(ies)", client.code, deliveries.len());

    let config = destinations.config_for(&client.code);
    // With the transport enabled the primary route alone marks deliveries.
    let secondary_completion = if config.enabled {
        Completion::LeavePending
    } else {
        Completion::MarkUploaded
    };
    let mut secondary = UploadResult::default();
    for repository in &config.repositories {
        let outcome = factory.repository(client, repository).and_then(|sender| {
            process_client_deliveries(&*sender, &deliveries, records, secondary_completion)
        });
        match outcome {
            Ok(result) => secondary = secondary.merge(result),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => secondary.errors.push(err),
        }
    }

    if !config.enabled {
        info!("{}: transport deliveries disabled", client.code);
        return Ok(secondary);
    }
    for err in &secondary.errors {
        error!("{}: secondary upload failed: {err}", client.code);
    }

    let override_directory = config.override_directory.as_deref();
    let sender = if options.should_encrypt {
        factory.encrypting(client, override_directory)
    } else {
        factory.signing(client, override_directory)
    };
    match sender {
        Ok(sender) => {
            process_client_deliveries(&*sender, &deliveries, records, Completion::MarkUploaded)
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            error!("{}: {err}", client.code);
            Ok(UploadResult::from_error(err))
        }
    }
}

/// Processes every client in turn and merges their results.
///
/// # Errors
///
/// Returns environment errors, which abort the run.
pub fn process_clients(
    clients: &[Client],
    records: &dyn DeliveryRecords,
    destinations: &dyn DeliveryDestinations,
    factory: &dyn SenderFactory,
) -> Result<UploadResult> {
    let mut result = UploadResult::default();
    for client in clients {
        result = result.merge(process_client(client, records, destinations, factory)?);
    }
    Ok(result)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
