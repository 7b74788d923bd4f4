//! The upload run: availability, orchestration, notification and the final
//! verdict.

use crate::availability::update_availability;
use crate::destinations::DeliveryDestinations;
use crate::error::{Result, UploadError};
use crate::key_store::KeyStore;
use crate::notify::{Notifier, NotifySettings, notify_all};
use crate::orchestrator::{SenderFactory, UploadResult, process_clients};
use crate::records::DeliveryRecords;
use crate::transport::Transport;
use courier_common::Client;
use log::{error, info, warn};

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No errors were recorded.
    Succeeded,
    /// Only non-severe errors were recorded.
    SucceededWithWarnings,
}

/// Collaborators of one upload run.
pub struct UploadRun<'a> {
    /// Delivery and client records.
    pub records: &'a dyn DeliveryRecords,
    /// Per-client routing.
    pub destinations: &'a dyn DeliveryDestinations,
    /// Key store queried by the availability check.
    pub keys: &'a dyn KeyStore,
    /// Transport queried by the availability check.
    pub transport: &'a dyn Transport,
    /// Builds the senders of each client.
    pub factory: &'a dyn SenderFactory,
    /// Channel announcing uploads.
    pub notifier: &'a dyn Notifier,
    /// Notification rendering settings.
    pub settings: &'a NotifySettings,
}

impl std::fmt::Debug for UploadRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRun")
            .field("settings", self.settings)
            .finish_non_exhaustive()
    }
}

/// Active clients, narrowed to `filter` when given.
///
/// # Errors
///
/// Returns an error when the record store cannot be read.
pub fn selected_clients(records: &dyn DeliveryRecords, filter: Option<&str>) -> Result<Vec<Client>> {
    let clients = records.active_clients()?;
    let Some(code) = filter else {
        return Ok(clients);
    };
    let selected: Vec<Client> = clients.into_iter().filter(|c| c.code == code).collect();
    if selected.is_empty() {
        warn!("no active client with code {code}");
    }
    Ok(selected)
}

/// Logs the run result and turns it into the final verdict.
///
/// # Errors
///
/// Returns [`UploadError::RunFailed`] when any recorded error is severe.
pub fn postprocess(result: &UploadResult) -> Result<RunOutcome> {
    if result.sent.is_empty() {
        info!("No deliveries were uploaded");
    } else {
        for delivery in &result.sent {
            info!("uploaded {}", delivery.gav);
        }
    }

    for err in &result.errors {
        if err.is_severe() {
            error!("{err}");
        } else {
            warn!("{err}");
        }
    }

    let severe = result.errors.iter().filter(|err| err.is_severe()).count();
    if severe > 0 {
        return Err(UploadError::RunFailed {
            severe,
            total: result.errors.len(),
        });
    }
    if result.errors.is_empty() {
        Ok(RunOutcome::Succeeded)
    } else {
        Ok(RunOutcome::SucceededWithWarnings)
    }
}

/// Runs the availability check and uploads every pending delivery of the
/// selected clients.
///
/// # Errors
///
/// Returns environment errors, which abort the run, and
/// [`UploadError::RunFailed`] when severe errors were recorded.
pub fn perform_upload(run: &UploadRun<'_>, client_filter: Option<&str>) -> Result<RunOutcome> {
    let clients = selected_clients(run.records, client_filter)?;
    info!("processing {} client(s)", clients.len());

    for err in update_availability(run.records, run.keys, run.transport, &clients) {
        if err.is_fatal() {
            return Err(err);
        }
    }

    let result = process_clients(&clients, run.records, run.destinations, run.factory)?;
    notify_all(
        run.notifier,
        run.records,
        run.destinations,
        &result.sent,
        run.settings,
    );
    postprocess(&result)
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
