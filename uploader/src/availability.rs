//! Client availability checks.
//!
//! A client that receives encrypted deliveries can only be served when its
//! public keys are in the key store and its drop exists on the transport.
//! The check stores the outcome as the client's `can_receive` option so the
//! orchestrator skips unreachable clients without raising errors.

use crate::error::{Result, UploadError};
use crate::key_store::{KeyStore, KeyStoreError, client_key_dir};
use crate::records::DeliveryRecords;
use crate::sender::ENCRYPTED_DROP;
use crate::transport::Transport;
use courier_common::{Client, ClientOptions, effective_options};
use log::{debug, error, info, warn};

/// Whether `client` has at least one public key in the key store.
///
/// # Errors
///
/// Returns [`UploadError::KeyImport`] when the key directory cannot be read.
pub fn has_client_keys(keys: &dyn KeyStore, client: &Client) -> Result<bool> {
    let dir = client_key_dir(&client.country, &client.code);
    match keys.list_keys(&dir) {
        Ok(found) => Ok(!found.is_empty()),
        Err(KeyStoreError::DirectoryMissing { .. }) => Ok(false),
        Err(err) => Err(UploadError::KeyImport {
            key: dir,
            reason: err.to_string(),
        }),
    }
}

/// Whether the encrypted drop of `client` exists on the transport.
///
/// # Errors
///
/// Returns a transport error when the transport cannot be queried.
pub fn has_encrypted_drop(transport: &dyn Transport, client: &Client) -> Result<bool> {
    transport.reconnect()?;
    Ok(transport.exists(&format!("{}/{ENCRYPTED_DROP}", client.code))?)
}

/// Recomputes and stores the options of one client.
///
/// Clients receiving signed deliveries are always available. The options
/// record is created when the client has none.
///
/// # Errors
///
/// Returns an error when the key store, the transport or the record store
/// fails.
pub fn update_client_availability(
    records: &dyn DeliveryRecords,
    keys: &dyn KeyStore,
    transport: &dyn Transport,
    client: &Client,
) -> Result<ClientOptions> {
    let current = effective_options(records.client_options(&client.code)?);
    let can_receive = if current.should_encrypt {
        let keys_present = has_client_keys(keys, client)?;
        if !keys_present {
            warn!("{}: no public keys found", client.code);
        }
        // The drop is only checked when keys exist.
        keys_present && {
            let drop_present = has_encrypted_drop(transport, client)?;
            if !drop_present {
                warn!("{}: no {ENCRYPTED_DROP} directory on the transport", client.code);
            }
            drop_present
        }
    } else {
        true
    };

    let updated = ClientOptions {
        can_receive,
        ..current
    };
    records.save_client_options(&client.code, updated)?;
    if updated.can_receive == current.can_receive {
        debug!("{}: can_receive = {can_receive}", client.code);
    } else {
        info!("{}: can_receive changed to {can_receive}", client.code);
    }
    Ok(updated)
}

/// Updates the availability of every client in `clients`.
///
/// A failure for one client is logged and does not stop the others; the
/// failures are returned.
pub fn update_availability(
    records: &dyn DeliveryRecords,
    keys: &dyn KeyStore,
    transport: &dyn Transport,
    clients: &[Client],
) -> Vec<UploadError> {
    let mut errors = Vec::new();
    for client in clients {
        if let Err(err) = update_client_availability(records, keys, transport, client) {
            error!("{}: availability check failed: {err}", client.code);
            errors.push(err);
        }
    }
    errors
}
