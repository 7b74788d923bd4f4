//! Delivery record store.
//!
//! The record store knows which clients exist, which deliveries await
//! distribution, and each client's upload options. [`JsonRecordStore`] keeps
//! all of it in one JSON document and rewrites the document after every
//! change.

use crate::error::{Result, UploadError};
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::{Client, ClientOptions, Coordinate, Delivery};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Read and write access to delivery records.
#[cfg_attr(test, mockall::automock)]
pub trait DeliveryRecords {
    /// Approved deliveries of `client` that are neither uploaded nor failed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn pending_deliveries(&self, client: &str) -> Result<Vec<Delivery>>;

    /// Sets the uploaded flag of the delivery with coordinate `gav`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be updated.
    fn mark_uploaded(&self, gav: &Coordinate) -> Result<()>;

    /// Stored options of `client`, if a record exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn client_options(&self, client: &str) -> Result<Option<ClientOptions>>;

    /// Creates or replaces the options record of `client`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be updated.
    fn save_client_options(&self, client: &str, options: ClientOptions) -> Result<()>;

    /// Every client flagged active.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn active_clients(&self) -> Result<Vec<Client>>;

    /// Notification addresses of `client`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn client_addresses(&self, client: &str) -> Result<Vec<String>>;
}

/// Serialised content of the record file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordData {
    /// Known clients.
    #[serde(default)]
    pub clients: Vec<Client>,
    /// Known deliveries.
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
}

/// Record store backed by a JSON file, or by memory only.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: Option<Utf8PathBuf>,
    data: RefCell<RecordData>,
}

impl JsonRecordStore {
    /// Loads the record file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::RecordStore`] when the file cannot be read or
    /// parsed.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| record_error(path, &err))?;
        let data: RecordData =
            serde_json::from_str(&text).map_err(|err| record_error(path, &err))?;
        debug!(
            "loaded {} clients and {} deliveries from {path}",
            data.clients.len(),
            data.deliveries.len()
        );
        Ok(Self {
            path: Some(path.to_owned()),
            data: RefCell::new(data),
        })
    }

    /// Creates a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(data: RecordData) -> Self {
        Self {
            path: None,
            data: RefCell::new(data),
        }
    }

    /// Current state of the delivery with coordinate `gav`.
    #[must_use]
    pub fn delivery(&self, gav: &Coordinate) -> Option<Delivery> {
        self.data
            .borrow()
            .deliveries
            .iter()
            .find(|d| &d.gav == gav)
            .cloned()
    }

    /// Snapshot of every record.
    #[must_use]
    pub fn snapshot(&self) -> RecordData {
        self.data.borrow().clone()
    }

    fn set_uploaded(&self, gav: &Coordinate, uploaded: bool) {
        if let Some(delivery) = self
            .data
            .borrow_mut()
            .deliveries
            .iter_mut()
            .find(|d| &d.gav == gav)
        {
            delivery.flags.uploaded = uploaded;
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&*self.data.borrow())
            .map_err(|err| record_error(path, &err))?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, text).map_err(|err| record_error(path, &err))?;
        std::fs::rename(&staging, path).map_err(|err| record_error(path, &err))
    }
}

fn record_error(path: &Utf8Path, err: &dyn std::fmt::Display) -> UploadError {
    UploadError::RecordStore {
        path: path.to_owned(),
        reason: err.to_string(),
    }
}

impl DeliveryRecords for JsonRecordStore {
    fn pending_deliveries(&self, client: &str) -> Result<Vec<Delivery>> {
        Ok(self
            .data
            .borrow()
            .deliveries
            .iter()
            .filter(|d| d.client_code() == client && d.is_pending())
            .cloned()
            .collect())
    }

    fn mark_uploaded(&self, gav: &Coordinate) -> Result<()> {
        {
            let mut data = self.data.borrow_mut();
            let Some(delivery) = data.deliveries.iter_mut().find(|d| &d.gav == gav) else {
                return Err(UploadError::Store {
                    operation: "mark uploaded",
                    delivery: gav.to_string(),
                    reason: "no such delivery record".to_owned(),
                });
            };
            delivery.flags.uploaded = true;
        }
        self.persist().map_err(|err| {
            self.set_uploaded(gav, false);
            UploadError::Store {
                operation: "mark uploaded",
                delivery: gav.to_string(),
                reason: err.to_string(),
            }
        })
    }

    fn client_options(&self, client: &str) -> Result<Option<ClientOptions>> {
        Ok(self
            .data
            .borrow()
            .clients
            .iter()
            .find(|c| c.code == client)
            .and_then(|c| c.options))
    }

    fn save_client_options(&self, client: &str, options: ClientOptions) -> Result<()> {
        {
            let mut data = self.data.borrow_mut();
            let Some(record) = data.clients.iter_mut().find(|c| c.code == client) else {
                return Err(UploadError::Store {
                    operation: "save options",
                    delivery: client.to_owned(),
                    reason: "no such client record".to_owned(),
                });
            };
            record.options = Some(options);
        }
        self.persist()
    }

    fn active_clients(&self) -> Result<Vec<Client>> {
        Ok(self
            .data
            .borrow()
            .clients
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    fn client_addresses(&self, client: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .borrow()
            .clients
            .iter()
            .find(|c| c.code == client)
            .map(|c| c.email_addresses.clone())
            .unwrap_or_default())
    }
}
