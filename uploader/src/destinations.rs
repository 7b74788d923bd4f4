//! Per-client delivery routing.
//!
//! Routing lives in a TOML file with one array of tables per client code:
//!
//! ```toml
//! [[ACME]]
//! transport = { enabled = true, directory = "ACME/incoming" }
//!
//! [[ACME]]
//! repository = { target = "acme-releases" }
//! ```
//!
//! Clients without an entry use the default transport route and no
//! secondary repository.

use crate::error::{Result, UploadError};
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;

/// Outbound transport route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportRoute {
    /// False disables transport deliveries for the client.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory replacing the default destination.
    #[serde(default)]
    pub directory: Option<String>,
}

/// Secondary artifact-store route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryRoute {
    /// Repository receiving the client's archives.
    pub target: String,
}

/// One routing entry of a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Deliver over the transport.
    Transport(TransportRoute),
    /// Publish to a secondary repository.
    Repository(RepositoryRoute),
}

/// Routing of one client, reduced to what the orchestrator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Whether transport deliveries are enabled.
    pub enabled: bool,
    /// Directory replacing the sender's default destination.
    pub override_directory: Option<String>,
    /// Secondary repositories, in configuration order.
    pub repositories: Vec<String>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            override_directory: None,
            repositories: Vec::new(),
        }
    }
}

impl DestinationConfig {
    /// Reduces routing entries: the first transport entry wins, every
    /// repository entry is kept.
    #[must_use]
    pub fn from_destinations(destinations: &[Destination]) -> Self {
        let transport = destinations.iter().find_map(|d| match d {
            Destination::Transport(route) => Some(route),
            Destination::Repository(_) => None,
        });
        Self {
            enabled: transport.is_none_or(|route| route.enabled),
            override_directory: transport.and_then(|route| route.directory.clone()),
            repositories: destinations
                .iter()
                .filter_map(|d| match d {
                    Destination::Repository(route) => Some(route.target.clone()),
                    Destination::Transport(_) => None,
                })
                .collect(),
        }
    }
}

/// Source of per-client routing.
#[cfg_attr(test, mockall::automock)]
pub trait DeliveryDestinations {
    /// Routing entries of `client`; empty when none are configured.
    fn destinations_for(&self, client: &str) -> Vec<Destination>;

    /// Reduced routing of `client`.
    fn config_for(&self, client: &str) -> DestinationConfig {
        DestinationConfig::from_destinations(&self.destinations_for(client))
    }
}

/// Routing loaded from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct DestinationsFile {
    routes: HashMap<String, Vec<Destination>>,
}

impl DestinationsFile {
    /// Loads routing from `path`; a missing file yields empty routing.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidDestinations`] when the file cannot be
    /// read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no delivery destinations at {path}; using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(UploadError::InvalidDestinations {
                    path: path.to_owned(),
                    reason: err.to_string(),
                });
            }
        };
        Self::parse(&text).map_err(|err| UploadError::InvalidDestinations {
            path: path.to_owned(),
            reason: err.to_string(),
        })
    }

    /// Parses routing from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the text is not valid routing.
    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        Ok(Self {
            routes: toml::from_str(text)?,
        })
    }
}

impl DeliveryDestinations for DestinationsFile {
    fn destinations_for(&self, client: &str) -> Vec<Destination> {
        self.routes.get(client).cloned().unwrap_or_default()
    }
}

const fn default_enabled() -> bool {
    true
}
