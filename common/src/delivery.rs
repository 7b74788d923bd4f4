//! Delivery records: one approved artifact awaiting distribution.

use crate::coordinate::Coordinate;
use serde::{Deserialize, Serialize};

/// Where the record store last saw the delivery's archive in the artifact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLocation {
    /// The archive is currently registered in the store.
    Present,
    /// The archive was registered once and has since been removed.
    Removed,
}

/// Status flags of a delivery record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryFlags {
    /// The delivery was approved for distribution.
    pub approved: bool,
    /// The delivery was sent to its client.
    pub uploaded: bool,
    /// The delivery was marked as broken.
    pub failed: bool,
}

/// One artifact to distribute to its owning client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Coordinate of the delivered artifact.
    pub gav: Coordinate,
    /// Status flags.
    #[serde(default)]
    pub flags: DeliveryFlags,
    /// Login of the person who prepared the delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Artifact-store registration state; `None` when it was never registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ArtifactLocation>,
}

impl Delivery {
    /// Creates an approved, not yet uploaded delivery for `gav`.
    #[must_use]
    pub fn approved(gav: Coordinate) -> Self {
        Self {
            gav,
            flags: DeliveryFlags {
                approved: true,
                ..DeliveryFlags::default()
            },
            author: None,
            location: None,
        }
    }

    /// Code of the client this delivery belongs to.
    #[must_use]
    pub fn client_code(&self) -> &str {
        self.gav.client_code()
    }

    /// Approved, not uploaded and not failed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.flags.approved && !self.flags.uploaded && !self.flags.failed
    }

    /// False only when the archive was explicitly removed from the artifact store.
    ///
    /// Deliveries that were never registered are still sendable: old records
    /// predate location tracking.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.location != Some(ArtifactLocation::Removed)
    }
}
