//! Domain types shared by the courier delivery tools: artifact coordinates,
//! delivery records, and client upload options.

pub mod client;
pub mod coordinate;
pub mod delivery;

pub use client::{Client, ClientOptions, effective_options};
pub use coordinate::{Coordinate, CoordinateError, DEFAULT_PACKAGING};
pub use delivery::{ArtifactLocation, Delivery, DeliveryFlags};
