//! Courier uploader library.
//!
//! This crate distributes approved deliveries from the artifact store to
//! client destinations. Each delivery is encrypted to the client's keys,
//! signed with the system key, or published unchanged to a secondary
//! repository, and then dropped on the client's transport. One run covers
//! many clients; a failing delivery or client never aborts the run, only
//! environment errors do.
//!
//! # Modules
//!
//! - [`artifact_store`] - Maven-layout artifact store access
//! - [`availability`] - Refreshes which clients can receive deliveries
//! - [`cli`] - Command-line argument definitions
//! - [`destinations`] - Per-client routing configuration
//! - [`error`] - Error types classified by severity
//! - [`gpg`] - Ephemeral gpg keyrings and key validation
//! - [`key_store`] - Client public key lookup
//! - [`logging`] - Log dispatcher for the binary
//! - [`notify`] - Upload notifications
//! - [`orchestrator`] - Per-client and per-run orchestration
//! - [`records`] - Client and delivery records
//! - [`scratch`] - Self-cleaning working directories
//! - [`sender`] - The per-delivery send lifecycle and its variants
//! - [`transform`] - Passthrough, encrypting and signing transforms
//! - [`transport`] - Outbound file drop
//! - [`upload`] - The upload run and its final verdict

pub mod artifact_store;
pub mod availability;
pub mod cli;
pub mod destinations;
pub mod error;
pub mod gpg;
pub mod key_store;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod records;
pub mod scratch;
pub mod sender;
pub mod transform;
pub mod transport;
pub mod upload;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
