//! OpenPGP operations backed by the `gpg` command-line tool.
//!
//! Every keyring is ephemeral: see [`Keyring`]. Process spawning goes through
//! [`CommandExecutor`] so tests can substitute the tool.

mod executor;
mod keyring;
mod material;

pub use executor::{CommandExecutor, SystemCommandExecutor, gpg_available};
pub use keyring::{GpgStatus, Keyring};
pub use material::{KeyMaterial, check_private_key, self_test};
