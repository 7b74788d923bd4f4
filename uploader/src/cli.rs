//! CLI argument definitions for the `courier-upload` binary.
//!
//! Every connection setting has an environment-variable fallback so the
//! uploader can run from a scheduler that only sets the environment.

use crate::error::{Result, UploadError};
use crate::notify::DEFAULT_LINK_TEMPLATE;
use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

/// Default routing file name.
pub const DEFAULT_DESTINATIONS: &str = "delivery_destinations.toml";

/// Default repository holding clean delivery archives.
pub const DEFAULT_DOWNLOAD_REPOSITORY: &str = "deliveries";

const MASK: &str = "********";

/// Encrypt or sign approved deliveries and drop them on client transports.
#[derive(Parser, Debug)]
#[command(name = "courier-upload")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Upload every pending delivery:\n",
    "    $ courier-upload upload\n\n",
    "  Upload the deliveries of one client:\n",
    "    $ courier-upload upload --client ACME\n\n",
    "  Refresh which clients can receive deliveries:\n",
    "    $ courier-upload availability\n\n",
    "  Validate the system key and passphrase:\n",
    "    $ courier-upload check-key",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Connection and notification settings.
    #[command(flatten)]
    pub settings: Settings,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Refresh availability, then upload pending deliveries.
    Upload(ClientArgs),

    /// Refresh which clients can receive deliveries.
    Availability(ClientArgs),

    /// Validate the system key and its passphrase.
    CheckKey,
}

/// Client selection.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientArgs {
    /// Process only the client with this code.
    #[arg(short, long, value_name = "CODE")]
    pub client: Option<String>,
}

/// Log verbosity.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Progress messages.
    #[default]
    Info,
    /// Diagnostic detail.
    Debug,
    /// Everything, including gpg invocations.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Base URL of the artifact store.
    #[arg(long, env = "COURIER_STORE_URL", value_name = "URL", global = true)]
    pub store_url: Option<String>,

    /// Local directory used as the artifact store instead of a URL.
    #[arg(
        long,
        env = "COURIER_STORE_DIR",
        value_name = "DIR",
        conflicts_with = "store_url",
        global = true
    )]
    pub store_dir: Option<Utf8PathBuf>,

    /// Bearer token for the artifact store.
    #[arg(long, env = "COURIER_STORE_TOKEN", hide_env_values = true, global = true)]
    pub store_token: Option<String>,

    /// Repository holding the clean archives.
    #[arg(
        long,
        env = "COURIER_DOWNLOAD_REPOSITORY",
        default_value = DEFAULT_DOWNLOAD_REPOSITORY,
        global = true
    )]
    pub download_repository: String,

    /// Base URL of the store receiving secondary uploads [default: the
    /// artifact store].
    #[arg(long, env = "COURIER_EXTERNAL_STORE_URL", value_name = "URL", global = true)]
    pub external_store_url: Option<String>,

    /// Bearer token for the external store.
    #[arg(
        long,
        env = "COURIER_EXTERNAL_STORE_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub external_store_token: Option<String>,

    /// Root of the key store holding client public keys.
    #[arg(long, env = "COURIER_KEY_STORE", value_name = "DIR", global = true)]
    pub key_store: Option<Utf8PathBuf>,

    /// Root of the outbound transport.
    #[arg(long, env = "COURIER_TRANSPORT_ROOT", value_name = "DIR", global = true)]
    pub transport_root: Option<Utf8PathBuf>,

    /// JSON file holding client and delivery records.
    #[arg(long, env = "COURIER_RECORDS", value_name = "FILE", global = true)]
    pub records: Option<Utf8PathBuf>,

    /// TOML file routing clients to destinations.
    #[arg(
        long,
        env = "COURIER_DESTINATIONS",
        value_name = "FILE",
        default_value = DEFAULT_DESTINATIONS,
        global = true
    )]
    pub destinations: Utf8PathBuf,

    /// Domain appended to logins without one.
    #[arg(long, env = "COURIER_MAIL_DOMAIN", global = true)]
    pub mail_domain: Option<String>,

    /// Identity notifications are sent from.
    #[arg(long, env = "COURIER_MAIL_SENDER", global = true)]
    pub mail_sender: Option<String>,

    /// Directory receiving notification messages [default: log only].
    #[arg(long, env = "COURIER_OUTBOX", value_name = "DIR", global = true)]
    pub outbox: Option<Utf8PathBuf>,

    /// Base URL of download links.
    #[arg(long, env = "COURIER_LINK_URL", value_name = "URL", global = true)]
    pub link_url: Option<String>,

    /// Template of download links.
    #[arg(
        long,
        env = "COURIER_LINK_TEMPLATE",
        default_value = DEFAULT_LINK_TEMPLATE,
        global = true
    )]
    pub link_template: String,

    /// Armored file holding the system key pair.
    #[arg(long, env = "COURIER_PGP_KEY", value_name = "FILE", global = true)]
    pub pgp_key: Option<Utf8PathBuf>,

    /// Passphrase of the system key.
    #[arg(long, env = "COURIER_PGP_PASSPHRASE", hide_env_values = true, global = true)]
    pub passphrase: Option<String>,

    /// Validate the system key before uploading. Pass `false` to skip.
    #[arg(
        long,
        env = "COURIER_CHECK_KEY_EAGERLY",
        default_value_t = true,
        action = ArgAction::Set,
        value_name = "BOOL",
        global = true
    )]
    pub check_key_eagerly: bool,

    /// Log verbosity.
    #[arg(
        long,
        env = "COURIER_LOG_LEVEL",
        value_enum,
        default_value_t = LogLevel::Info,
        global = true
    )]
    pub log_level: LogLevel,
}

/// Returns `value` or a missing-setting error naming `setting`.
///
/// # Errors
///
/// Returns [`UploadError::MissingSetting`] when `value` is `None`.
pub fn require<T>(value: Option<T>, setting: &'static str) -> Result<T> {
    value.ok_or(UploadError::MissingSetting { setting })
}

fn mask(secret: Option<&String>) -> String {
    secret.map_or_else(|| "-".to_owned(), |_| MASK.to_owned())
}

fn show<T: std::fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "-".to_owned(), ToString::to_string)
}

impl Settings {
    /// Effective settings as name/value pairs with secrets masked.
    #[must_use]
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("store-url", show(self.store_url.as_ref())),
            ("store-dir", show(self.store_dir.as_ref())),
            ("store-token", mask(self.store_token.as_ref())),
            ("download-repository", self.download_repository.clone()),
            ("external-store-url", show(self.external_store_url.as_ref())),
            (
                "external-store-token",
                mask(self.external_store_token.as_ref()),
            ),
            ("key-store", show(self.key_store.as_ref())),
            ("transport-root", show(self.transport_root.as_ref())),
            ("records", show(self.records.as_ref())),
            ("destinations", self.destinations.to_string()),
            ("mail-domain", show(self.mail_domain.as_ref())),
            ("mail-sender", show(self.mail_sender.as_ref())),
            ("outbox", show(self.outbox.as_ref())),
            ("link-url", show(self.link_url.as_ref())),
            ("link-template", self.link_template.clone()),
            ("pgp-key", show(self.pgp_key.as_ref())),
            ("passphrase", mask(self.passphrase.as_ref())),
            ("check-key-eagerly", self.check_key_eagerly.to_string()),
        ]
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
