//! Client organisations and their upload options.

use serde::{Deserialize, Serialize};

/// An external organisation receiving deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique short code; matches the last group segment of its deliveries.
    pub code: String,
    /// Country or region, used to locate the client's key material.
    pub country: String,
    /// Inactive clients are never processed.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Upload options; `None` until the first availability check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ClientOptions>,
    /// Addresses notified about uploads.
    #[serde(default)]
    pub email_addresses: Vec<String>,
}

impl Client {
    /// Creates an active client with no options record and no addresses.
    #[must_use]
    pub fn new(code: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            country: country.into(),
            is_active: true,
            options: None,
            email_addresses: Vec::new(),
        }
    }

    /// Options in effect for this client, see [`effective_options`].
    #[must_use]
    pub fn effective_options(&self) -> ClientOptions {
        effective_options(self.options)
    }
}

/// Per-client switches read by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// False mutes the client: it is skipped without error.
    pub can_receive: bool,
    /// True selects encryption, false selects signing.
    pub should_encrypt: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            can_receive: true,
            should_encrypt: true,
        }
    }
}

/// Resolves the options for a client that may have no options record.
///
/// A missing record means "can receive" and "should encrypt".
///
/// # Examples
///
/// ```
/// use courier_common::{ClientOptions, effective_options};
///
/// assert_eq!(effective_options(None), ClientOptions::default());
/// let muted = ClientOptions { can_receive: false, should_encrypt: true };
/// assert!(!effective_options(Some(muted)).can_receive);
/// ```
#[must_use]
pub fn effective_options(record: Option<ClientOptions>) -> ClientOptions {
    record.unwrap_or_default()
}

const fn default_true() -> bool {
    true
}
