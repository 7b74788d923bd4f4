//! Upload notifications.
//!
//! After a run every uploaded delivery is announced to the client's
//! notification addresses and to the delivery's author. Notification failures
//! are logged and never affect the run outcome.

use crate::destinations::DeliveryDestinations;
use crate::records::DeliveryRecords;
use camino::Utf8PathBuf;
use chrono::Utc;
use courier_common::Delivery;
use log::{debug, error, info};
use std::collections::HashMap;

/// Default template of the download link added for repository clients.
pub const DEFAULT_LINK_TEMPLATE: &str = "${MVN_LINK_URL}/${CLIENT_REPO}/${FULL_GAV}";

/// Errors arising while sending a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The message could not be written.
    #[error("unable to write notification: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel delivering notifications.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    /// Sends one message to `recipients`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the message cannot be handed over.
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(
            "notification to [{}]: {subject}: {body}",
            recipients.join(", ")
        );
        Ok(())
    }
}

/// Drops RFC 5322 messages into a directory watched by a mail relay.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    outbox: Utf8PathBuf,
    sender: String,
}

impl OutboxNotifier {
    /// Creates a notifier writing to `outbox` with `sender` as originator.
    #[must_use]
    pub fn new(outbox: impl Into<Utf8PathBuf>, sender: impl Into<String>) -> Self {
        Self {
            outbox: outbox.into(),
            sender: sender.into(),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError> {
        let now = Utc::now();
        let message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {subject}\r\nDate: {}\r\n\r\n{}\r\n",
            self.sender,
            recipients.join(", "),
            now.to_rfc2822(),
            body.replace('\n', "\r\n"),
        );
        std::fs::create_dir_all(&self.outbox)?;
        let name = format!("{}-{subject}.eml", now.format("%Y%m%dT%H%M%S%.f"));
        std::fs::write(self.outbox.join(name), message)?;
        Ok(())
    }
}

/// Appends `@domain` to identities that are not already addresses.
///
/// # Examples
///
/// ```
/// use courier_uploader::notify::normalise_address;
///
/// assert_eq!(normalise_address("jdoe", "example.com"), "jdoe@example.com");
/// assert_eq!(normalise_address("ops@corp.test", "example.com"), "ops@corp.test");
/// ```
#[must_use]
pub fn normalise_address(identity: &str, domain: &str) -> String {
    if identity.contains('@') {
        identity.to_owned()
    } else {
        format!("{identity}@{domain}")
    }
}

/// Replaces `${NAME}` placeholders; unknown placeholders are kept verbatim.
#[must_use]
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let (before, tail) = rest.split_at(start);
        out.push_str(before);
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let (placeholder, after) = tail.split_at(end + 1);
        let name = placeholder
            .strip_prefix("${")
            .and_then(|p| p.strip_suffix('}'))
            .unwrap_or_default();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(placeholder),
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Settings shaping notification content.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Domain appended to author logins.
    pub mail_domain: Option<String>,
    /// Base URL substituted for `${MVN_LINK_URL}`.
    pub link_url: Option<String>,
    /// Download link template.
    pub link_template: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            mail_domain: None,
            link_url: None,
            link_template: DEFAULT_LINK_TEMPLATE.to_owned(),
        }
    }
}

/// A composed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject line, `<artifact>-<version>`.
    pub subject: String,
    /// Message body.
    pub body: String,
}

/// Composes the notification announcing `delivery`.
///
/// `repository` is the client's first secondary repository; when present a
/// download link is appended to the body.
#[must_use]
pub fn compose(
    delivery: &Delivery,
    addresses: &[String],
    repository: Option<&str>,
    settings: &NotifySettings,
) -> Notification {
    let gav = &delivery.gav;
    let subject = format!("{}-{}", gav.artifact(), gav.version());
    let mut body = format!("Delivery {subject} has been uploaded");

    if let Some(repository) = repository {
        let published = gav.with_packaging("zip");
        let mut vars: HashMap<&str, String> = HashMap::new();
        vars.insert("CLIENT_REPO", repository.to_owned());
        vars.insert("FULL_GAV", published.repository_path());
        vars.insert("GROUPID", gav.group().to_owned());
        vars.insert("ARTIFACTID", gav.artifact().to_owned());
        vars.insert("VERSION", gav.version().to_owned());
        vars.insert("PACKAGING", "zip".to_owned());
        if let Some(classifier) = gav.classifier() {
            vars.insert("CLASSIFIER", classifier.to_owned());
        }
        if let Some(url) = &settings.link_url {
            vars.insert("MVN_LINK_URL", url.trim_end_matches('/').to_owned());
        }
        let link = substitute(&settings.link_template, &vars);
        body.push_str(&format!("\nDownload URL: {link}"));
    }

    let mut recipients = addresses.to_vec();
    if let (Some(author), Some(domain)) = (&delivery.author, &settings.mail_domain) {
        recipients.push(normalise_address(author, domain));
    }

    Notification {
        recipients,
        subject,
        body,
    }
}

/// Announces the uploaded `deliveries` of `client`.
///
/// Deliveries of other clients are skipped. Every failure is logged.
pub fn notify_client(
    notifier: &dyn Notifier,
    records: &dyn DeliveryRecords,
    destinations: &dyn DeliveryDestinations,
    client: &str,
    deliveries: &[Delivery],
    settings: &NotifySettings,
) {
    let addresses = match records.client_addresses(client) {
        Ok(addresses) => addresses,
        Err(err) => {
            error!("notification addresses of {client} unavailable: {err}");
            Vec::new()
        }
    };
    let config = destinations.config_for(client);
    let repository = config.repositories.first().map(String::as_str);

    for delivery in deliveries {
        if delivery.client_code() != client {
            error!("refusing to notify {client} about {}", delivery.gav);
            continue;
        }
        let message = compose(delivery, &addresses, repository, settings);
        if message.recipients.is_empty() {
            info!("no notification addresses for {client}");
            continue;
        }
        debug!("notifying [{}] about {}", message.recipients.join(", "), delivery.gav);
        if let Err(err) = notifier.send(&message.recipients, &message.subject, &message.body) {
            error!("notification was not sent to {client}: {err}");
        }
    }
}

/// Announces every uploaded delivery, grouped by client.
pub fn notify_all(
    notifier: &dyn Notifier,
    records: &dyn DeliveryRecords,
    destinations: &dyn DeliveryDestinations,
    sent: &[Delivery],
    settings: &NotifySettings,
) {
    let mut clients: Vec<&str> = sent.iter().map(Delivery::client_code).collect();
    clients.sort_unstable();
    clients.dedup();
    for client in clients {
        let deliveries: Vec<Delivery> = sent
            .iter()
            .filter(|d| d.client_code() == client)
            .cloned()
            .collect();
        notify_client(notifier, records, destinations, client, &deliveries, settings);
    }
}
