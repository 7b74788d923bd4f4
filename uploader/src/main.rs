//! Courier uploader CLI entrypoint.
//!
//! This binary wires the configured stores, key material and transport into
//! the upload pipeline and maps the run verdict to an exit code.

use clap::Parser;
use courier_uploader::artifact_store::{ArtifactStore, DirArtifactStore, HttpArtifactStore};
use courier_uploader::availability::update_availability;
use courier_uploader::cli::{Cli, ClientArgs, Command, Settings, require};
use courier_uploader::destinations::DestinationsFile;
use courier_uploader::error::{Result, UploadError};
use courier_uploader::gpg::{SystemCommandExecutor, check_private_key, gpg_available};
use courier_uploader::key_store::DirKeyStore;
use courier_uploader::logging;
use courier_uploader::notify::{
    LogNotifier, Notifier, NotifySettings, OutboxNotifier, normalise_address,
};
use courier_uploader::orchestrator::{GpgSenderFactory, UploadResult};
use courier_uploader::records::JsonRecordStore;
use courier_uploader::sender::{Connections, SystemKey};
use courier_uploader::transport::DirTransport;
use courier_uploader::upload::{RunOutcome, UploadRun, perform_upload, postprocess, selected_clients};
use log::{debug, info, warn};
use std::io::Write;

const DEFAULT_MAIL_SENDER: &str = "courier-upload";

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    if let Err(err) = logging::init(cli.settings.log_level.into()) {
        write_stderr_line(&mut stderr, format_args!("logging unavailable: {err}"));
    }
    let exit_code = exit_code_for_run_result(run(&cli), &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    for (name, value) in cli.settings.summary() {
        debug!("{name} = {value}");
    }
    match &cli.command {
        Command::CheckKey => check_key(&cli.settings),
        Command::Availability(args) => availability(&cli.settings, args),
        Command::Upload(args) => upload(&cli.settings, args),
    }
}

fn system_key(settings: &Settings) -> Result<SystemKey> {
    Ok(SystemKey {
        path: require(settings.pgp_key.clone(), "pgp-key")?,
        passphrase: settings.passphrase.clone(),
    })
}

fn ensure_gpg() -> Result<()> {
    if gpg_available(&SystemCommandExecutor) {
        Ok(())
    } else {
        Err(UploadError::GpgUnavailable {
            reason: "`gpg --version` did not succeed".to_owned(),
        })
    }
}

fn check_key(settings: &Settings) -> Result<RunOutcome> {
    ensure_gpg()?;
    let key = system_key(settings)?;
    check_private_key(&SystemCommandExecutor, &key.path, key.passphrase)?;
    Ok(RunOutcome::Succeeded)
}

fn availability(settings: &Settings, args: &ClientArgs) -> Result<RunOutcome> {
    let records = JsonRecordStore::open(&require(settings.records.clone(), "records")?)?;
    let keys = DirKeyStore::new(require(settings.key_store.clone(), "key-store")?);
    let transport = DirTransport::new(require(settings.transport_root.clone(), "transport-root")?);

    let clients = selected_clients(&records, args.client.as_deref())?;
    let errors = update_availability(&records, &keys, &transport, &clients);
    postprocess(&UploadResult {
        sent: Vec::new(),
        errors,
    })
}

fn artifact_store(settings: &Settings) -> Result<Box<dyn ArtifactStore>> {
    match (&settings.store_url, &settings.store_dir) {
        (Some(url), _) => Ok(Box::new(HttpArtifactStore::new(
            url,
            &settings.download_repository,
            settings.store_token.clone(),
        ))),
        (None, Some(dir)) => Ok(Box::new(DirArtifactStore::new(
            dir.clone(),
            &settings.download_repository,
        ))),
        (None, None) => Err(UploadError::MissingSetting {
            setting: "store-url",
        }),
    }
}

fn external_store(settings: &Settings) -> Option<Box<dyn ArtifactStore>> {
    settings.external_store_url.as_ref().map(|url| {
        Box::new(HttpArtifactStore::new(
            url,
            &settings.download_repository,
            settings.external_store_token.clone(),
        )) as Box<dyn ArtifactStore>
    })
}

fn notifier(settings: &Settings) -> Box<dyn Notifier> {
    let Some(outbox) = &settings.outbox else {
        return Box::new(LogNotifier);
    };
    let identity = settings
        .mail_sender
        .as_deref()
        .unwrap_or(DEFAULT_MAIL_SENDER);
    let sender = match &settings.mail_domain {
        Some(domain) => normalise_address(identity, domain),
        None => identity.to_owned(),
    };
    Box::new(OutboxNotifier::new(outbox.clone(), sender))
}

fn upload(settings: &Settings, args: &ClientArgs) -> Result<RunOutcome> {
    ensure_gpg()?;
    let system_key = system_key(settings)?;
    if settings.check_key_eagerly {
        check_private_key(
            &SystemCommandExecutor,
            &system_key.path,
            system_key.passphrase.clone(),
        )?;
    }

    let records = JsonRecordStore::open(&require(settings.records.clone(), "records")?)?;
    let keys = DirKeyStore::new(require(settings.key_store.clone(), "key-store")?);
    let transport = DirTransport::new(require(settings.transport_root.clone(), "transport-root")?);
    let destinations = DestinationsFile::load(&settings.destinations)?;
    let artifacts = artifact_store(settings)?;
    let external = external_store(settings);
    if external.is_none() {
        info!("no external store configured; secondary uploads use the artifact store");
    }

    let gpg = SystemCommandExecutor;
    let connections = Connections {
        artifacts: artifacts.as_ref(),
        repositories: external.as_deref().unwrap_or(artifacts.as_ref()),
        keys: &keys,
        transport: &transport,
        gpg: &gpg,
    };
    let factory = GpgSenderFactory::new(connections, system_key);
    let notifier = notifier(settings);
    let notify_settings = NotifySettings {
        mail_domain: settings.mail_domain.clone(),
        link_url: settings.link_url.clone(),
        link_template: settings.link_template.clone(),
    };
    if notify_settings.link_url.is_none() {
        warn!("no link URL configured; download links stay unresolved");
    }

    perform_upload(
        &UploadRun {
            records: &records,
            destinations: &destinations,
            keys: &keys,
            transport: &transport,
            factory: &factory,
            notifier: notifier.as_ref(),
            settings: &notify_settings,
        },
        args.client.as_deref(),
    )
}

/// Environment errors exit with 2, every other failure with 1.
fn exit_code_for_run_result(result: Result<RunOutcome>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(RunOutcome::Succeeded) => 0,
        Ok(RunOutcome::SucceededWithWarnings) => {
            write_stderr_line(stderr, "upload finished with warnings");
            0
        }
        Err(err) => {
            write_stderr_line(stderr, &err);
            if err.is_fatal() { 2 } else { 1 }
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
