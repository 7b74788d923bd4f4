//! Unit tests for client and run orchestration.

use super::*;
use crate::destinations::DestinationsFile;
use crate::records::{JsonRecordStore, RecordData};
use crate::scratch::Scratch;
use camino::{Utf8Path, Utf8PathBuf};
use courier_common::{ArtifactLocation, ClientOptions, Coordinate};
use rstest::{fixture, rstest};
use std::cell::RefCell;

type Failure = fn() -> UploadError;

fn missing_source() -> UploadError {
    UploadError::SourceNotFound {
        delivery: "stub".to_owned(),
    }
}

fn missing_drop() -> UploadError {
    UploadError::DestinationMissing {
        path: "ACME/TO_BNK".to_owned(),
    }
}

fn missing_system_key() -> UploadError {
    UploadError::SystemKeyMissing {
        path: "/keys/own.asc".into(),
    }
}

fn no_keys() -> UploadError {
    UploadError::NoClientKeys {
        client: "BROKEN".to_owned(),
        path: "DE/BROKEN/data".to_owned(),
    }
}

/// Sender failing the fetch step for selected artifacts.
struct StubSender {
    client: String,
    kind: &'static str,
    failing: Vec<(&'static str, Failure)>,
    attempts: RefCell<Vec<String>>,
}

impl DeliverySender for StubSender {
    fn client_code(&self) -> &str {
        &self.client
    }

    fn resolve_destination(&self) -> String {
        format!("{}/{}", self.client, self.kind)
    }

    fn fetch_clean(&self, delivery: &Delivery, work: &Scratch) -> Result<Utf8PathBuf> {
        self.attempts
            .borrow_mut()
            .push(delivery.gav.artifact().to_owned());
        if let Some((_, failure)) = self
            .failing
            .iter()
            .find(|(artifact, _)| *artifact == delivery.gav.artifact())
        {
            return Err(failure());
        }
        let clean = work.file("clean.zip");
        std::fs::write(&clean, b"content")?;
        Ok(clean)
    }

    fn transform(
        &self,
        _delivery: &Delivery,
        clean: &Utf8Path,
        _work: &Scratch,
    ) -> Result<Utf8PathBuf> {
        Ok(clean.to_owned())
    }

    fn deliver(&self, _delivery: &Delivery, _processed: &Utf8Path, _destination: &str) -> Result<()> {
        Ok(())
    }
}

/// Factory handing out stub senders and logging which kinds were built.
#[derive(Default)]
struct StubFactory {
    failing_clients: Vec<(&'static str, Failure)>,
    failing_deliveries: Vec<(&'static str, Failure)>,
    failing_primary: Vec<(&'static str, Failure)>,
    built: RefCell<Vec<String>>,
}

impl StubFactory {
    fn build(&self, client: &Client, kind: &'static str) -> Result<Box<dyn DeliverySender + '_>> {
        self.built
            .borrow_mut()
            .push(format!("{}:{kind}", client.code));
        if let Some((_, failure)) = self
            .failing_clients
            .iter()
            .find(|(code, _)| *code == client.code)
        {
            return Err(failure());
        }
        let mut failing = self.failing_deliveries.clone();
        if kind != "repository" {
            failing.extend(self.failing_primary.iter().copied());
        }
        Ok(Box::new(StubSender {
            client: client.code.clone(),
            kind,
            failing,
            attempts: RefCell::new(Vec::new()),
        }))
    }
}

impl SenderFactory for StubFactory {
    fn encrypting<'s>(
        &'s self,
        client: &Client,
        _override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        self.build(client, "encrypting")
    }

    fn signing<'s>(
        &'s self,
        client: &Client,
        _override_directory: Option<&str>,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        self.build(client, "signing")
    }

    fn repository<'s>(
        &'s self,
        client: &Client,
        _repository: &str,
    ) -> Result<Box<dyn DeliverySender + 's>> {
        self.build(client, "repository")
    }
}

fn delivery(gav: &str) -> Delivery {
    Delivery::approved(Coordinate::parse(gav).expect("valid coordinate"))
}

#[fixture]
fn data() -> RecordData {
    RecordData {
        clients: vec![Client::new("ACME", "US"), Client::new("BROKEN", "DE")],
        deliveries: vec![
            delivery("com.example.ACME:first:1.0"),
            delivery("com.example.ACME:second:1.0"),
            delivery("com.example.ACME:third:1.0"),
            delivery("com.example.BROKEN:pkg:1.0"),
        ],
    }
}

fn acme() -> Client {
    Client::new("ACME", "US")
}

fn uploaded_count(records: &JsonRecordStore) -> usize {
    records
        .snapshot()
        .deliveries
        .iter()
        .filter(|d| d.flags.uploaded)
        .count()
}

fn sender(failing: Vec<(&'static str, Failure)>) -> StubSender {
    StubSender {
        client: "ACME".to_owned(),
        kind: "TO_BNK",
        failing,
        attempts: RefCell::new(Vec::new()),
    }
}

#[rstest]
fn one_bad_delivery_does_not_stop_the_batch(data: RecordData) {
    let records = JsonRecordStore::in_memory(data);
    let deliveries = records.pending_deliveries("ACME").expect("pending");
    let sender = sender(vec![("second", missing_source)]);

    let result = process_client_deliveries(
        &sender,
        &deliveries,
        &records,
        Completion::MarkUploaded,
    )
    .expect("no fatal error");
    assert_eq!(result.sent.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(uploaded_count(&records), 2);
}

#[rstest]
fn client_setup_error_stops_remaining_deliveries(data: RecordData) {
    let records = JsonRecordStore::in_memory(data);
    let deliveries = records.pending_deliveries("ACME").expect("pending");
    let sender = sender(vec![("second", missing_drop)]);

    let result = process_client_deliveries(
        &sender,
        &deliveries,
        &records,
        Completion::MarkUploaded,
    )
    .expect("no fatal error");
    assert_eq!(result.sent.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(*sender.attempts.borrow(), vec!["first", "second"]);
}

#[rstest]
fn environment_error_aborts_the_batch(data: RecordData) {
    let records = JsonRecordStore::in_memory(data);
    let deliveries = records.pending_deliveries("ACME").expect("pending");
    let sender = sender(vec![("first", missing_system_key)]);

    let err = process_client_deliveries(
        &sender,
        &deliveries,
        &records,
        Completion::MarkUploaded,
    )
    .expect_err("fatal");
    assert!(err.is_fatal());
}

#[rstest]
fn muted_client_is_skipped_silently(mut data: RecordData) {
    if let Some(client) = data.clients.first_mut() {
        client.options = Some(ClientOptions {
            can_receive: false,
            should_encrypt: true,
        });
    }
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory::default();

    let result = process_client(&acme(), &records, &DestinationsFile::default(), &factory)
        .expect("no fatal error");
    assert!(result.sent.is_empty());
    assert!(result.errors.is_empty());
    assert!(factory.built.borrow().is_empty());
}

#[rstest]
#[case::missing_record(None, "ACME:encrypting")]
#[case::encrypting(Some(true), "ACME:encrypting")]
#[case::signing(Some(false), "ACME:signing")]
fn options_select_the_sender(
    mut data: RecordData,
    #[case] should_encrypt: Option<bool>,
    #[case] expected: &str,
) {
    if let (Some(client), Some(should_encrypt)) = (data.clients.first_mut(), should_encrypt) {
        client.options = Some(ClientOptions {
            can_receive: true,
            should_encrypt,
        });
    }
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory::default();

    let result = process_client(&acme(), &records, &DestinationsFile::default(), &factory)
        .expect("no fatal error");
    assert_eq!(result.sent.len(), 3);
    assert_eq!(*factory.built.borrow(), vec![expected]);
}

#[rstest]
fn removed_archives_are_not_sent(mut data: RecordData) {
    if let Some(first) = data.deliveries.first_mut() {
        first.location = Some(ArtifactLocation::Removed);
    }
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory::default();

    let result = process_client(&acme(), &records, &DestinationsFile::default(), &factory)
        .expect("no fatal error");
    let sent: Vec<&str> = result.sent.iter().map(|d| d.gav.artifact()).collect();
    assert_eq!(sent, vec!["second", "third"]);
}

#[rstest]
fn disabled_transport_reports_secondary_result(data: RecordData) {
    let routing = DestinationsFile::parse(
        "[[ACME]]\ntransport = { enabled = false }\n\n[[ACME]]\nrepository = { target = \"acme\" }\n",
    )
    .expect("valid routing");
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory {
        failing_deliveries: vec![("third", missing_source)],
        ..StubFactory::default()
    };

    let result = process_client(&acme(), &records, &routing, &factory).expect("no fatal error");
    assert_eq!(*factory.built.borrow(), vec!["ACME:repository"]);
    assert_eq!(result.sent.len(), 2);
    assert_eq!(result.errors.len(), 1);
}

#[rstest]
fn secondary_errors_are_not_recorded_when_transport_runs(data: RecordData) {
    let routing =
        DestinationsFile::parse("[[ACME]]\nrepository = { target = \"acme\" }\n").expect("routing");
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory {
        failing_deliveries: vec![("third", missing_source)],
        ..StubFactory::default()
    };

    let result = process_client(&acme(), &records, &routing, &factory).expect("no fatal error");
    assert_eq!(
        *factory.built.borrow(),
        vec!["ACME:repository", "ACME:encrypting"]
    );
    assert_eq!(result.sent.len(), 2);
    assert_eq!(result.errors.len(), 1, "only the transport failure is kept");
}

#[rstest]
fn secondary_success_leaves_failed_primary_pending(data: RecordData) {
    let routing =
        DestinationsFile::parse("[[ACME]]\nrepository = { target = \"acme\" }\n").expect("routing");
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory {
        failing_primary: vec![("first", missing_source)],
        ..StubFactory::default()
    };

    let result = process_client(&acme(), &records, &routing, &factory).expect("no fatal error");
    assert_eq!(result.errors.len(), 1);
    let pending: Vec<String> = records
        .pending_deliveries("ACME")
        .expect("pending")
        .iter()
        .map(|d| d.gav.artifact().to_owned())
        .collect();
    assert_eq!(pending, vec!["first"]);
    assert_eq!(uploaded_count(&records), 2);
}

#[rstest]
fn secondary_marks_uploaded_when_transport_is_disabled(data: RecordData) {
    let routing = DestinationsFile::parse(
        "[[ACME]]\ntransport = { enabled = false }\n\n[[ACME]]\nrepository = { target = \"acme\" }\n",
    )
    .expect("valid routing");
    let records = JsonRecordStore::in_memory(data);

    process_client(&acme(), &records, &routing, &StubFactory::default()).expect("no fatal error");
    assert!(records.pending_deliveries("ACME").expect("pending").is_empty());
}

#[rstest]
fn unwritable_records_do_not_abort_the_run(data: RecordData) {
    let clients = data.clients.clone();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::try_from(dir.path().join("records.json")).expect("UTF-8 path");
    std::fs::write(&path, serde_json::to_string(&data).expect("serialise")).expect("write");
    std::fs::create_dir(path.with_extension("json.tmp")).expect("block staging file");
    let records = JsonRecordStore::open(&path).expect("open");
    let factory = StubFactory::default();

    let result = process_clients(&clients, &records, &DestinationsFile::default(), &factory)
        .expect("no fatal error");
    assert_eq!(
        *factory.built.borrow(),
        vec!["ACME:encrypting", "BROKEN:encrypting"]
    );
    assert!(result.sent.is_empty());
    assert_eq!(result.errors.len(), 4);
    assert!(result.errors.iter().all(|err| err.kind() == ErrorKind::Store));
    assert_eq!(uploaded_count(&records), 0);
}

#[rstest]
fn broken_client_does_not_stop_others(data: RecordData) {
    let clients = data.clients.clone();
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory {
        failing_clients: vec![("BROKEN", no_keys)],
        ..StubFactory::default()
    };

    let result = process_clients(&clients, &records, &DestinationsFile::default(), &factory)
        .expect("no fatal error");
    assert_eq!(result.sent.len(), 3);
    assert_eq!(result.errors.len(), 1);
    assert!(
        result
            .errors
            .iter()
            .all(|err| err.kind() == ErrorKind::ClientSetup)
    );
}

#[rstest]
fn missing_system_key_aborts_the_run(data: RecordData) {
    let clients = data.clients.clone();
    let records = JsonRecordStore::in_memory(data);
    let factory = StubFactory {
        failing_clients: vec![("ACME", missing_system_key)],
        ..StubFactory::default()
    };

    let err = process_clients(&clients, &records, &DestinationsFile::default(), &factory)
        .expect_err("fatal");
    assert!(err.is_fatal());
    assert_eq!(*factory.built.borrow(), vec!["ACME:encrypting"]);
    assert_eq!(uploaded_count(&records), 0);
}

#[test]
fn results_merge_by_concatenation() {
    let first = UploadResult {
        sent: vec![delivery("com.example.ACME:a:1")],
        errors: vec![missing_source()],
    };
    let second = UploadResult {
        sent: vec![delivery("com.example.ACME:b:1")],
        errors: vec![no_keys()],
    };
    let merged = first.merge(second);
    let sent: Vec<&str> = merged.sent.iter().map(|d| d.gav.artifact()).collect();
    assert_eq!(sent, vec!["a", "b"]);
    assert_eq!(merged.errors.len(), 2);
}
