//! Behaviour-driven tests for delivery orchestration.
//!
//! These scenarios exercise failure isolation, the fatal path and routing
//! defaults. None of them needs a working gpg: they either publish to a
//! repository or fail before any key is imported.

use courier_common::{Client, ClientOptions, Coordinate};
use courier_uploader::destinations::{DeliveryDestinations, DestinationConfig, DestinationsFile};
use courier_uploader::error::{ErrorKind, UploadError};
use courier_uploader::gpg::SystemCommandExecutor;
use courier_uploader::orchestrator::{GpgSenderFactory, UploadResult, process_clients};
use courier_uploader::records::JsonRecordStore;
use courier_uploader::sender::{RepositorySender, send_delivery};
use courier_uploader::test_utils::TestBed;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PipelineWorld {
    bed: TestBed,
    routing: String,
    records: Option<JsonRecordStore>,
    outcome: Option<Result<UploadResult, UploadError>>,
    foreign: Option<Coordinate>,
    rejection: Option<UploadError>,
    config: Option<DestinationConfig>,
}

impl PipelineWorld {
    fn result(&self) -> &UploadResult {
        match self.outcome.as_ref().expect("clients processed") {
            Ok(result) => result,
            Err(err) => panic!("run aborted: {err}"),
        }
    }

    fn uploaded(&self, gav: &str) -> bool {
        let gav = Coordinate::parse(gav).expect("valid coordinate");
        self.records
            .as_ref()
            .expect("records opened")
            .delivery(&gav)
            .is_some_and(|d| d.flags.uploaded)
    }
}

#[fixture]
fn world() -> PipelineWorld {
    PipelineWorld::default()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a client \"{code}\" in \"{country}\" with keys and a drop")]
fn given_ready_client(world: &mut PipelineWorld, code: String, country: String) {
    world.bed.add_client(Client::new(code, country), true, true);
}

#[given("a client \"{code}\" in \"{country}\" without keys")]
fn given_client_without_keys(world: &mut PipelineWorld, code: String, country: String) {
    world.bed.add_client(Client::new(code, country), false, true);
}

#[given("a client \"{code}\" in \"{country}\" that cannot receive")]
fn given_muted_client(world: &mut PipelineWorld, code: String, country: String) {
    let mut client = Client::new(code, country);
    client.options = Some(ClientOptions {
        can_receive: false,
        should_encrypt: true,
    });
    world.bed.add_client(client, true, true);
}

#[given("client \"{code}\" in \"{country}\" publishes only to repository \"{repository}\"")]
fn given_repository_client(
    world: &mut PipelineWorld,
    code: String,
    country: String,
    repository: String,
) {
    world.routing.push_str(&format!(
        "[[{code}]]\ntransport = {{ enabled = false }}\n\n[[{code}]]\nrepository = {{ target = \"{repository}\" }}\n\n"
    ));
    world.bed.add_client(Client::new(code, country), false, false);
}

#[given("a delivery \"{gav}\" with an archive")]
fn given_delivery_with_archive(world: &mut PipelineWorld, gav: String) {
    world.bed.add_delivery(&gav, Some(b"hello"));
}

#[given("a delivery \"{gav}\" without an archive")]
fn given_delivery_without_archive(world: &mut PipelineWorld, gav: String) {
    world.bed.add_delivery(&gav, None);
}

#[given("a foreign delivery \"{gav}\" handed to \"{code}\"")]
fn given_foreign_delivery(world: &mut PipelineWorld, gav: String, code: String) {
    let delivery = world.bed.add_delivery(&gav, Some(b"hello"));
    assert_ne!(delivery.client_code(), code);
    world.foreign = Some(delivery.gav);
}

#[given("the system key is missing")]
fn given_system_key_missing(world: &mut PipelineWorld) {
    world.bed.remove_system_key();
}

#[given("no routing file")]
fn given_no_routing(world: &mut PipelineWorld) {
    world.routing.clear();
}

#[when("the clients are processed")]
fn when_clients_processed(world: &mut PipelineWorld) {
    let routing = DestinationsFile::parse(&world.routing).expect("valid routing");
    let records = world.bed.records();
    let gpg = SystemCommandExecutor;
    let factory = GpgSenderFactory::new(world.bed.connections(&gpg), world.bed.system_key());
    let outcome = process_clients(&world.bed.data.clients, &records, &routing, &factory);
    world.outcome = Some(outcome);
    world.records = Some(records);
}

#[when("the foreign delivery is sent")]
fn when_foreign_delivery_sent(world: &mut PipelineWorld) {
    let records = world.bed.records();
    let gav = world.foreign.clone().expect("foreign delivery");
    let delivery = records.delivery(&gav).expect("delivery recorded");
    let gpg = SystemCommandExecutor;
    let acme = Client::new("ACME", "US");
    let sender = RepositorySender::new(world.bed.connections(&gpg), &acme, "acme-releases");
    world.rejection = send_delivery(&sender, &delivery, &records).err();
    world.records = Some(records);
}

#[when("the routing of \"{code}\" is resolved")]
fn when_routing_resolved(world: &mut PipelineWorld, code: String) {
    let path = world.bed.root().join("delivery_destinations.toml");
    let routing = DestinationsFile::load(&path).expect("missing file is empty routing");
    world.config = Some(routing.config_for(&code));
}

#[then("the sent count is {count}")]
fn then_sent_count(world: &mut PipelineWorld, count: usize) {
    assert_eq!(world.result().sent.len(), count);
}

#[then("the error count is {count}")]
fn then_error_count(world: &mut PipelineWorld, count: usize) {
    assert_eq!(world.result().errors.len(), count);
}

#[then("a client setup error is recorded for \"{code}\"")]
fn then_client_setup_error(world: &mut PipelineWorld, code: String) {
    let errors = &world.result().errors;
    assert!(errors.iter().all(|err| err.kind() == ErrorKind::ClientSetup));
    assert!(errors.iter().any(|err| matches!(
        err,
        UploadError::NoClientKeys { client, .. } | UploadError::KeyDirectoryMissing { client, .. }
            if *client == code
    )));
}

#[then("the run aborts with an environment error")]
fn then_run_aborts(world: &mut PipelineWorld) {
    match world.outcome.as_ref().expect("clients processed") {
        Ok(result) => panic!("run completed with {} sent", result.sent.len()),
        Err(err) => assert!(err.is_fatal(), "unexpected error: {err}"),
    }
}

#[then("the delivery is rejected as belonging to \"{owner}\"")]
fn then_rejected(world: &mut PipelineWorld, owner: String) {
    let err = world.rejection.as_ref().expect("delivery rejected");
    assert!(matches!(err, UploadError::WrongClient { owner: found, .. } if *found == owner));
    assert_eq!(err.kind(), ErrorKind::Delivery);
}

#[then("\"{gav}\" is marked uploaded")]
fn then_marked(world: &mut PipelineWorld, gav: String) {
    assert!(world.uploaded(&gav), "{gav} should be uploaded");
}

#[then("\"{gav}\" is not marked uploaded")]
fn then_not_marked(world: &mut PipelineWorld, gav: String) {
    assert!(!world.uploaded(&gav), "{gav} should not be uploaded");
}

#[then("the transport is enabled without an override")]
fn then_transport_default(world: &mut PipelineWorld) {
    let config = world.config.as_ref().expect("routing resolved");
    assert!(config.enabled);
    assert!(config.override_directory.is_none());
}

#[then("no secondary repository is configured")]
fn then_no_repositories(world: &mut PipelineWorld) {
    let config = world.config.as_ref().expect("routing resolved");
    assert!(config.repositories.is_empty());
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/pipeline.feature", index = 0)]
fn scenario_missing_archive_is_isolated(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 1)]
fn scenario_client_without_keys_is_isolated(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 2)]
fn scenario_missing_system_key_aborts(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 3)]
fn scenario_muted_client_is_skipped(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 4)]
fn scenario_foreign_delivery_is_rejected(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 5)]
fn scenario_routing_defaults(world: PipelineWorld) {
    let _ = world;
}
