//! Tests for CLI parsing, environment fallbacks and settings masking.

use super::*;
use rstest::rstest;

const COURIER_VARS: [&str; 9] = [
    "COURIER_STORE_URL",
    "COURIER_STORE_DIR",
    "COURIER_STORE_TOKEN",
    "COURIER_EXTERNAL_STORE_TOKEN",
    "COURIER_KEY_STORE",
    "COURIER_PGP_PASSPHRASE",
    "COURIER_DESTINATIONS",
    "COURIER_CHECK_KEY_EAGERLY",
    "COURIER_LOG_LEVEL",
];

/// Parses `args` with every courier variable unset unless listed in `vars`.
fn parse_with_env(args: &[&str], vars: &[(&str, &str)]) -> Cli {
    let env: Vec<(&str, Option<&str>)> = COURIER_VARS
        .iter()
        .map(|name| {
            let value = vars.iter().find(|(key, _)| key == name).map(|(_, v)| *v);
            (*name, value)
        })
        .collect();
    temp_env::with_vars(env, || {
        Cli::try_parse_from(args).expect("arguments should parse")
    })
}

#[test]
fn cli_parses_defaults() {
    let cli = parse_with_env(&["courier-upload", "upload"], &[]);
    assert_eq!(cli.command, Command::Upload(ClientArgs::default()));
    assert!(cli.settings.store_url.is_none());
    assert_eq!(cli.settings.download_repository, DEFAULT_DOWNLOAD_REPOSITORY);
    assert_eq!(cli.settings.destinations, Utf8PathBuf::from(DEFAULT_DESTINATIONS));
    assert_eq!(cli.settings.link_template, DEFAULT_LINK_TEMPLATE);
    assert!(cli.settings.check_key_eagerly);
    assert_eq!(cli.settings.log_level, LogLevel::Info);
}

#[rstest]
#[case::flag(&["courier-upload", "upload", "--check-key-eagerly", "false"], &[])]
#[case::environment(&["courier-upload", "upload"], &[("COURIER_CHECK_KEY_EAGERLY", "false")])]
fn eager_key_check_can_be_disabled(#[case] args: &[&str], #[case] vars: &[(&str, &str)]) {
    assert!(!parse_with_env(args, vars).settings.check_key_eagerly);
}

#[rstest]
#[case::upload(&["courier-upload", "upload", "--client", "ACME"], Command::Upload(ClientArgs { client: Some("ACME".to_owned()) }))]
#[case::availability(&["courier-upload", "availability", "-c", "ACME"], Command::Availability(ClientArgs { client: Some("ACME".to_owned()) }))]
#[case::check_key(&["courier-upload", "check-key"], Command::CheckKey)]
fn cli_parses_subcommands(#[case] args: &[&str], #[case] expected: Command) {
    assert_eq!(parse_with_env(args, &[]).command, expected);
}

#[test]
fn settings_fall_back_to_environment() {
    let cli = parse_with_env(
        &["courier-upload", "upload"],
        &[
            ("COURIER_STORE_URL", "https://store.example.com"),
            ("COURIER_KEY_STORE", "/srv/keys"),
            ("COURIER_CHECK_KEY_EAGERLY", "true"),
            ("COURIER_LOG_LEVEL", "debug"),
        ],
    );
    assert_eq!(
        cli.settings.store_url.as_deref(),
        Some("https://store.example.com")
    );
    assert_eq!(cli.settings.key_store, Some(Utf8PathBuf::from("/srv/keys")));
    assert!(cli.settings.check_key_eagerly);
    assert_eq!(cli.settings.log_level, LogLevel::Debug);
}

#[test]
fn arguments_win_over_environment() {
    let cli = parse_with_env(
        &["courier-upload", "upload", "--key-store", "/opt/keys"],
        &[("COURIER_KEY_STORE", "/srv/keys")],
    );
    assert_eq!(cli.settings.key_store, Some(Utf8PathBuf::from("/opt/keys")));
}

#[test]
fn settings_are_accepted_after_the_subcommand() {
    let cli = parse_with_env(
        &["courier-upload", "check-key", "--pgp-key", "/keys/own.asc"],
        &[],
    );
    assert_eq!(cli.settings.pgp_key, Some(Utf8PathBuf::from("/keys/own.asc")));
}

#[test]
fn store_url_and_directory_conflict() {
    temp_env::with_vars_unset(COURIER_VARS, || {
        let result = Cli::try_parse_from([
            "courier-upload",
            "upload",
            "--store-url",
            "https://store.example.com",
            "--store-dir",
            "/srv/store",
        ]);
        assert!(result.is_err());
    });
}

#[test]
fn summary_masks_secrets() {
    let cli = parse_with_env(
        &["courier-upload", "upload", "--store-token", "s3cr3t"],
        &[("COURIER_PGP_PASSPHRASE", "hunter2")],
    );
    let summary = cli.settings.summary();
    let value = |name: &str| {
        summary
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone())
    };

    assert_eq!(value("store-token").as_deref(), Some("********"));
    assert_eq!(value("passphrase").as_deref(), Some("********"));
    assert_eq!(value("external-store-token").as_deref(), Some("-"));
    assert!(summary.iter().all(|(_, value)| !value.contains("s3cr3t")));
    assert!(summary.iter().all(|(_, value)| !value.contains("hunter2")));
}

#[test]
fn missing_setting_is_named() {
    let err = require(None::<String>, "key-store").expect_err("missing");
    assert_eq!(err.to_string(), "key-store is not configured");
}

#[rstest]
#[case(LogLevel::Error, LevelFilter::Error)]
#[case(LogLevel::Info, LevelFilter::Info)]
#[case(LogLevel::Trace, LevelFilter::Trace)]
fn log_levels_map_to_filters(#[case] level: LogLevel, #[case] expected: LevelFilter) {
    assert_eq!(LevelFilter::from(level), expected);
}
