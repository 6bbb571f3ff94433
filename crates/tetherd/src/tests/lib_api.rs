//! Tests that exercise the crate's public re-exports.

use std::sync::Arc;

use rstest::rstest;
use tether_config::Config;

use crate::peer::TRANSPORT_NAME;
use crate::{BootstrapError, HealthReporter, StaticConfigLoader, bootstrap_with};

use super::support::{FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader};

fn reporter() -> (Arc<RecordingHealthReporter>, Arc<dyn HealthReporter>) {
    let recorder = Arc::new(RecordingHealthReporter::default());
    let shared: Arc<dyn HealthReporter> = recorder.clone();
    (recorder, shared)
}

#[rstest]
fn bootstrap_parses_listen_locators_with_identity_defaults() {
    let loader = TestConfigLoader::listening(&["TCP:127.0.0.1:0", " ", "UNIX:/tmp/x.sock"]);
    let (recorder, shared) = reporter();

    let bootstrap = bootstrap_with(&loader, &shared).expect("bootstrap should succeed");

    let endpoints = bootstrap.endpoints();
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].get(TRANSPORT_NAME), Some("TCP"));
    assert_eq!(endpoints[0].get("Name"), Some(bootstrap.identity().name.as_str()));
    assert_eq!(endpoints[1].host(), Some("/tmp/x.sock"));
    assert_eq!(
        recorder.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
}

#[rstest]
fn bootstrap_surfaces_cli_errors() {
    let (recorder, shared) = reporter();

    let error = bootstrap_with(&FailingConfigLoader, &shared).expect_err("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    assert!(error.cli_error().is_some());
    assert!(
        recorder
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)))
    );
}

#[rstest]
fn bootstrap_rejects_malformed_locators() {
    let config = Config {
        listen: vec!["TCP:;Port".to_owned()],
        log_filter: "off".to_owned(),
        ..Config::default()
    };
    let (_, shared) = reporter();

    let error = bootstrap_with(&StaticConfigLoader::new(config), &shared)
        .expect_err("locator should be rejected");

    assert!(matches!(error, BootstrapError::Locator { .. }));
    assert!(error.cli_error().is_none());
}

#[rstest]
fn static_loader_validates_configuration() {
    let config = Config {
        listen: vec![String::new()],
        ..Config::default()
    };
    let (_, shared) = reporter();

    let error = bootstrap_with(&StaticConfigLoader::new(config), &shared)
        .expect_err("empty listen list should be rejected");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
}
