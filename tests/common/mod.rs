//! Shared helpers for endpoint integration tests

// not every test binary uses every helper
#![allow(dead_code)]

pub mod mock_driver;

use s7_endpoint::{EndpointConfig, EndpointStatus, S7Endpoint, VariableDef};
use std::time::Duration;
use tokio::sync::watch;

/// Initialize test logging; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Endpoint configuration pointing at the mock driver, cyclic reads disabled
/// unless the test turns them on.
pub fn test_config(variables: &[(&str, &str)]) -> EndpointConfig {
    let mut config = EndpointConfig::new("plc.test.local");
    config.cycle_time_ms = 0;
    config.variables = variables
        .iter()
        .map(|(name, addr)| VariableDef {
            name: name.to_string(),
            addr: addr.to_string(),
        })
        .collect();
    config
}

/// Wait until the endpoint publishes the given status.
pub async fn wait_for_status(endpoint: &S7Endpoint, expected: EndpointStatus) {
    let mut rx = endpoint.subscribe_status();
    let wait = async {
        while *rx.borrow_and_update() != expected {
            rx.changed().await.expect("status channel closed");
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .unwrap_or_else(|_| panic!("endpoint never reached status {expected}"));
}

/// Assert that no further status change is pending.
pub fn assert_no_status_change(rx: &mut watch::Receiver<EndpointStatus>) {
    assert!(
        !rx.has_changed().expect("status channel closed"),
        "unexpected status change to {}",
        *rx.borrow()
    );
}

/// Receive the next broadcast event or panic after a grace period.
pub async fn recv_event<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}
