//! Write queue integration tests: ordering, error handling, offline queueing

mod common;

use common::mock_driver::MockDriver;
use common::{init_tracing, test_config, wait_for_status};
use s7_endpoint::{EndpointError, EndpointStatus, S7Endpoint, RECONNECT_DELAY};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn writes_reach_the_driver_in_submission_order() {
    init_tracing();
    let driver = MockDriver::new();

    let endpoint = S7Endpoint::start(test_config(&[("a", "DB1,INT0")]), driver.clone()).unwrap();
    wait_for_status(&endpoint, EndpointStatus::Online).await;

    let ack1 = endpoint.submit_write("w1", json!(1)).unwrap();
    let ack2 = endpoint.submit_write("w2", json!([2, 3])).unwrap();
    let ack3 = endpoint.submit_write("w3", json!("fast")).unwrap();

    ack1.wait().await.unwrap();
    ack2.wait().await.unwrap();
    ack3.wait().await.unwrap();

    assert_eq!(
        driver.writes(),
        vec![
            ("w1".to_string(), json!(1)),
            ("w2".to_string(), json!([2, 3])),
            ("w3".to_string(), json!("fast")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn a_failed_write_reports_bad_values_and_the_queue_keeps_draining() {
    init_tracing();
    let driver = MockDriver::new();
    driver.script_write_error("nack from cpu");

    let endpoint = S7Endpoint::start(test_config(&[("a", "DB1,INT0")]), driver.clone()).unwrap();
    wait_for_status(&endpoint, EndpointStatus::Online).await;

    let ack = endpoint.submit_write("w1", json!(1)).unwrap();
    let err = ack.wait().await.unwrap_err();
    assert!(matches!(err, EndpointError::Write(_)));
    wait_for_status(&endpoint, EndpointStatus::BadValues).await;

    // the next write still goes out, and success restores the status
    let ack = endpoint.submit_write("w2", json!(2)).unwrap();
    ack.wait().await.unwrap();
    wait_for_status(&endpoint, EndpointStatus::Online).await;

    assert_eq!(driver.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn writes_submitted_while_offline_drain_after_reconnect() {
    init_tracing();
    let driver = MockDriver::new();
    driver.script_connect_error("connection refused");

    let endpoint = S7Endpoint::start(test_config(&[("a", "DB1,INT0")]), driver.clone()).unwrap();
    wait_for_status(&endpoint, EndpointStatus::Offline).await;

    let ack = endpoint.submit_write("setpoint", json!(42)).unwrap();
    assert!(driver.writes().is_empty());

    // the retry brings the connection up and flushes the queue
    tokio::time::sleep(RECONNECT_DELAY * 2).await;
    wait_for_status(&endpoint, EndpointStatus::Online).await;
    ack.wait().await.unwrap();
    assert_eq!(driver.writes(), vec![("setpoint".to_string(), json!(42))]);
}

#[tokio::test(start_paused = true)]
async fn writes_need_a_variable_name() {
    init_tracing();
    let driver = MockDriver::new();

    let endpoint = S7Endpoint::start(test_config(&[("a", "DB1,INT0")]), driver.clone()).unwrap();
    wait_for_status(&endpoint, EndpointStatus::Online).await;

    let err = endpoint.submit_write("", json!(1)).unwrap_err();
    assert!(matches!(err, EndpointError::InvalidInput(_)));
}
