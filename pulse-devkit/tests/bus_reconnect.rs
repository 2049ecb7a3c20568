use pulse_devkit::{wait_until, PulseEventBuilder, TestHarness};
use pulse_kernel::bus::BusState;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn bus_retries_with_backoff_until_connected() {
    let mut harness = TestHarness::new();
    harness.push.refuse_next_connects(2);
    let session = harness.start_session().unwrap();

    // backoff 1s puis 2s
    assert!(wait_until(Duration::from_secs(10), || harness.health.bus_state() == BusState::Connected).await);
    assert_eq!(harness.push.connect_count(), 3);
    assert_eq!(harness.health.get_health().bus_reconnects, 2);

    session.stop().await;
    assert_eq!(harness.health.bus_state(), BusState::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn events_after_a_drop_are_still_delivered() {
    let mut harness = TestHarness::new();
    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();
    assert!(wait_until(Duration::from_secs(1), || harness.health.bus_state() == BusState::Connected).await);

    harness.push.drop_connection().unwrap();
    harness
        .push
        .simulate_incoming("AlertRaised", PulseEventBuilder::alert_raised(Some("a-1"), "disk almost full"))
        .unwrap();
    harness
        .push
        .simulate_incoming("AlertRaised", PulseEventBuilder::alert_raised(Some("a-1"), "disk almost full"))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || !dashboard.alerts.snapshot().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // redélivrance après reconnexion : un seul élément par identifiant
    assert_eq!(dashboard.alerts.snapshot().len(), 1);
    assert_eq!(harness.push.connect_count(), 2);
    assert_eq!(harness.health.bus_state(), BusState::Connected);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_events_do_not_break_the_bus() {
    let mut harness = TestHarness::new();
    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();

    harness.push.simulate_raw("CustomCheckFailed", "{not json").unwrap();
    harness
        .push
        .simulate_incoming("ExceptionGroupCountUpdated", serde_json::json!(42))
        .unwrap();
    harness
        .push
        .simulate_incoming("CustomCheckFailed", PulseEventBuilder::custom_check_failed("db", "timeout"))
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || dashboard.custom_checks.snapshot().failed_checks == 1).await);
    // les compteurs locaux ne peuvent pas être injectés depuis le réseau
    assert_eq!(dashboard.tabs.snapshot().exception_groups, 0);
    assert_eq!(harness.health.get_health().events_received, 1);
    assert_eq!(harness.push.connect_count(), 1);

    session.stop().await;
}
