use pulse_devkit::mock_backend::ops;
use pulse_devkit::{wait_until, PulseEventBuilder, TestHarness};
use pulse_kernel::bus::BusState;
use pulse_kernel::endpoints::MonitoringEndpoint;
use pulse_kernel::models::{HeartbeatEntry, MonitoredEndpoint};
use std::time::Duration;

fn entry(endpoint: &str, machine: &str, active: bool) -> HeartbeatEntry {
    HeartbeatEntry {
        endpoint: endpoint.into(),
        machine: machine.into(),
        active,
        last_sent_at: None,
    }
}

fn monitored(name: &str) -> MonitoredEndpoint {
    MonitoredEndpoint {
        name: name.into(),
        metrics: Default::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn dashboard_converges_from_initial_fetch_push_and_polls() {
    let mut harness = TestHarness::new();
    harness.backend.set_heartbeat_stats(2, 1);
    harness
        .backend
        .set_heartbeats(vec![entry("Sales", "m1", true), entry("Billing", "m2", false)]);
    harness.backend.set_totals(3, 4, 5, 6);
    harness.backend.set_monitored_endpoints(vec![monitored("Shipping"), monitored("Billing")]);

    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();

    assert!(wait_until(Duration::from_secs(1), || dashboard.heartbeats.snapshot().records.len() == 2).await);
    let stats = dashboard.heartbeats.snapshot().stats;
    // les entrées de la liste sont déjà comptées dans les stats initiales
    assert_eq!((stats.active_endpoints, stats.failing_endpoints), (2, 1));

    harness
        .push
        .simulate_incoming("EndpointFailedToHeartbeat", PulseEventBuilder::heartbeat_lost("Sales", "m1"))
        .unwrap();
    assert!(wait_until(Duration::from_secs(1), || dashboard.heartbeats.snapshot().stats.failing_endpoints == 2).await);
    assert_eq!(dashboard.heartbeats.snapshot().stats.active_endpoints, 1);

    // un échec répété du même check ne compte qu'une fois
    for _ in 0..2 {
        harness
            .push
            .simulate_incoming("CustomCheckFailed", PulseEventBuilder::custom_check_failed("disk", "full"))
            .unwrap();
    }
    assert!(wait_until(Duration::from_secs(1), || harness.push.delivered() == 3).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dashboard.snapshot().counters.failed_checks, 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    let snapshot = dashboard.snapshot();
    assert_eq!(snapshot.counters.exception_groups, 3);
    assert_eq!(snapshot.counters.archived_messages, 4);
    assert_eq!(snapshot.counters.pending_retries, 5);
    assert_eq!(snapshot.counters.failed_messages, 6);

    let monitoring = snapshot.monitoring.expect("monitoring view mounted");
    let names: Vec<_> = monitoring.endpoints.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Billing", "Shipping"]);
    assert!(monitoring.updated_at.is_some());

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn tab_totals_are_fetched_on_mount() {
    let mut harness = TestHarness::new();
    harness.backend.set_totals(3, 4, 5, 6);
    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();

    // bien avant le premier tick (5s)
    assert!(wait_until(Duration::from_secs(1), || dashboard.tabs.snapshot().failed_messages == 6).await);
    let tabs = dashboard.tabs.snapshot();
    assert_eq!((tabs.exception_groups, tabs.archived_messages, tabs.pending_retries), (3, 4, 5));
    assert_eq!(harness.backend.calls(ops::EXCEPTION_GROUPS), 1);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn message_failed_is_unconfirmed_until_next_poll() {
    let mut harness = TestHarness::new();
    harness.backend.set_totals(0, 0, 0, 7);
    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();
    assert!(wait_until(Duration::from_secs(1), || dashboard.tabs.snapshot().failed_messages == 7).await);

    for _ in 0..2 {
        harness
            .push
            .simulate_incoming("MessageFailed", PulseEventBuilder::message_failed("m-1", "PlaceOrder"))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(1), || harness.push.delivered() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    // redélivrance : un seul échec, dans la liste comme dans le compteur
    assert_eq!(dashboard.tabs.snapshot().unconfirmed_failures, 1);
    assert_eq!(dashboard.failed_messages.snapshot().number_of_failed_messages, 1);
    assert_eq!(dashboard.tabs.snapshot().failed_messages, 7);

    harness.backend.set_totals(0, 0, 0, 8);
    tokio::time::sleep(Duration::from_secs(11)).await;
    let tabs = dashboard.tabs.snapshot();
    assert_eq!(tabs.failed_messages, 8);
    assert_eq!(tabs.unconfirmed_failures, 0);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_polls_and_discards_late_results() {
    let mut harness = TestHarness::new();
    harness.backend.set_delay(Duration::from_secs(3));
    let session = harness.start_session().unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    session.stop().await;
    harness.backend.reset_calls();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.backend.calls(ops::ARCHIVED_MESSAGES), 0);
    assert_eq!(harness.backend.calls(ops::EXCEPTION_GROUPS), 0);
    assert_eq!(harness.backend.calls(ops::MONITORED_ENDPOINTS), 0);

    let health = harness.health.get_health();
    assert!(health.discarded_results >= 1, "{health:?}");
    assert_eq!(health.bus_state, BusState::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn disabled_monitoring_never_polls() {
    let mut harness = TestHarness::new().with_monitoring(MonitoringEndpoint::Disabled);
    let session = harness.start_session().unwrap();
    assert!(session.dashboard().monitoring.is_none());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(harness.backend.calls(ops::MONITORED_ENDPOINTS), 0);
    assert!(session.dashboard().snapshot().monitoring.is_none());

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_poll_keeps_last_value() {
    let mut harness = TestHarness::new();
    harness.backend.set_totals(9, 0, 0, 0);
    let session = harness.start_session().unwrap();
    let dashboard = session.dashboard().clone();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(dashboard.tabs.snapshot().exception_groups, 9);

    harness.backend.fail(ops::EXCEPTION_GROUPS);
    harness.backend.set_totals(1, 0, 0, 0);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(dashboard.tabs.snapshot().exception_groups, 9);
    assert!(harness.health.get_health().poll_failures >= 1);

    harness.backend.recover(ops::EXCEPTION_GROUPS);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(dashboard.tabs.snapshot().exception_groups, 1);

    session.stop().await;
}
