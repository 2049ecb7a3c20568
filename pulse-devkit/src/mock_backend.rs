/*!
Mock ServiceControl pour tests sans backend

Implémente `ServiceControlApi` en mémoire : réponses configurables, compteur
d'appels par opération, injection d'échecs et de latence.
*/

use parking_lot::Mutex;
use pulse_kernel::backend::ServiceControlApi;
use pulse_kernel::error::{PulseError, Result};
use pulse_kernel::models::{
    Alert, FailedMessage, FailedMessageStats, HeartbeatEntry, HeartbeatStats, MonitoredEndpoint,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct MockState {
    heartbeat_stats: HeartbeatStats,
    heartbeats: Vec<HeartbeatEntry>,
    alerts: Vec<Alert>,
    failed_messages: Vec<FailedMessage>,
    failed_message_stats: FailedMessageStats,
    exception_groups: u64,
    archived_messages: u64,
    pending_retries: u64,
    total_failed_messages: u64,
    monitored_endpoints: Vec<MonitoredEndpoint>,
    monitoring_urls: Vec<String>,
    retries_requested: usize,
}

/// Noms d'opérations utilisés pour `calls`, `fail` et `recover`
pub mod ops {
    pub const HEARTBEAT_STATS: &str = "heartbeat_stats";
    pub const HEARTBEATS: &str = "heartbeats";
    pub const ALERTS: &str = "alerts";
    pub const FAILED_MESSAGES: &str = "failed_messages";
    pub const FAILED_MESSAGE_STATS: &str = "failed_message_stats";
    pub const EXCEPTION_GROUPS: &str = "total_exception_groups";
    pub const ARCHIVED_MESSAGES: &str = "total_archived_messages";
    pub const PENDING_RETRIES: &str = "total_pending_retries";
    pub const TOTAL_FAILED_MESSAGES: &str = "total_failed_messages";
    pub const RETRY_ALL: &str = "retry_all_failed_messages";
    pub const MONITORED_ENDPOINTS: &str = "monitored_endpoints";
}

#[derive(Clone, Default)]
pub struct MockServiceControl {
    state: Arc<Mutex<MockState>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    delay: Arc<Mutex<Duration>>,
}

impl MockServiceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_heartbeat_stats(&self, active: u64, failing: u64) {
        self.state.lock().heartbeat_stats = HeartbeatStats {
            active_endpoints: active,
            failing_endpoints: failing,
        };
    }

    pub fn set_heartbeats(&self, heartbeats: Vec<HeartbeatEntry>) {
        self.state.lock().heartbeats = heartbeats;
    }

    pub fn set_alerts(&self, alerts: Vec<Alert>) {
        self.state.lock().alerts = alerts;
    }

    pub fn set_failed_messages(&self, messages: Vec<FailedMessage>) {
        self.state.lock().failed_messages = messages;
    }

    pub fn set_failed_message_stats(&self, stats: FailedMessageStats) {
        self.state.lock().failed_message_stats = stats;
    }

    pub fn set_totals(&self, exception_groups: u64, archived: u64, pending_retries: u64, failed_messages: u64) {
        let mut state = self.state.lock();
        state.exception_groups = exception_groups;
        state.archived_messages = archived;
        state.pending_retries = pending_retries;
        state.total_failed_messages = failed_messages;
    }

    pub fn set_monitored_endpoints(&self, endpoints: Vec<MonitoredEndpoint>) {
        self.state.lock().monitored_endpoints = endpoints;
    }

    /// Latence appliquée à chaque appel (temps tokio, compatible `start_paused`)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn retries_requested(&self) -> usize {
        self.state.lock().retries_requested
    }

    /// Adresses de monitoring reçues, dans l'ordre des appels
    pub fn monitoring_urls(&self) -> Vec<String> {
        self.state.lock().monitoring_urls.clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    async fn respond<T>(&self, op: &'static str, pick: fn(&mut MockState) -> T) -> Result<T> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(op) {
            return Err(PulseError::ConnectivityFailure(format!("{op}: 503 Service Unavailable")));
        }
        Ok(pick(&mut self.state.lock()))
    }
}

impl ServiceControlApi for MockServiceControl {
    async fn heartbeat_stats(&self) -> Result<HeartbeatStats> {
        self.respond(ops::HEARTBEAT_STATS, |s| s.heartbeat_stats).await
    }

    async fn heartbeats(&self) -> Result<Vec<HeartbeatEntry>> {
        self.respond(ops::HEARTBEATS, |s| s.heartbeats.clone()).await
    }

    async fn alerts(&self) -> Result<Vec<Alert>> {
        self.respond(ops::ALERTS, |s| s.alerts.clone()).await
    }

    async fn failed_messages(&self) -> Result<Vec<FailedMessage>> {
        self.respond(ops::FAILED_MESSAGES, |s| s.failed_messages.clone()).await
    }

    async fn failed_message_stats(&self) -> Result<FailedMessageStats> {
        self.respond(ops::FAILED_MESSAGE_STATS, |s| s.failed_message_stats.clone()).await
    }

    async fn total_exception_groups(&self) -> Result<u64> {
        self.respond(ops::EXCEPTION_GROUPS, |s| s.exception_groups).await
    }

    async fn total_archived_messages(&self) -> Result<u64> {
        self.respond(ops::ARCHIVED_MESSAGES, |s| s.archived_messages).await
    }

    async fn total_pending_retries(&self) -> Result<u64> {
        self.respond(ops::PENDING_RETRIES, |s| s.pending_retries).await
    }

    async fn total_failed_messages(&self) -> Result<u64> {
        self.respond(ops::TOTAL_FAILED_MESSAGES, |s| s.total_failed_messages).await
    }

    async fn retry_all_failed_messages(&self) -> Result<()> {
        self.respond(ops::RETRY_ALL, |s| s.retries_requested += 1).await
    }

    async fn monitored_endpoints(&self, monitoring_url: &str) -> Result<Vec<MonitoredEndpoint>> {
        self.state.lock().monitoring_urls.push(monitoring_url.to_string());
        self.respond(ops::MONITORED_ENDPOINTS, |s| s.monitored_endpoints.clone()).await
    }
}
