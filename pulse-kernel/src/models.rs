use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Clé unique d'un heartbeat : (endpoint, machine)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeartbeatKey {
    pub endpoint_name: String,
    pub machine_name: String,
}

impl HeartbeatKey {
    pub fn new(endpoint_name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            machine_name: machine_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub endpoint_name: String,
    pub machine_name: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
}

impl HeartbeatRecord {
    pub fn key(&self) -> HeartbeatKey {
        HeartbeatKey::new(&self.endpoint_name, &self.machine_name)
    }
}

/// Entrée de la liste `GET heartbeats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    pub endpoint: String,
    pub machine: String,
    pub active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sent_at: Option<OffsetDateTime>,
}

impl HeartbeatEntry {
    pub fn into_record(self, fallback: OffsetDateTime) -> HeartbeatRecord {
        HeartbeatRecord {
            endpoint_name: self.endpoint,
            machine_name: self.machine,
            active: self.active,
            last_updated_at: self.last_sent_at.unwrap_or(fallback),
        }
    }
}

/// Réponse de `GET heartbeats/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatStats {
    pub active_endpoints: u64,
    pub failing_endpoints: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub active_endpoints: u64,
    pub failing_endpoints: u64,
    pub failed_messages: u64,
    pub exception_groups: u64,
    pub archived_messages: u64,
    pub pending_retries: u64,
    pub failed_checks: u64,
}

/// Tag de filtrage dérivé des facettes de stats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub category: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "raisedAt")]
    pub raised_at: Option<OffsetDateTime>,
    #[serde(default, alias = "relatedTo")]
    pub related_to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMessage {
    pub id: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub receiving_endpoint: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time_of_failure: Option<OffsetDateTime>,
    #[serde(default)]
    pub exception_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub range: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    #[serde(default)]
    pub values: Vec<FacetValue>,
}

/// Facettes des messages en échec : "machines", "endpoints", "message types"
pub type FailedMessageStats = HashMap<String, Facet>;

/// Catégories de tags, dans l'ordre d'affichage
pub const TAG_CATEGORIES: [&str; 3] = ["machines", "endpoints", "message types"];

/// Série affichée (fenêtre courante uniquement)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub points: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    #[serde(default)]
    pub throughput: Option<MetricSeries>,
    #[serde(default)]
    pub retries: Option<MetricSeries>,
    #[serde(default, alias = "processingTime")]
    pub processing_time: Option<MetricSeries>,
    #[serde(default, alias = "criticalTime")]
    pub critical_time: Option<MetricSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredEndpoint {
    pub name: String,
    #[serde(default)]
    pub metrics: EndpointMetrics,
}
