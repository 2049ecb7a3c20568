use super::{unexpected, Reducer};
use crate::events::{Event, EventKind};
use crate::models::MonitoredEndpoint;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringSnapshot {
    pub endpoints: Vec<MonitoredEndpoint>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Fenêtre courante des métriques : chaque poll remplace tout, aucun
/// historique n'est conservé.
#[derive(Debug, Default)]
pub struct MonitoringReducer {
    endpoints: Vec<MonitoredEndpoint>,
    updated_at: Option<OffsetDateTime>,
}

impl Reducer for MonitoringReducer {
    type Snapshot = MonitoringSnapshot;

    fn consumes(&self) -> &'static [EventKind] {
        &[EventKind::MonitoredEndpointsUpdated]
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::MonitoredEndpointsUpdated(endpoints) => {
                self.endpoints = endpoints.clone();
                self.endpoints.sort_by(|a, b| a.name.cmp(&b.name));
                self.updated_at = Some(OffsetDateTime::now_utc());
                Ok(())
            }
            other => unexpected(other),
        }
    }

    fn snapshot(&self) -> MonitoringSnapshot {
        MonitoringSnapshot {
            endpoints: self.endpoints.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointMetrics, MetricSeries};

    fn endpoint(name: &str, average: f64) -> MonitoredEndpoint {
        MonitoredEndpoint {
            name: name.into(),
            metrics: EndpointMetrics {
                throughput: Some(MetricSeries {
                    average,
                    points: vec![average; 3],
                }),
                ..EndpointMetrics::default()
            },
        }
    }

    #[test]
    fn test_each_poll_replaces_the_window() {
        let mut reducer = MonitoringReducer::default();
        assert!(reducer.snapshot().updated_at.is_none());

        reducer
            .apply(&Event::MonitoredEndpointsUpdated(vec![endpoint("Sales", 1.0), endpoint("Billing", 2.0)]))
            .unwrap();
        reducer
            .apply(&Event::MonitoredEndpointsUpdated(vec![endpoint("Sales", 4.0)]))
            .unwrap();

        let snapshot = reducer.snapshot();
        assert_eq!(snapshot.endpoints.len(), 1);
        assert_eq!(snapshot.endpoints[0].metrics.throughput.as_ref().unwrap().average, 4.0);
        assert!(snapshot.updated_at.is_some());
    }

    #[test]
    fn test_endpoints_sorted_by_name() {
        let mut reducer = MonitoringReducer::default();
        reducer
            .apply(&Event::MonitoredEndpointsUpdated(vec![endpoint("Sales", 1.0), endpoint("Billing", 2.0)]))
            .unwrap();
        let names: Vec<_> = reducer.snapshot().endpoints.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Billing", "Sales"]);
    }
}
