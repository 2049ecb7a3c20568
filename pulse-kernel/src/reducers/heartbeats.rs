use super::{unexpected, Reducer};
use crate::events::{Event, EventKind};
use crate::models::{HeartbeatEntry, HeartbeatKey, HeartbeatRecord, HeartbeatStats};
use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;

const CONSUMES: &[EventKind] = &[
    EventKind::EndpointFailedToHeartbeat,
    EventKind::EndpointHeartbeatRestored,
    EventKind::HeartbeatingEndpointDetected,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatSnapshot {
    pub stats: HeartbeatStats,
    pub records: Vec<HeartbeatRecord>,
}

/// Ensemble de heartbeats indexé par (endpoint, machine).
///
/// `active` suit l'ordre d'arrivée, jamais l'horodatage embarqué.
///
/// Compteurs : stats initiales du backend + deltas ±1, un delta par
/// changement d'état réel d'une clé. Une clé inconnue qui passe en échec
/// (ou revient) est supposée comptée dans les stats initiales avec l'état
/// opposé ; une détection est un nouvel endpoint. Sans stats initiales, les
/// compteurs sont dérivés de l'ensemble.
#[derive(Debug, Default)]
pub struct HeartbeatReducer {
    records: BTreeMap<HeartbeatKey, HeartbeatRecord>,
    baseline: Option<HeartbeatStats>,
    active_delta: i64,
    failing_delta: i64,
}

impl HeartbeatReducer {
    /// `prior` : état supposé d'une clé encore inconnue (`None` = nouvelle)
    pub fn upsert(&mut self, key: HeartbeatKey, active: bool, at: OffsetDateTime, prior: Option<bool>) {
        let previous = match self.records.get_mut(&key) {
            Some(record) => {
                let previous = Some(record.active);
                record.active = active;
                record.last_updated_at = at;
                previous
            }
            None => {
                self.records.insert(
                    key.clone(),
                    HeartbeatRecord {
                        endpoint_name: key.endpoint_name,
                        machine_name: key.machine_name,
                        active,
                        last_updated_at: at,
                    },
                );
                prior
            }
        };
        self.count_transition(previous, active);
    }

    fn count_transition(&mut self, previous: Option<bool>, active: bool) {
        match (previous, active) {
            (Some(before), now) if before == now => {}
            (Some(_), true) => {
                self.active_delta += 1;
                self.failing_delta -= 1;
            }
            (Some(_), false) => {
                self.active_delta -= 1;
                self.failing_delta += 1;
            }
            (None, true) => self.active_delta += 1,
            (None, false) => self.failing_delta += 1,
        }
    }

    /// Liste initiale : n'insère que les clés inconnues, les événements déjà
    /// reçus sont plus récents que l'instantané. Ces clés sont déjà comptées
    /// dans les stats initiales, aucun delta.
    pub fn seed(&mut self, entries: Vec<HeartbeatEntry>, now: OffsetDateTime) -> usize {
        let mut inserted = 0;
        for entry in entries {
            let record = entry.into_record(now);
            if let std::collections::btree_map::Entry::Vacant(slot) = self.records.entry(record.key()) {
                slot.insert(record);
                inserted += 1;
            }
        }
        inserted
    }

    pub fn set_baseline(&mut self, stats: HeartbeatStats) {
        self.baseline = Some(stats);
    }

    pub fn stats(&self) -> HeartbeatStats {
        match self.baseline {
            Some(baseline) => HeartbeatStats {
                active_endpoints: offset(baseline.active_endpoints, self.active_delta),
                failing_endpoints: offset(baseline.failing_endpoints, self.failing_delta),
            },
            None => {
                let active = self.records.values().filter(|r| r.active).count() as u64;
                HeartbeatStats {
                    active_endpoints: active,
                    failing_endpoints: self.records.len() as u64 - active,
                }
            }
        }
    }

    pub fn get(&self, key: &HeartbeatKey) -> Option<&HeartbeatRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn offset(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

impl Reducer for HeartbeatReducer {
    type Snapshot = HeartbeatSnapshot;

    fn consumes(&self) -> &'static [EventKind] {
        CONSUMES
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event.heartbeat_update() {
            Some((key, active, at)) => {
                let prior = match event {
                    Event::HeartbeatingEndpointDetected(_) => None,
                    _ => Some(!active),
                };
                self.upsert(key, active, at.unwrap_or_else(OffsetDateTime::now_utc), prior);
                Ok(())
            }
            None => unexpected(event),
        }
    }

    fn snapshot(&self) -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            stats: self.stats(),
            records: self.records.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EndpointDetected, HeartbeatLost, HeartbeatRestored};
    use time::macros::datetime;

    fn lost(endpoint: &str, machine: &str) -> Event {
        Event::EndpointFailedToHeartbeat(HeartbeatLost {
            endpoint: endpoint.into(),
            machine: machine.into(),
            last_received_at: Some(datetime!(2024-03-01 10:00 UTC)),
        })
    }

    fn restored(endpoint: &str, machine: &str) -> Event {
        Event::EndpointHeartbeatRestored(HeartbeatRestored {
            endpoint: endpoint.into(),
            machine: machine.into(),
            // horodatage plus ancien : ne doit pas influencer l'ordre
            restored_at: Some(datetime!(2020-01-01 00:00 UTC)),
        })
    }

    fn detected(endpoint: &str, machine: &str) -> Event {
        Event::HeartbeatingEndpointDetected(EndpointDetected {
            endpoint: endpoint.into(),
            machine: machine.into(),
            detected_at: None,
        })
    }

    #[test]
    fn test_repeated_keys_yield_one_record_with_last_state() {
        let mut reducer = HeartbeatReducer::default();
        let sequence = [
            detected("Sales", "m1"),
            lost("Sales", "m1"),
            detected("Sales", "m1"),
            lost("Sales", "m2"),
            restored("Sales", "m1"),
            lost("Sales", "m1"),
            restored("Sales", "m2"),
            restored("Sales", "m2"),
        ];
        for event in &sequence {
            reducer.apply(event).unwrap();
        }

        assert_eq!(reducer.len(), 2);
        assert!(!reducer.get(&HeartbeatKey::new("Sales", "m1")).unwrap().active);
        let m2 = reducer.get(&HeartbeatKey::new("Sales", "m2")).unwrap();
        assert!(m2.active);
        assert_eq!(m2.last_updated_at, datetime!(2020-01-01 00:00 UTC));

        let stats = reducer.stats();
        assert_eq!(stats.active_endpoints, 1);
        assert_eq!(stats.failing_endpoints, 1);
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let mut reducer = HeartbeatReducer::default();
        reducer.apply(&lost("Billing", "m1")).unwrap();
        reducer.apply(&lost("Billing", "m1")).unwrap();
        assert_eq!(reducer.stats().failing_endpoints, 1);
        assert_eq!(reducer.stats().active_endpoints, 0);
    }

    fn entry(endpoint: &str, machine: &str, active: bool) -> HeartbeatEntry {
        HeartbeatEntry {
            endpoint: endpoint.into(),
            machine: machine.into(),
            active,
            last_sent_at: None,
        }
    }

    fn stats(active: u64, failing: u64) -> HeartbeatStats {
        HeartbeatStats {
            active_endpoints: active,
            failing_endpoints: failing,
        }
    }

    #[test]
    fn test_seed_never_overrides_pushed_state() {
        let mut reducer = HeartbeatReducer::default();
        reducer.set_baseline(stats(10, 0));
        reducer.apply(&lost("Sales", "m1")).unwrap();
        assert_eq!(reducer.stats(), stats(9, 1));

        let inserted = reducer.seed(
            vec![entry("Sales", "m1", true), entry("Shipping", "m1", true)],
            datetime!(2024-03-01 09:00 UTC),
        );

        assert_eq!(inserted, 1);
        assert!(!reducer.get(&HeartbeatKey::new("Sales", "m1")).unwrap().active);
        // les clés de la liste sont déjà dans les stats initiales
        assert_eq!(reducer.stats(), stats(9, 1));
    }

    #[test]
    fn test_events_move_baseline_without_list() {
        let mut reducer = HeartbeatReducer::default();
        reducer.set_baseline(stats(3, 0));
        for machine in ["m1", "m2", "m3"] {
            reducer.apply(&lost("Sales", machine)).unwrap();
        }
        assert_eq!(reducer.stats(), stats(0, 3));

        reducer.apply(&restored("Sales", "m2")).unwrap();
        reducer.apply(&restored("Sales", "m2")).unwrap();
        reducer.apply(&detected("Billing", "m9")).unwrap();
        assert_eq!(reducer.stats(), stats(2, 2));
    }

    #[test]
    fn test_empty_list_keeps_baseline() {
        let mut reducer = HeartbeatReducer::default();
        reducer.set_baseline(stats(4, 0));
        assert_eq!(reducer.seed(Vec::new(), datetime!(2024-03-01 09:00 UTC)), 0);
        assert_eq!(reducer.stats(), stats(4, 0));
    }

    #[test]
    fn test_seeded_keys_move_on_transition_only() {
        let mut reducer = HeartbeatReducer::default();
        reducer.set_baseline(stats(2, 1));
        reducer.seed(
            vec![entry("Sales", "m1", true), entry("Billing", "m2", false)],
            datetime!(2024-03-01 09:00 UTC),
        );
        reducer.apply(&lost("Billing", "m2")).unwrap();
        assert_eq!(reducer.stats(), stats(2, 1));
        reducer.apply(&lost("Sales", "m1")).unwrap();
        assert_eq!(reducer.stats(), stats(1, 2));
    }

    #[test]
    fn test_unconsumed_event_is_rejected() {
        let mut reducer = HeartbeatReducer::default();
        assert!(reducer.apply(&Event::ArchivedMessagesUpdated(1)).is_err());
        assert!(reducer.is_empty());
    }
}
