use super::{unexpected, Reducer};
use crate::config::Authority;
use crate::events::{Event, EventKind};
use serde::Serialize;
use std::collections::HashSet;

/// Compteur alimenté par deux canaux disjoints : deltas ±1 (événements) et
/// remplacement absolu (polling). Un seul fait autorité pour la session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackedCounter {
    authority: Authority,
    value: u64,
    /// Poll : deltas reçus depuis le dernier poll, jamais ajoutés à `value`.
    /// Events : deltas reçus avant l'amorçage.
    unconfirmed: i64,
    seeded: bool,
}

impl TrackedCounter {
    pub fn new(authority: Authority) -> Self {
        Self {
            authority,
            value: 0,
            unconfirmed: 0,
            seeded: false,
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn unconfirmed(&self) -> i64 {
        self.unconfirmed
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn apply_delta(&mut self, delta: i64) {
        match self.authority {
            Authority::Events if self.seeded => self.value = offset(self.value, delta),
            _ => self.unconfirmed += delta,
        }
    }

    pub fn apply_poll(&mut self, polled: u64) {
        match self.authority {
            Authority::Poll => {
                self.value = polled;
                self.unconfirmed = 0;
                self.seeded = true;
            }
            Authority::Events if !self.seeded => {
                self.value = offset(polled, self.unconfirmed);
                self.unconfirmed = 0;
                self.seeded = true;
            }
            Authority::Events => {}
        }
    }
}

fn offset(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

const CONSUMES: &[EventKind] = &[
    EventKind::ExceptionGroupCountUpdated,
    EventKind::ArchivedMessagesUpdated,
    EventKind::PendingRetriesTotalUpdated,
    EventKind::MessageFailuresUpdated,
    EventKind::MessageFailed,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TabCounters {
    pub exception_groups: u64,
    pub archived_messages: u64,
    pub pending_retries: u64,
    pub failed_messages: u64,
    pub unconfirmed_failures: i64,
}

/// Compteurs des onglets de messages en échec. Groupes d'exceptions,
/// archives et retries ne viennent que du polling. Un MessageFailed
/// redélivré (même identifiant) ne compte qu'une fois.
#[derive(Debug)]
pub struct TabCountersReducer {
    exception_groups: u64,
    archived_messages: u64,
    pending_retries: u64,
    failed_messages: TrackedCounter,
    seen_failures: HashSet<String>,
}

impl TabCountersReducer {
    pub fn new(failed_messages: Authority) -> Self {
        Self {
            exception_groups: 0,
            archived_messages: 0,
            pending_retries: 0,
            failed_messages: TrackedCounter::new(failed_messages),
            seen_failures: HashSet::new(),
        }
    }
}

impl Reducer for TabCountersReducer {
    type Snapshot = TabCounters;

    fn consumes(&self) -> &'static [EventKind] {
        CONSUMES
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::ExceptionGroupCountUpdated(n) => self.exception_groups = *n,
            Event::ArchivedMessagesUpdated(n) => self.archived_messages = *n,
            Event::PendingRetriesTotalUpdated(n) => self.pending_retries = *n,
            Event::MessageFailuresUpdated(n) => self.failed_messages.apply_poll(*n),
            Event::MessageFailed(failed) => {
                if self.seen_failures.insert(failed.failed_message_id.clone()) {
                    self.failed_messages.apply_delta(1);
                }
            }
            other => return unexpected(other),
        }
        Ok(())
    }

    fn snapshot(&self) -> TabCounters {
        TabCounters {
            exception_groups: self.exception_groups,
            archived_messages: self.archived_messages,
            pending_retries: self.pending_retries,
            failed_messages: self.failed_messages.value(),
            unconfirmed_failures: self.failed_messages.unconfirmed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageFailed;

    fn failed(id: &str) -> Event {
        Event::MessageFailed(MessageFailed {
            failed_message_id: id.into(),
            message_type: None,
            receiving_endpoint: None,
            time_of_failure: None,
            exception_message: None,
        })
    }

    #[test]
    fn test_poll_authority_never_double_counts() {
        let mut counter = TrackedCounter::new(Authority::Poll);
        counter.apply_poll(10);
        counter.apply_delta(1);
        counter.apply_delta(1);
        assert_eq!(counter.value(), 10);
        assert_eq!(counter.unconfirmed(), 2);

        // le poll suivant inclut déjà les deux échecs
        counter.apply_poll(12);
        assert_eq!(counter.value(), 12);
        assert_eq!(counter.unconfirmed(), 0);
    }

    #[test]
    fn test_event_authority_seeds_once() {
        let mut counter = TrackedCounter::new(Authority::Events);
        counter.apply_delta(1);
        assert_eq!(counter.value(), 0);

        counter.apply_poll(5);
        assert!(counter.is_seeded());
        assert_eq!(counter.value(), 6);

        counter.apply_delta(-1);
        counter.apply_poll(100);
        assert_eq!(counter.value(), 5);
    }

    #[test]
    fn test_never_negative() {
        let mut counter = TrackedCounter::new(Authority::Events);
        counter.apply_poll(1);
        counter.apply_delta(-1);
        counter.apply_delta(-1);
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_either_arrival_order_converges() {
        // poll puis événement, ou événement puis poll : même valeur affichée
        let mut a = TabCountersReducer::new(Authority::Poll);
        a.apply(&Event::MessageFailuresUpdated(3)).unwrap();
        a.apply(&failed("m1")).unwrap();
        a.apply(&Event::MessageFailuresUpdated(4)).unwrap();

        let mut b = TabCountersReducer::new(Authority::Poll);
        b.apply(&failed("m1")).unwrap();
        b.apply(&Event::MessageFailuresUpdated(4)).unwrap();

        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.snapshot().failed_messages, 4);
    }

    #[test]
    fn test_redelivered_failure_counts_once() {
        let mut reducer = TabCountersReducer::new(Authority::Events);
        reducer.apply(&Event::MessageFailuresUpdated(5)).unwrap();
        reducer.apply(&failed("m-1")).unwrap();
        reducer.apply(&failed("m-1")).unwrap();
        assert_eq!(reducer.snapshot().failed_messages, 6);

        reducer.apply(&failed("m-2")).unwrap();
        assert_eq!(reducer.snapshot().failed_messages, 7);

        let mut polled = TabCountersReducer::new(Authority::Poll);
        polled.apply(&failed("m-1")).unwrap();
        polled.apply(&failed("m-1")).unwrap();
        assert_eq!(polled.snapshot().unconfirmed_failures, 1);
    }

    #[test]
    fn test_polled_scalars_are_replaced() {
        let mut reducer = TabCountersReducer::new(Authority::Poll);
        reducer.apply(&Event::ExceptionGroupCountUpdated(4)).unwrap();
        reducer.apply(&Event::ArchivedMessagesUpdated(9)).unwrap();
        reducer.apply(&Event::PendingRetriesTotalUpdated(2)).unwrap();
        reducer.apply(&Event::ExceptionGroupCountUpdated(1)).unwrap();

        let snapshot = reducer.snapshot();
        assert_eq!(snapshot.exception_groups, 1);
        assert_eq!(snapshot.archived_messages, 9);
        assert_eq!(snapshot.pending_retries, 2);
        assert!(reducer.apply(&Event::AlertRaised(crate::models::Alert {
            id: None,
            description: "x".into(),
            severity: None,
            raised_at: None,
            related_to: vec![],
        }))
        .is_err());
    }
}
