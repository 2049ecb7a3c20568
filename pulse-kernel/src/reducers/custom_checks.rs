use super::{unexpected, Reducer};
use crate::events::{CustomCheckFailed, Event, EventKind};
use serde::Serialize;
use std::collections::BTreeMap;

const CONSUMES: &[EventKind] = &[EventKind::CustomCheckFailed, EventKind::CustomCheckSucceeded];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomChecksSnapshot {
    pub failed_checks: u64,
    pub failing: Vec<CustomCheckFailed>,
}

/// Checks en échec indexés par identifiant : un échec répété ne compte
/// qu'une fois, un succès sur un check inconnu ne décrémente rien.
#[derive(Debug, Default)]
pub struct CustomChecksReducer {
    failing: BTreeMap<String, CustomCheckFailed>,
}

impl Reducer for CustomChecksReducer {
    type Snapshot = CustomChecksSnapshot;

    fn consumes(&self) -> &'static [EventKind] {
        CONSUMES
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::CustomCheckFailed(failed) => {
                self.failing.insert(failed.custom_check_id.clone(), failed.clone());
            }
            Event::CustomCheckSucceeded(succeeded) => {
                self.failing.remove(&succeeded.custom_check_id);
            }
            other => return unexpected(other),
        }
        Ok(())
    }

    fn snapshot(&self) -> CustomChecksSnapshot {
        CustomChecksSnapshot {
            failed_checks: self.failing.len() as u64,
            failing: self.failing.values().cloned().collect(),
        }
    }
}
