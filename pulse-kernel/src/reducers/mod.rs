/**
 * STATE REDUCERS - Une entité, un écrivain
 *
 * RÔLE :
 * Chaque reducer possède un type d'entité, déclare les événements qu'il
 * consomme et replie chaque événement ou résultat de poll dans son état.
 *
 * FONCTIONNEMENT :
 * - `bind` abonne le reducer sous un scope : il meurt avec la vue
 * - Les résultats de fetch initiaux passent par des méthodes dédiées
 *   (`seed`, `replace`...) appelées sous le même verrou
 * - `snapshot()` renvoie une copie sérialisable pour l'API de statut
 */

pub mod counters;
pub mod custom_checks;
pub mod heartbeats;
pub mod lists;
pub mod monitoring;

use crate::events::{Event, EventKind};
use crate::notifier::Notifier;
use crate::scope::ScopeToken;
use crate::state::{new_state, Shared};
use serde::Serialize;

pub use counters::{TabCounters, TabCountersReducer, TrackedCounter};
pub use custom_checks::{CustomChecksReducer, CustomChecksSnapshot};
pub use heartbeats::{HeartbeatReducer, HeartbeatSnapshot};
pub use lists::{tags_from_stats, AlertsReducer, FailedMessagesReducer, FailedMessagesSnapshot};
pub use monitoring::{MonitoringReducer, MonitoringSnapshot};

pub trait Reducer: Send + 'static {
    type Snapshot: Clone + Serialize + Send + 'static;

    fn consumes(&self) -> &'static [EventKind];
    fn apply(&mut self, event: &Event) -> anyhow::Result<()>;
    fn snapshot(&self) -> Self::Snapshot;
}

/// Abonne `reducer` à tous ses événements sous `scope`
pub fn bind<R: Reducer>(notifier: &Notifier, scope: &ScopeToken, reducer: R) -> Shared<R> {
    let shared = new_state(reducer);
    let kinds = shared.lock().consumes();
    for kind in kinds {
        let target = shared.clone();
        notifier.subscribe(scope, *kind, move |event| target.lock().apply(event));
    }
    shared
}

pub(crate) fn unexpected(event: &Event) -> anyhow::Result<()> {
    anyhow::bail!("reducer does not consume {}", event.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTracker;

    #[test]
    fn test_bind_routes_only_consumed_events() {
        let notifier = Notifier::new(HealthTracker::new());
        let scope = ScopeToken::new("custom-checks");
        let reducer = bind(&notifier, &scope, CustomChecksReducer::default());
        assert_eq!(notifier.scope_subscriptions(&scope), 2);

        notifier.publish(&Event::CustomCheckFailed(crate::events::CustomCheckFailed {
            custom_check_id: "disk".into(),
            category: None,
            failure_reason: None,
            failed_at: None,
        }));
        notifier.publish(&Event::ArchivedMessagesUpdated(3));
        assert_eq!(reducer.lock().snapshot().failed_checks, 1);

        notifier.release_scope(&scope);
        notifier.publish(&Event::CustomCheckSucceeded(crate::events::CustomCheckSucceeded {
            custom_check_id: "disk".into(),
            succeeded_at: None,
        }));
        assert_eq!(reducer.lock().snapshot().failed_checks, 1);
    }
}
