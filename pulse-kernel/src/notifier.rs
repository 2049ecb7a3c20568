/**
 * NOTIFIER LOCAL - Relais publish/subscribe en mémoire
 *
 * RÔLE :
 * Découple les producteurs (Event Bus, résultats de polling) des
 * consommateurs (reducers des vues). Chaque abonnement est rattaché à un
 * ScopeToken et meurt avec lui.
 *
 * GARANTIES :
 * - Ordre d'invocation = ordre d'abonnement pour un même événement
 * - Un handler en échec (erreur ou panic) est isolé, reporté, les suivants
 *   s'exécutent quand même
 * - Aucun handler n'est invoqué après la libération de son scope, même si la
 *   publication était déjà en cours : le scope est vérifié juste avant
 *   chaque appel
 * - Index par scope ; `release_scope` purge aussi les sous-scopes libérés
 *   par le même parent
 */

use crate::events::{Event, EventKind};
use crate::health::HealthTracker;
use crate::scope::ScopeToken;
use crate::state::{new_state, Shared};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    scope_id: Uuid,
    kind: EventKind,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Registration {
    id: u64,
    scope: ScopeToken,
    active: Arc<AtomicBool>,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    by_kind: HashMap<EventKind, Vec<Registration>>,
    by_scope: HashMap<Uuid, Vec<(EventKind, u64)>>,
}

impl Registry {
    fn remove(&mut self, kind: EventKind, id: u64) -> bool {
        let Some(list) = self.by_kind.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        let registration = list.remove(pos);
        registration.active.store(false, Ordering::SeqCst);
        true
    }
}

/// Résultat d'une publication
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub delivered: usize,
    pub skipped: usize,
    pub faults: usize,
}

#[derive(Clone)]
pub struct Notifier {
    registry: Shared<Registry>,
    next_id: Arc<AtomicU64>,
    health: HealthTracker,
}

impl Notifier {
    pub fn new(health: HealthTracker) -> Self {
        Self {
            registry: new_state(Registry::default()),
            next_id: Arc::new(AtomicU64::new(1)),
            health,
        }
    }

    /// Abonne `handler` à `kind` pour la durée de vie de `scope`.
    /// Sur un scope déjà libéré, rien n'est enregistré.
    pub fn subscribe<F>(&self, scope: &ScopeToken, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle {
            id,
            scope_id: scope.id(),
            kind,
        };

        if scope.is_released() {
            debug!("[notifier] ignoring {kind} subscription on released scope {}", scope.label());
            return handle;
        }

        let mut registry = self.registry.lock();
        registry.by_kind.entry(kind).or_default().push(Registration {
            id,
            scope: scope.clone(),
            active: Arc::new(AtomicBool::new(true)),
            handler: Arc::new(handler),
        });
        registry.by_scope.entry(scope.id()).or_default().push((kind, id));
        handle
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut registry = self.registry.lock();
        let removed = registry.remove(handle.kind, handle.id);
        if let Some(entries) = registry.by_scope.get_mut(&handle.scope_id) {
            entries.retain(|(_, id)| *id != handle.id);
            if entries.is_empty() {
                registry.by_scope.remove(&handle.scope_id);
            }
        }
        removed
    }

    /// Libère le scope puis retire tous ses abonnements. Renvoie leur nombre.
    pub fn release_scope(&self, scope: &ScopeToken) -> usize {
        scope.release();

        let mut registry = self.registry.lock();
        let entries = registry.by_scope.remove(&scope.id()).unwrap_or_default();
        let direct = entries
            .into_iter()
            .filter(|(kind, id)| registry.remove(*kind, *id))
            .count();

        // sous-scopes libérés par ce parent, quel que soit le type d'événement
        let mut orphans = Vec::new();
        registry.by_kind.retain(|_, list| {
            list.retain(|r| {
                if r.scope.is_released() {
                    r.active.store(false, Ordering::SeqCst);
                    orphans.push(r.scope.id());
                    false
                } else {
                    true
                }
            });
            !list.is_empty()
        });
        let removed = direct + orphans.len();
        for scope_id in orphans {
            registry.by_scope.remove(&scope_id);
        }

        debug!("[notifier] released scope {} ({removed} subscriptions)", scope.label());
        removed
    }

    pub fn publish(&self, event: &Event) -> Dispatch {
        let kind = event.kind();

        // copie de la liste : les handlers peuvent (dés)abonner sans deadlock
        let targets: Vec<(ScopeToken, Arc<AtomicBool>, Handler)> = {
            let mut registry = self.registry.lock();
            let mut released = Vec::new();
            let targets = match registry.by_kind.get_mut(&kind) {
                Some(list) => {
                    list.retain(|r| {
                        if r.scope.is_released() {
                            released.push(r.scope.id());
                            false
                        } else {
                            true
                        }
                    });
                    list.iter()
                        .map(|r| (r.scope.clone(), r.active.clone(), r.handler.clone()))
                        .collect()
                }
                None => Vec::new(),
            };
            // scopes libérés via un parent : l'index n'a plus lieu d'être
            for scope_id in released {
                registry.by_scope.remove(&scope_id);
            }
            targets
        };

        let mut dispatch = Dispatch::default();
        for (scope, active, handler) in targets {
            if scope.is_released() || !active.load(Ordering::SeqCst) {
                dispatch.skipped += 1;
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => dispatch.delivered += 1,
                Ok(Err(e)) => {
                    dispatch.faults += 1;
                    self.health.record_handler_fault();
                    warn!("[notifier] {kind} handler in scope {} failed: {e:#}", scope.label());
                }
                Err(_) => {
                    dispatch.faults += 1;
                    self.health.record_handler_fault();
                    warn!("[notifier] {kind} handler in scope {} panicked", scope.label());
                }
            }
        }
        dispatch
    }

    pub fn subscription_count(&self) -> usize {
        self.registry
            .lock()
            .by_kind
            .values()
            .flatten()
            .filter(|r| !r.scope.is_released())
            .count()
    }

    pub fn scope_subscriptions(&self, scope: &ScopeToken) -> usize {
        if scope.is_released() {
            return 0;
        }
        self.registry
            .lock()
            .by_scope
            .get(&scope.id())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn notifier() -> Notifier {
        Notifier::new(HealthTracker::new())
    }

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| {
            let sink = sink.clone();
            Box::new(move |_: &Event| {
                sink.lock().push(name);
                Ok(())
            }) as Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let notifier = notifier();
        let scope = ScopeToken::new("tabs");
        let (log, make) = recorder();

        notifier.subscribe(&scope, EventKind::ArchivedMessagesUpdated, make("first"));
        notifier.subscribe(&scope, EventKind::ArchivedMessagesUpdated, make("second"));
        notifier.subscribe(&scope, EventKind::PendingRetriesTotalUpdated, make("other"));

        let dispatch = notifier.publish(&Event::ArchivedMessagesUpdated(4));
        assert_eq!(dispatch.delivered, 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let health = HealthTracker::new();
        let notifier = Notifier::new(health.clone());
        let scope = ScopeToken::new("tabs");
        let (log, make) = recorder();

        notifier.subscribe(&scope, EventKind::MessageFailuresUpdated, |_| {
            anyhow::bail!("bad payload")
        });
        notifier.subscribe(&scope, EventKind::MessageFailuresUpdated, |_| panic!("boom"));
        notifier.subscribe(&scope, EventKind::MessageFailuresUpdated, make("survivor"));

        let dispatch = notifier.publish(&Event::MessageFailuresUpdated(1));
        assert_eq!(dispatch.faults, 2);
        assert_eq!(dispatch.delivered, 1);
        assert_eq!(*log.lock(), vec!["survivor"]);
        assert_eq!(health.get_health().handler_faults, 2);
    }

    #[test]
    fn test_released_scope_receives_nothing() {
        let notifier = notifier();
        let scope = ScopeToken::new("heartbeats");
        let (log, make) = recorder();

        notifier.subscribe(&scope, EventKind::EndpointHeartbeatRestored, make("a"));
        notifier.subscribe(&scope, EventKind::ExceptionGroupCountUpdated, make("b"));
        assert_eq!(notifier.scope_subscriptions(&scope), 2);

        assert_eq!(notifier.release_scope(&scope), 2);
        notifier.publish(&Event::ExceptionGroupCountUpdated(3));
        assert!(log.lock().is_empty());
        assert_eq!(notifier.subscription_count(), 0);
    }

    #[test]
    fn test_release_during_dispatch_is_honoured() {
        let notifier = notifier();
        let first = ScopeToken::new("first");
        let second = ScopeToken::new("second");
        let (log, make) = recorder();

        let n = notifier.clone();
        let victim = second.clone();
        notifier.subscribe(&first, EventKind::ArchivedMessagesUpdated, move |_| {
            n.release_scope(&victim);
            Ok(())
        });
        notifier.subscribe(&second, EventKind::ArchivedMessagesUpdated, make("late"));

        let dispatch = notifier.publish(&Event::ArchivedMessagesUpdated(1));
        assert_eq!(dispatch.delivered, 1);
        assert_eq!(dispatch.skipped, 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_parent_release_silences_children() {
        let notifier = notifier();
        let root = ScopeToken::new("dashboard");
        let child = root.child("alerts");
        let (log, make) = recorder();

        notifier.subscribe(&child, EventKind::AlertRaised, make("alert"));
        notifier.release_scope(&root);

        notifier.publish(&Event::ArchivedMessagesUpdated(0));
        let dispatch = notifier.publish(&Event::AlertRaised(crate::models::Alert {
            id: None,
            description: "disk full".into(),
            severity: None,
            raised_at: None,
            related_to: vec![],
        }));
        assert_eq!(dispatch.delivered, 0);
        assert!(log.lock().is_empty());
        assert_eq!(notifier.subscription_count(), 0);
    }

    #[test]
    fn test_parent_release_purges_unpublished_child_kinds() {
        let notifier = notifier();
        let root = ScopeToken::new("session");
        let dashboard = root.child("dashboard");
        let tabs = dashboard.child("tabs");
        let (_log, make) = recorder();

        notifier.subscribe(&tabs, EventKind::PendingRetriesTotalUpdated, make("retries"));
        notifier.subscribe(&dashboard, EventKind::CustomCheckSucceeded, make("checks"));
        notifier.subscribe(&root, EventKind::ConnectivityChanged, make("bus"));

        assert_eq!(notifier.release_scope(&root), 3);
        let registry = notifier.registry.lock();
        assert!(registry.by_kind.is_empty());
        assert!(registry.by_scope.is_empty());
    }

    #[test]
    fn test_unsubscribe_and_released_subscribe() {
        let notifier = notifier();
        let scope = ScopeToken::new("custom-checks");
        let (log, make) = recorder();

        let handle = notifier.subscribe(&scope, EventKind::PendingRetriesTotalUpdated, make("x"));
        assert!(notifier.unsubscribe(&handle));
        assert!(!notifier.unsubscribe(&handle));

        scope.release();
        notifier.subscribe(&scope, EventKind::PendingRetriesTotalUpdated, make("y"));
        notifier.publish(&Event::PendingRetriesTotalUpdated(2));
        assert!(log.lock().is_empty());
        assert_eq!(notifier.subscription_count(), 0);
    }
}
