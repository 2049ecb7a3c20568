/**
 * POLLING SCHEDULER - Tâches de fetch périodiques rattachées à un scope
 *
 * RÔLE :
 * Chaque tâche a sa propre période et sa propre tâche tokio : une tâche lente
 * ou en échec ne retarde jamais les autres.
 *
 * FONCTIONNEMENT :
 * - Premier tick après une période complète, puis période fixe
 * - Annulation par handle (individuelle) ou par libération du scope (groupe)
 * - Une exécution en cours se termine, mais son résultat est jeté si
 *   l'annulation est intervenue entre-temps
 * - Échec d'une exécution : loggé, compté dans la santé, la valeur n'est
 *   simplement pas mise à jour ce cycle
 */

use crate::error::Result;
use crate::health::HealthTracker;
use crate::scope::ScopeToken;
use crate::state::{new_state, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PollHandle {
    id: u64,
    name: &'static str,
    scope_id: Uuid,
    cancel: CancellationToken,
}

impl PollHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct PollEntry {
    id: u64,
    name: &'static str,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct PollScheduler {
    tasks: Shared<HashMap<Uuid, Vec<PollEntry>>>,
    next_id: Arc<AtomicU64>,
    health: HealthTracker,
}

impl PollScheduler {
    pub fn new(health: HealthTracker) -> Self {
        Self {
            tasks: new_state(HashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            health,
        }
    }

    /// Planifie `task` toutes les `period` sous `scope` et livre chaque
    /// résultat à `deliver`. Retourne immédiatement.
    pub fn schedule<T, F, Fut, D>(
        &self,
        scope: &ScopeToken,
        name: &'static str,
        period: Duration,
        task: F,
        deliver: D,
    ) -> PollHandle
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = scope.child_cancel();
        let handle = PollHandle {
            id,
            name,
            scope_id: scope.id(),
            cancel: cancel.clone(),
        };

        if scope.is_released() {
            debug!("[poller] not scheduling {name} on released scope {}", scope.label());
            return handle;
        }

        self.tasks.lock().entry(scope.id()).or_default().push(PollEntry {
            id,
            name,
            cancel: cancel.clone(),
        });

        let tasks = self.tasks.clone();
        let health = self.health.clone();
        let scope_id = scope.id();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = task().await;

                if cancel.is_cancelled() {
                    debug!("[poller] discarding late result of {name}");
                    health.record_discarded();
                    break;
                }
                match result {
                    Ok(value) => deliver(value),
                    Err(e) => {
                        health.record_poll_failure();
                        if e.is_transient() {
                            warn!("[poller] {name} failed, keeping previous value: {e}");
                        } else {
                            error!("[poller] {name} returned an unusable answer, keeping previous value: {e}");
                        }
                    }
                }
            }

            remove_entry(&tasks, scope_id, id);
            debug!("[poller] {name} stopped");
        });

        handle
    }

    pub fn cancel(&self, handle: &PollHandle) {
        handle.cancel.cancel();
        remove_entry(&self.tasks, handle.scope_id, handle.id);
    }

    /// Libère le scope et annule toutes ses tâches. Renvoie leur nombre.
    pub fn release_scope(&self, scope: &ScopeToken) -> usize {
        scope.release();
        let entries = self.tasks.lock().remove(&scope.id()).unwrap_or_default();
        for entry in &entries {
            entry.cancel.cancel();
            debug!("[poller] cancelled {} ({})", entry.name, scope.label());
        }
        entries.len()
    }

    pub fn active_tasks(&self, scope: &ScopeToken) -> usize {
        self.tasks
            .lock()
            .get(&scope.id())
            .map(|entries| entries.iter().filter(|e| !e.cancel.is_cancelled()).count())
            .unwrap_or(0)
    }
}

fn remove_entry(tasks: &Shared<HashMap<Uuid, Vec<PollEntry>>>, scope_id: Uuid, id: u64) {
    let mut tasks = tasks.lock();
    if let Some(entries) = tasks.get_mut(&scope_id) {
        entries.retain(|e| e.id != id);
        if entries.is_empty() {
            tasks.remove(&scope_id);
        }
    }
}
