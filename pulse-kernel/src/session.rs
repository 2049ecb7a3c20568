/**
 * SESSION - Une configuration résolue, un cycle de vie
 *
 * RÔLE :
 * Regroupe tout ce qu'une vue reçoit au montage (configuration, adresses,
 * notifier, scheduler, client backend, santé) et porte le scope racine.
 *
 * FONCTIONNEMENT :
 * - start : monte le dashboard sous le scope racine puis démarre l'Event Bus
 *   (les reducers sont abonnés avant le premier événement)
 * - stop : libère le scope racine (abonnements + timers) puis arrête le bus
 * - Une mise à jour des adresses = stop + nouvelle résolution + start
 */

use crate::backend::ServiceControlApi;
use crate::bus::{Backoff, BusHandle, EventBus, PushTransport};
use crate::config::KernelConfig;
use crate::endpoints::EndpointConfiguration;
use crate::error::Result;
use crate::health::HealthTracker;
use crate::notifier::Notifier;
use crate::poller::PollScheduler;
use crate::scope::ScopeToken;
use crate::state::{new_state, Shared};
use crate::validator::ConnectionsStatus;
use crate::views::Dashboard;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SessionContext<A: ServiceControlApi> {
    pub config: Arc<KernelConfig>,
    pub endpoints: Arc<EndpointConfiguration>,
    pub notifier: Notifier,
    pub scheduler: PollScheduler,
    pub api: A,
    pub health: HealthTracker,
    pub connections: Shared<ConnectionsStatus>,
}

impl<A: ServiceControlApi> SessionContext<A> {
    pub fn new(config: Arc<KernelConfig>, endpoints: EndpointConfiguration, api: A, health: HealthTracker) -> Self {
        Self {
            config,
            endpoints: Arc::new(endpoints),
            notifier: Notifier::new(health.clone()),
            scheduler: PollScheduler::new(health.clone()),
            api,
            health,
            connections: new_state(ConnectionsStatus::default()),
        }
    }

    /// Fetch ponctuel rattaché à `scope` : s'il se termine après la
    /// libération du scope, son résultat est jeté.
    pub fn spawn_scoped<T, Fut, F>(&self, scope: &ScopeToken, name: &'static str, fetch: Fut, apply: F) -> JoinHandle<()>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let scope = scope.clone();
        let health = self.health.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            if scope.is_released() {
                debug!("[session] discarding late {name} for {}", scope.label());
                health.record_discarded();
                return;
            }
            match result {
                Ok(value) => apply(value),
                Err(e) => {
                    health.record_poll_failure();
                    warn!("[session] initial {name} fetch failed: {e}");
                }
            }
        })
    }

    /// Libère les abonnements et les timers de `scope`
    pub fn release(&self, scope: &ScopeToken) {
        let subscriptions = self.notifier.release_scope(scope);
        let tasks = self.scheduler.release_scope(scope);
        debug!(
            "[session] released {} ({subscriptions} subscriptions, {tasks} poll tasks)",
            scope.label()
        );
    }
}

pub struct Session<A: ServiceControlApi> {
    ctx: SessionContext<A>,
    root: ScopeToken,
    dashboard: Dashboard,
    bus: BusHandle,
}

impl<A: ServiceControlApi> Session<A> {
    pub fn start<T: PushTransport>(ctx: SessionContext<A>, transport: T) -> Self {
        let root = ScopeToken::new("session");
        let dashboard = Dashboard::mount(&ctx, &root);
        let bus = EventBus::new(
            transport,
            ctx.notifier.clone(),
            ctx.health.clone(),
            Backoff::from_conf(&ctx.config.push),
        )
        .spawn();

        info!(
            "[session] started on {} (monitoring: {:?})",
            ctx.endpoints.service_control_url, ctx.endpoints.monitoring
        );
        Self {
            ctx,
            root,
            dashboard,
            bus,
        }
    }

    pub fn context(&self) -> &SessionContext<A> {
        &self.ctx
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn root(&self) -> &ScopeToken {
        &self.root
    }

    pub async fn stop(self) {
        self.dashboard.unmount(&self.ctx);
        self.ctx.release(&self.root);
        self.bus.shutdown().await;
        info!("[session] stopped");
    }
}
