/**
 * VIEWS - Vues montables du dashboard
 *
 * RÔLE :
 * Une vue = un scope enfant + un reducer abonné + ses fetchs initiaux et
 * ses polls. Démonter une vue libère tout ce qu'elle a créé.
 *
 * VUES :
 * - heartbeats       : stats initiales + liste + événements heartbeat
 * - alerts           : liste initiale + AlertRaised
 * - custom checks    : événements uniquement
 * - failed messages  : liste + tags (facettes) + retry all + MessageFailed
 * - failed msg tabs  : 4 totaux pollés (5s / 10s / 10s / 10s) publiés en *Updated
 * - monitoring       : métriques pollées, seulement si le monitoring est actif
 */

use crate::backend::ServiceControlApi;
use crate::config::PollingConf;
use crate::error::Result;
use crate::events::Event;
use crate::models::CounterSnapshot;
use crate::poller::PollHandle;
use crate::reducers::{
    bind, AlertsReducer, CustomChecksReducer, CustomChecksSnapshot, FailedMessagesReducer, FailedMessagesSnapshot,
    HeartbeatReducer, HeartbeatSnapshot, MonitoringReducer, MonitoringSnapshot, Reducer, TabCounters,
    TabCountersReducer,
};
use crate::models::Alert;
use crate::scope::ScopeToken;
use crate::session::SessionContext;
use crate::state::Shared;
use serde::Serialize;
use std::future::Future;
use time::OffsetDateTime;

/// Vue montée : son scope et l'état de son reducer
pub struct View<R: Reducer> {
    scope: ScopeToken,
    state: Shared<R>,
}

impl<R: Reducer> Clone for View<R> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            state: self.state.clone(),
        }
    }
}

impl<R: Reducer> View<R> {
    fn bind<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken, label: &str, reducer: R) -> Self {
        let scope = parent.child(label);
        let state = bind(&ctx.notifier, &scope, reducer);
        Self { scope, state }
    }

    pub fn scope(&self) -> &ScopeToken {
        &self.scope
    }

    pub fn snapshot(&self) -> R::Snapshot {
        self.state.lock().snapshot()
    }

    pub fn unmount<A: ServiceControlApi>(&self, ctx: &SessionContext<A>) {
        ctx.release(&self.scope);
    }
}

pub type HeartbeatsView = View<HeartbeatReducer>;
pub type AlertsView = View<AlertsReducer>;
pub type CustomChecksView = View<CustomChecksReducer>;
pub type FailedMessagesView = View<FailedMessagesReducer>;
pub type FailedMessageTabsView = View<TabCountersReducer>;
pub type MonitoringView = View<MonitoringReducer>;

pub fn mount_heartbeats<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> HeartbeatsView {
    let view = View::bind(ctx, parent, "heartbeats", HeartbeatReducer::default());

    let api = ctx.api.clone();
    let target = view.state.clone();
    ctx.spawn_scoped(&view.scope, "heartbeat stats", async move { api.heartbeat_stats().await }, move |stats| {
        target.lock().set_baseline(stats)
    });

    let api = ctx.api.clone();
    let target = view.state.clone();
    ctx.spawn_scoped(&view.scope, "heartbeat list", async move { api.heartbeats().await }, move |entries| {
        target.lock().seed(entries, OffsetDateTime::now_utc());
    });

    view
}

pub fn mount_alerts<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> AlertsView {
    let view = View::bind(ctx, parent, "alerts", AlertsReducer::default());

    let api = ctx.api.clone();
    let target = view.state.clone();
    ctx.spawn_scoped(&view.scope, "alerts", async move { api.alerts().await }, move |alerts: Vec<Alert>| {
        target.lock().replace(alerts)
    });

    view
}

pub fn mount_custom_checks<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> CustomChecksView {
    View::bind(ctx, parent, "custom-checks", CustomChecksReducer::default())
}

pub fn mount_failed_messages<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> FailedMessagesView {
    let view = View::bind(ctx, parent, "failed-messages", FailedMessagesReducer::default());

    let api = ctx.api.clone();
    let target = view.state.clone();
    ctx.spawn_scoped(&view.scope, "failed messages", async move { api.failed_messages().await }, move |messages| {
        target.lock().replace(messages)
    });

    let api = ctx.api.clone();
    let target = view.state.clone();
    ctx.spawn_scoped(
        &view.scope,
        "failed message stats",
        async move { api.failed_message_stats().await },
        move |stats| target.lock().set_stats(&stats),
    );

    view
}

/// Fetch immédiat puis poll d'un total, publiés sur le notifier sous forme
/// d'événement *Updated
fn poll_total<A, F, Fut>(
    ctx: &SessionContext<A>,
    scope: &ScopeToken,
    name: &'static str,
    secs: u64,
    fetch: F,
    event: fn(u64) -> Event,
) -> PollHandle
where
    A: ServiceControlApi,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64>> + Send + 'static,
{
    // valeur affichée dès le montage, sans attendre le premier tick
    let notifier = ctx.notifier.clone();
    ctx.spawn_scoped(scope, name, fetch(ctx.api.clone()), move |total| {
        notifier.publish(&event(total));
    });

    let api = ctx.api.clone();
    let notifier = ctx.notifier.clone();
    ctx.scheduler.schedule(
        scope,
        name,
        PollingConf::period(secs),
        move || fetch(api.clone()),
        move |total| {
            notifier.publish(&event(total));
        },
    )
}

pub fn mount_failed_message_tabs<A: ServiceControlApi>(
    ctx: &SessionContext<A>,
    parent: &ScopeToken,
) -> FailedMessageTabsView {
    let authority = ctx.config.counters.failed_messages;
    let view = View::bind(ctx, parent, "failed-message-tabs", TabCountersReducer::new(authority));
    let polling = &ctx.config.polling;

    poll_total(
        ctx,
        &view.scope,
        "exception groups",
        polling.exception_groups_secs,
        |api: A| async move { api.total_exception_groups().await },
        Event::ExceptionGroupCountUpdated,
    );
    poll_total(
        ctx,
        &view.scope,
        "archived messages",
        polling.archived_messages_secs,
        |api: A| async move { api.total_archived_messages().await },
        Event::ArchivedMessagesUpdated,
    );
    poll_total(
        ctx,
        &view.scope,
        "pending retries",
        polling.pending_retries_secs,
        |api: A| async move { api.total_pending_retries().await },
        Event::PendingRetriesTotalUpdated,
    );
    poll_total(
        ctx,
        &view.scope,
        "failed messages",
        polling.failed_messages_secs,
        |api: A| async move { api.total_failed_messages().await },
        Event::MessageFailuresUpdated,
    );

    view
}

/// `None` quand le monitoring est désactivé ou non défini
pub fn mount_monitoring<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> Option<MonitoringView> {
    let url = ctx.endpoints.monitoring.url()?.to_string();
    let view = View::bind(ctx, parent, "monitoring", MonitoringReducer::default());

    let api = ctx.api.clone();
    let notifier = ctx.notifier.clone();
    ctx.scheduler.schedule(
        &view.scope,
        "monitored endpoints",
        PollingConf::period(ctx.config.polling.monitoring_secs),
        move || {
            let api = api.clone();
            let url = url.clone();
            async move { api.monitored_endpoints(&url).await }
        },
        move |endpoints| {
            notifier.publish(&Event::MonitoredEndpointsUpdated(endpoints));
        },
    );

    Some(view)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub counters: CounterSnapshot,
    pub heartbeats: HeartbeatSnapshot,
    pub alerts: Vec<Alert>,
    pub custom_checks: CustomChecksSnapshot,
    pub failed_messages: FailedMessagesSnapshot,
    pub tabs: TabCounters,
    pub monitoring: Option<MonitoringSnapshot>,
}

/// Toutes les vues, chacune sous son propre scope enfant
#[derive(Clone)]
pub struct Dashboard {
    scope: ScopeToken,
    pub heartbeats: HeartbeatsView,
    pub alerts: AlertsView,
    pub custom_checks: CustomChecksView,
    pub failed_messages: FailedMessagesView,
    pub tabs: FailedMessageTabsView,
    pub monitoring: Option<MonitoringView>,
}

impl Dashboard {
    pub fn mount<A: ServiceControlApi>(ctx: &SessionContext<A>, parent: &ScopeToken) -> Self {
        let scope = parent.child("dashboard");
        Self {
            heartbeats: mount_heartbeats(ctx, &scope),
            alerts: mount_alerts(ctx, &scope),
            custom_checks: mount_custom_checks(ctx, &scope),
            failed_messages: mount_failed_messages(ctx, &scope),
            tabs: mount_failed_message_tabs(ctx, &scope),
            monitoring: mount_monitoring(ctx, &scope),
            scope,
        }
    }

    pub fn scope(&self) -> &ScopeToken {
        &self.scope
    }

    pub fn unmount<A: ServiceControlApi>(&self, ctx: &SessionContext<A>) {
        self.heartbeats.unmount(ctx);
        self.alerts.unmount(ctx);
        self.custom_checks.unmount(ctx);
        self.failed_messages.unmount(ctx);
        self.tabs.unmount(ctx);
        if let Some(monitoring) = &self.monitoring {
            monitoring.unmount(ctx);
        }
        ctx.release(&self.scope);
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let heartbeats = self.heartbeats.snapshot();
        let custom_checks = self.custom_checks.snapshot();
        let tabs = self.tabs.snapshot();

        DashboardSnapshot {
            counters: CounterSnapshot {
                active_endpoints: heartbeats.stats.active_endpoints,
                failing_endpoints: heartbeats.stats.failing_endpoints,
                failed_messages: tabs.failed_messages,
                exception_groups: tabs.exception_groups,
                archived_messages: tabs.archived_messages,
                pending_retries: tabs.pending_retries,
                failed_checks: custom_checks.failed_checks,
            },
            heartbeats,
            alerts: self.alerts.snapshot(),
            custom_checks,
            failed_messages: self.failed_messages.snapshot(),
            tabs,
            monitoring: self.monitoring.as_ref().map(View::snapshot),
        }
    }
}

/// Action "retry all" de la vue des messages en échec
pub async fn retry_all_failed_messages<A: ServiceControlApi>(ctx: &SessionContext<A>) -> Result<()> {
    ctx.api.retry_all_failed_messages().await?;
    tracing::info!("[views] retry of all failed messages requested");
    Ok(())
}
