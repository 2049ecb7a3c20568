/**
 * API DE STATUT - Serveur HTTP local du noyau Pulse
 *
 * RÔLE :
 * Expose les instantanés des reducers, la santé du noyau et les opérations
 * sur les adresses backend (lecture, mise à jour, test).
 *
 * ROUTES :
 * - GET  /health                    : liveness
 * - GET  /system/health             : bus, reconnexions, fautes, polls
 * - GET  /dashboard                 : instantané complet des vues
 * - GET  /heartbeats                : ensemble de heartbeats
 * - GET  /connections               : adresses résolues + statut des sondes
 * - POST /connections               : mise à jour -> 202 + rechargement
 * - POST /connections/test          : sonde les deux adresses
 * - POST /failed-messages/retry-all : relance côté backend
 *
 * Pas d'authentification : l'API écoute en local.
 */

use crate::backend::ServiceControlApi;
use crate::endpoints::{self, EndpointConfiguration, Reload};
use crate::error::{PulseError, Result};
use crate::health::KernelHealth;
use crate::reducers::HeartbeatSnapshot;
use crate::session::SessionContext;
use crate::state::read_state;
use crate::store::PersistedStore;
use crate::validator::{ConnectionValidator, ConnectionsStatus};
use crate::views::{retry_all_failed_messages, Dashboard, DashboardSnapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState<A: ServiceControlApi> {
    pub ctx: SessionContext<A>,
    pub dashboard: Dashboard,
    pub store: Arc<dyn PersistedStore>,
    pub validator: ConnectionValidator,
    pub reload: mpsc::Sender<Reload>,
}

#[derive(Debug, Serialize)]
struct ConnectionsView {
    endpoints: EndpointConfiguration,
    status: ConnectionsStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConnections {
    pub service_control_url: String,
    #[serde(default)]
    pub monitoring_url: Option<String>,
}

pub fn build_router<A: ServiceControlApi>(app_state: AppState<A>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health::<A>))
        .route("/dashboard", get(get_dashboard::<A>))
        .route("/heartbeats", get(get_heartbeats::<A>))
        .route("/connections", get(get_connections::<A>).post(update_connections::<A>))
        .route("/connections/test", post(test_connections::<A>))
        .route("/failed-messages/retry-all", post(retry_all::<A>))
        .with_state(app_state)
}

/// Sert l'API jusqu'à l'annulation de `shutdown`
pub async fn serve<A: ServiceControlApi>(bind: &str, app_state: AppState<A>, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("[http] status API on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// GET /system/health
async fn get_system_health<A: ServiceControlApi>(State(app): State<AppState<A>>) -> Json<KernelHealth> {
    Json(app.ctx.health.get_health())
}

// GET /dashboard
async fn get_dashboard<A: ServiceControlApi>(State(app): State<AppState<A>>) -> Json<DashboardSnapshot> {
    Json(app.dashboard.snapshot())
}

// GET /heartbeats
async fn get_heartbeats<A: ServiceControlApi>(State(app): State<AppState<A>>) -> Json<HeartbeatSnapshot> {
    Json(app.dashboard.heartbeats.snapshot())
}

// GET /connections
async fn get_connections<A: ServiceControlApi>(State(app): State<AppState<A>>) -> Json<ConnectionsView> {
    Json(ConnectionsView {
        endpoints: (*app.ctx.endpoints).clone(),
        status: read_state(&app.ctx.connections),
    })
}

// POST /connections : rien n'est modifié si l'adresse ServiceControl est vide
async fn update_connections<A: ServiceControlApi>(
    State(app): State<AppState<A>>,
    Json(body): Json<UpdateConnections>,
) -> (StatusCode, Json<serde_json::Value>) {
    let reload = match endpoints::update(&*app.store, &body.service_control_url, body.monitoring_url.as_deref()) {
        Ok(reload) => reload,
        Err(e @ PulseError::InvalidConfiguration(_)) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "ok": false, "msg": e.to_string() })));
        }
        Err(e) => {
            warn!("[http] update connections failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "ok": false, "msg": e.to_string() })),
            );
        }
    };

    let query = reload.query();
    if app.reload.send(reload).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ok": false, "msg": "reload loop is not running" })),
        );
    }
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true, "query": query })))
}

// POST /connections/test
async fn test_connections<A: ServiceControlApi>(State(app): State<AppState<A>>) -> Json<ConnectionsStatus> {
    Json(app.validator.validate_all(&app.ctx.endpoints, &app.ctx.connections).await)
}

// POST /failed-messages/retry-all
async fn retry_all<A: ServiceControlApi>(State(app): State<AppState<A>>) -> (StatusCode, Json<serde_json::Value>) {
    match retry_all_failed_messages(&app.ctx).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true }))),
        Err(e) => {
            warn!("[http] retry all failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "ok": false, "msg": e.to_string() })))
        }
    }
}
