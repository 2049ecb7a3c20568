/**
 * PULSE KERNEL - Point d'entrée
 *
 * RÔLE : résout les adresses backend, démarre une session (vues + Event Bus),
 * sonde les adresses et sert l'API de statut.
 *
 * BOUCLE DE RECHARGEMENT : une mise à jour des adresses (POST /connections)
 * arrête la session courante et relance la résolution avec la nouvelle
 * requête. Ctrl-C arrête tout.
 */

use anyhow::{Context, Result};
use pulse_kernel::backend::HttpServiceControl;
use pulse_kernel::config::{load_config, KernelConfig};
use pulse_kernel::endpoints::{self, RequestParams};
use pulse_kernel::health::HealthTracker;
use pulse_kernel::http::{self, AppState};
use pulse_kernel::mqtt::MqttTransport;
use pulse_kernel::session::{Session, SessionContext};
use pulse_kernel::store::{FileStore, PersistedStore};
use pulse_kernel::validator::ConnectionValidator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Requête initiale : premier argument, sinon `PULSE_QUERY`
fn initial_params() -> RequestParams {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PULSE_QUERY").ok())
        .map(|query| RequestParams::parse(&query))
        .unwrap_or_default()
}

fn open_store(config: &KernelConfig) -> Result<FileStore> {
    let path = match &config.store_path {
        Some(path) => path.clone(),
        None => FileStore::default_path()?,
    };
    FileStore::open(&path).with_context(|| format!("opening store {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulse_kernel=info")))
        .init();

    let config = Arc::new(load_config().await);
    let store: Arc<dyn PersistedStore> = Arc::new(open_store(&config)?);
    let health = HealthTracker::new();
    let timeout = Duration::from_secs(config.reach.timeout_secs.max(1));
    let mut params = initial_params();

    loop {
        let endpoints = endpoints::resolve(&params, &*store, &config.defaults)
            .context("cannot start without a ServiceControl address")?;

        let api = HttpServiceControl::new(&endpoints.service_control_url, timeout)?;
        let transport = MqttTransport::from_endpoints(&endpoints, &config.push)?;
        let (broker_host, broker_port) = transport.broker();
        info!("[kernel] push channel on {broker_host}:{broker_port}");
        let ctx = SessionContext::new(config.clone(), endpoints, api, health.clone());
        let session = Session::start(ctx.clone(), transport);

        let validator = ConnectionValidator::new(timeout)?;
        {
            let validator = validator.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                validator.validate_all(&ctx.endpoints, &ctx.connections).await;
            });
        }

        // l'émetteur reste ici : l'arrêt du serveur ne ferme pas le canal
        let (reload_tx, mut reload_rx) = mpsc::channel(1);
        let http_shutdown = CancellationToken::new();
        let app_state = AppState {
            ctx: ctx.clone(),
            dashboard: session.dashboard().clone(),
            store: store.clone(),
            validator,
            reload: reload_tx.clone(),
        };
        let bind = config.status_api.bind.clone();
        let server = {
            let shutdown = http_shutdown.clone();
            tokio::spawn(async move { http::serve(&bind, app_state, shutdown).await })
        };

        let next = tokio::select! {
            reload = reload_rx.recv() => reload,
            _ = tokio::signal::ctrl_c() => None,
        };

        http_shutdown.cancel();
        match server.await {
            Ok(Err(e)) => warn!("[kernel] status API stopped: {e}"),
            Err(e) => warn!("[kernel] status API task failed: {e}"),
            Ok(Ok(())) => {}
        }
        session.stop().await;
        drop(reload_tx);

        match next {
            Some(reload) => {
                info!("[kernel] reloading with {}", reload.query());
                params = reload.params;
            }
            None => break,
        }
    }

    info!("[kernel] bye");
    Ok(())
}
