/**
 * EVENT BUS - Connexion logique unique au push channel du backend
 *
 * RÔLE :
 * Reçoit les événements nommés du backend et les publie tels quels (décodés
 * en variantes typées) sur le notifier local.
 *
 * MACHINE À ÉTATS :
 * Disconnected -> Connecting -> Connected -> Disconnected (échec)
 *   -> Connecting après backoff ... ; Shutdown uniquement sur arrêt explicite
 *
 * LIVRAISON :
 * Au plus une fois par réception physique ; doublons et désordre possibles
 * entre reconnexions, la dé-duplication appartient aux reducers.
 * Une déconnexion est publiée comme ConnectivityChanged, jamais comme erreur
 * vers les abonnés.
 */

use crate::config::PushConf;
use crate::error::{PulseError, Result};
use crate::events::Event;
use crate::health::HealthTracker;
use crate::notifier::Notifier;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusState {
    Disconnected,
    Connecting,
    Connected,
    Shutdown,
}

/// Événement brut tel que reçu : nom + payload JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Transport du push channel (MQTT en production, mock en test)
pub trait PushTransport: Send + 'static {
    /// Établit (ou rétablit) la connexion
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;
    /// Prochain événement ; une erreur signifie connexion perdue
    fn next_event(&mut self) -> impl Future<Output = Result<RawEvent>> + Send;
}

/// Backoff exponentiel borné entre deux tentatives de connexion
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    pub fn from_conf(conf: &PushConf) -> Self {
        Self::new(
            Duration::from_secs(conf.reconnect_initial_secs),
            Duration::from_secs(conf.reconnect_max_secs),
        )
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct EventBus<T: PushTransport> {
    transport: T,
    notifier: Notifier,
    health: HealthTracker,
    backoff: Backoff,
    shutdown: CancellationToken,
}

pub struct BusHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    health: HealthTracker,
}

impl BusHandle {
    pub fn state(&self) -> BusState {
        self.health.bus_state()
    }

    /// Arrêt explicite : seul chemin vers l'état terminal
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("[bus] task ended abnormally: {e}");
        }
    }
}

impl<T: PushTransport> EventBus<T> {
    pub fn new(transport: T, notifier: Notifier, health: HealthTracker, backoff: Backoff) -> Self {
        Self {
            transport,
            notifier,
            health,
            backoff,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn spawn(self) -> BusHandle {
        let shutdown = self.shutdown.clone();
        let health = self.health.clone();
        let task = tokio::spawn(self.run());
        BusHandle {
            shutdown,
            task,
            health,
        }
    }

    fn transition(&self, state: BusState) {
        if self.health.bus_state() != state {
            info!("[bus] {:?}", state);
        }
        self.health.set_bus_state(state);
        self.notifier.publish(&Event::ConnectivityChanged(state));
    }

    fn deliver(&self, raw: RawEvent) {
        match Event::from_wire(&raw.name, &raw.payload) {
            Ok(event) => {
                self.health.record_event();
                self.notifier.publish(&event);
            }
            Err(PulseError::UnknownEvent(name)) => debug!("[bus] ignoring unknown event {name}"),
            Err(e) => warn!("[bus] dropping malformed {} event: {e}", raw.name),
        }
    }

    async fn run(mut self) {
        let shutdown = self.shutdown.clone();

        'session: loop {
            self.transition(BusState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'session,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(()) => {
                    self.transition(BusState::Connected);
                    self.backoff.reset();
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break 'session,
                            result = self.transport.next_event() => result,
                        };
                        match next {
                            Ok(raw) => self.deliver(raw),
                            Err(e) => {
                                warn!("[bus] connection lost: {e}");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("[bus] connect failed: {e}"),
            }

            self.transition(BusState::Disconnected);
            self.health.increment_reconnects();
            let delay = self.backoff.next_delay();
            debug!("[bus] reconnecting in {:?}", delay);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'session,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(BusState::Shutdown);
    }
}
