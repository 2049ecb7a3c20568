/*!
Push channel simulé pour tests sans broker

`pair()` fournit les deux extrémités : le transport branché sur l'Event Bus
et le canal côté test qui injecte des événements ou coupe la connexion.
*/

use parking_lot::Mutex;
use pulse_kernel::bus::{PushTransport, RawEvent};
use pulse_kernel::error::{PulseError, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone)]
enum PushFrame {
    Event(RawEvent),
    Drop,
}

#[derive(Debug, Default)]
struct LinkState {
    connects: usize,
    refuse_next: usize,
    delivered: usize,
}

/// Extrémité test : injecte les trames reçues par le transport
#[derive(Clone)]
pub struct MockPushChannel {
    sender: mpsc::UnboundedSender<PushFrame>,
    link: Arc<Mutex<LinkState>>,
}

/// Extrémité bus : implémente `PushTransport`
pub struct MockPushTransport {
    receiver: mpsc::UnboundedReceiver<PushFrame>,
    link: Arc<Mutex<LinkState>>,
}

pub fn pair() -> (MockPushChannel, MockPushTransport) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let link = Arc::new(Mutex::new(LinkState::default()));
    (
        MockPushChannel {
            sender,
            link: link.clone(),
        },
        MockPushTransport { receiver, link },
    )
}

impl MockPushChannel {
    /// Simule la réception d'un événement nommé
    pub fn simulate_incoming(&self, name: &str, payload: Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&payload)?;
        self.simulate_raw(name, payload)
    }

    /// Payload brut, éventuellement invalide
    pub fn simulate_raw(&self, name: &str, payload: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        let raw = RawEvent {
            name: name.to_string(),
            payload: payload.into(),
        };
        self.sender
            .send(PushFrame::Event(raw))
            .map_err(|_| anyhow::anyhow!("push transport dropped"))?;
        debug!("[push-stub] queued {name}");
        Ok(())
    }

    /// Coupe la connexion après les trames déjà en file
    pub fn drop_connection(&self) -> anyhow::Result<()> {
        self.sender
            .send(PushFrame::Drop)
            .map_err(|_| anyhow::anyhow!("push transport dropped"))?;
        Ok(())
    }

    /// Les `n` prochaines tentatives de connexion échouent
    pub fn refuse_next_connects(&self, n: usize) {
        self.link.lock().refuse_next = n;
    }

    pub fn connect_count(&self) -> usize {
        self.link.lock().connects
    }

    pub fn delivered(&self) -> usize {
        self.link.lock().delivered
    }
}

impl PushTransport for MockPushTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut link = self.link.lock();
        link.connects += 1;
        if link.refuse_next > 0 {
            link.refuse_next -= 1;
            return Err(PulseError::ConnectivityFailure("connection refused (stub)".into()));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<RawEvent> {
        match self.receiver.recv().await {
            Some(PushFrame::Event(raw)) => {
                self.link.lock().delivered += 1;
                Ok(raw)
            }
            Some(PushFrame::Drop) => Err(PulseError::ConnectivityFailure("connection dropped (stub)".into())),
            // plus aucun émetteur : la connexion reste ouverte et muette
            None => std::future::pending().await,
        }
    }
}
