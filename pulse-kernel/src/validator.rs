use crate::endpoints::{EndpointConfiguration, MonitoringEndpoint};
use crate::error::{PulseError, Result};
use crate::state::{read_state, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachOutcome {
    Reachable,
    Unreachable,
}

/// Statut affiché d'une adresse ; `Pending` tant que la sonde est en vol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachStatus {
    Pending,
    Reachable,
    Unreachable,
    /// Monitoring désactivé ou non défini : rien à sonder
    Disabled,
}

impl From<ReachOutcome> for ReachStatus {
    fn from(outcome: ReachOutcome) -> Self {
        match outcome {
            ReachOutcome::Reachable => ReachStatus::Reachable,
            ReachOutcome::Unreachable => ReachStatus::Unreachable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionsStatus {
    pub service_control: ReachStatus,
    pub monitoring: ReachStatus,
}

impl Default for ConnectionsStatus {
    fn default() -> Self {
        Self {
            service_control: ReachStatus::Pending,
            monitoring: ReachStatus::Pending,
        }
    }
}

/// Sonde d'accessibilité : un GET non authentifié, sans retry
#[derive(Clone)]
pub struct ConnectionValidator {
    client: Client,
}

impl ConnectionValidator {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn reach(&self, address: &str) -> ReachOutcome {
        match self.check(address).await {
            Ok(()) => ReachOutcome::Reachable,
            Err(e) => {
                debug!("[validator] {e}");
                ReachOutcome::Unreachable
            }
        }
    }

    async fn check(&self, address: &str) -> Result<()> {
        let response = self
            .client
            .get(address)
            .send()
            .await
            .map_err(|e| PulseError::ValidationFailure(format!("{address}: {e}")))?;
        if !response.status().is_success() {
            return Err(PulseError::ValidationFailure(format!(
                "{address}: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Sonde les deux adresses en parallèle ; chaque statut est mis à jour
    /// dès que sa sonde se termine, indépendamment de l'autre.
    pub async fn validate_all(
        &self,
        endpoints: &EndpointConfiguration,
        status: &Shared<ConnectionsStatus>,
    ) -> ConnectionsStatus {
        {
            let mut current = status.lock();
            current.service_control = ReachStatus::Pending;
            current.monitoring = match endpoints.monitoring {
                MonitoringEndpoint::Enabled(_) => ReachStatus::Pending,
                _ => ReachStatus::Disabled,
            };
        }

        let service_control = async {
            let outcome = self.reach(&endpoints.service_control_url).await;
            status.lock().service_control = outcome.into();
            info!("[validator] ServiceControl {}: {:?}", endpoints.service_control_url, outcome);
        };
        let monitoring = async {
            if let Some(url) = endpoints.monitoring.url() {
                let outcome = self.reach(url).await;
                status.lock().monitoring = outcome.into();
                info!("[validator] Monitoring {url}: {:?}", outcome);
            }
        };
        tokio::join!(service_control, monitoring);

        read_state(status)
    }
}
