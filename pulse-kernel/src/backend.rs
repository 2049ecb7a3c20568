/**
 * BACKEND CLIENT - Interface requête/réponse vers ServiceControl
 *
 * RÔLE :
 * Le backend est opaque : les vues ne connaissent que ce trait. En
 * production c'est `HttpServiceControl` (reqwest), en test un mock du devkit.
 *
 * TOTAUX :
 * Les quatre totaux polled sont des scalaires ; un en-tête `Total-Count`
 * absent ou illisible vaut 0.
 */

use crate::error::{PulseError, Result};
use crate::models::{Alert, FailedMessage, FailedMessageStats, HeartbeatEntry, HeartbeatStats, MonitoredEndpoint};
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const TOTAL_COUNT_HEADER: &str = "Total-Count";

pub trait ServiceControlApi: Clone + Send + Sync + 'static {
    fn heartbeat_stats(&self) -> impl Future<Output = Result<HeartbeatStats>> + Send;
    fn heartbeats(&self) -> impl Future<Output = Result<Vec<HeartbeatEntry>>> + Send;
    fn alerts(&self) -> impl Future<Output = Result<Vec<Alert>>> + Send;
    fn failed_messages(&self) -> impl Future<Output = Result<Vec<FailedMessage>>> + Send;
    fn failed_message_stats(&self) -> impl Future<Output = Result<FailedMessageStats>> + Send;
    fn total_exception_groups(&self) -> impl Future<Output = Result<u64>> + Send;
    fn total_archived_messages(&self) -> impl Future<Output = Result<u64>> + Send;
    fn total_pending_retries(&self) -> impl Future<Output = Result<u64>> + Send;
    fn total_failed_messages(&self) -> impl Future<Output = Result<u64>> + Send;
    fn retry_all_failed_messages(&self) -> impl Future<Output = Result<()>> + Send;
    fn monitored_endpoints(&self, monitoring_url: &str) -> impl Future<Output = Result<Vec<MonitoredEndpoint>>> + Send;
}

/// Ajoute le `/` final sans lequel `Url::join` remplacerait le dernier segment
pub fn base_url(address: &str) -> Result<Url> {
    let mut address = address.trim().to_string();
    if !address.ends_with('/') {
        address.push('/');
    }
    Url::parse(&address).map_err(|e| PulseError::InvalidConfiguration(format!("{address}: {e}")))
}

fn total_count(headers: &HeaderMap) -> u64 {
    headers
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct HttpServiceControl {
    client: Client,
    base: Url,
}

impl HttpServiceControl {
    pub fn new(service_control_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, service_control_url)
    }

    pub fn with_client(client: Client, service_control_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: base_url(service_control_url)?,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| PulseError::InvalidConfiguration(format!("{path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!("[backend] GET {url}");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn head_total(&self, path: &str) -> Result<u64> {
        let url = self.url(path)?;
        debug!("[backend] HEAD {url}");
        let response = self.client.head(url).send().await?.error_for_status()?;
        Ok(total_count(response.headers()))
    }
}

impl ServiceControlApi for HttpServiceControl {
    async fn heartbeat_stats(&self) -> Result<HeartbeatStats> {
        self.get_json("heartbeats/stats").await
    }

    async fn heartbeats(&self) -> Result<Vec<HeartbeatEntry>> {
        self.get_json("heartbeats").await
    }

    async fn alerts(&self) -> Result<Vec<Alert>> {
        self.get_json("alerts").await
    }

    async fn failed_messages(&self) -> Result<Vec<FailedMessage>> {
        self.get_json("errors?status=unresolved").await
    }

    async fn failed_message_stats(&self) -> Result<FailedMessageStats> {
        self.get_json("errors/facets").await
    }

    async fn total_exception_groups(&self) -> Result<u64> {
        let groups: Option<Vec<serde_json::Value>> = self.get_json("recoverability/groups").await?;
        Ok(groups.map(|g| g.len() as u64).unwrap_or(0))
    }

    async fn total_archived_messages(&self) -> Result<u64> {
        self.head_total("errors?status=archived").await
    }

    async fn total_pending_retries(&self) -> Result<u64> {
        self.head_total("errors?status=retryissued").await
    }

    async fn total_failed_messages(&self) -> Result<u64> {
        self.head_total("errors?status=unresolved").await
    }

    async fn retry_all_failed_messages(&self) -> Result<()> {
        let url = self.url("errors/retry/all")?;
        debug!("[backend] POST {url}");
        self.client.post(url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn monitored_endpoints(&self, monitoring_url: &str) -> Result<Vec<MonitoredEndpoint>> {
        let url = base_url(monitoring_url)?
            .join("monitored-endpoints?history=1")
            .map_err(|e| PulseError::InvalidConfiguration(e.to_string()))?;
        debug!("[backend] GET {url}");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
