use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Configuration unique, construite au démarrage et passée par référence
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub defaults: DefaultEndpoints,
    pub polling: PollingConf,
    pub push: PushConf,
    pub reach: ReachConf,
    pub status_api: StatusApiConf,
    /// Fichier du store `scu`/`mu` ; défaut : <config_dir>/pulse/connections.json
    pub store_path: Option<PathBuf>,
    pub counters: CountersConf,
}

/// Défauts compilés (surchargeables par le fichier YAML)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DefaultEndpoints {
    pub service_control_url: Option<String>,
    #[serde(default)]
    pub monitoring_urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConf {
    pub exception_groups_secs: u64,
    pub archived_messages_secs: u64,
    pub pending_retries_secs: u64,
    pub failed_messages_secs: u64,
    pub monitoring_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PushConf {
    /// Port du broker ; l'hôte est celui de l'adresse ServiceControl
    pub port: u16,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub reconnect_initial_secs: u64,
    pub reconnect_max_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReachConf {
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StatusApiConf {
    pub bind: String,
}

/// Canal faisant autorité pour un compteur, fixé pour toute la session
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Remplacement absolu par le polling ; les deltas sont tracés à part
    Poll,
    /// Deltas ±1 des événements, le polling ne sert qu'à l'amorçage
    Events,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CountersConf {
    pub failed_messages: Authority,
}

impl Default for DefaultEndpoints {
    fn default() -> Self {
        Self {
            service_control_url: Some("http://localhost:33333/api/".into()),
            monitoring_urls: vec!["http://localhost:33633/".into()],
        }
    }
}

impl Default for PollingConf {
    fn default() -> Self {
        Self {
            exception_groups_secs: 5,
            archived_messages_secs: 10,
            pending_retries_secs: 10,
            failed_messages_secs: 10,
            monitoring_secs: 5,
        }
    }
}

impl PollingConf {
    pub fn period(secs: u64) -> Duration {
        Duration::from_secs(secs.max(1))
    }
}

impl Default for PushConf {
    fn default() -> Self {
        Self {
            port: 1883,
            topic_prefix: "servicecontrol/events".into(),
            keep_alive_secs: 15,
            reconnect_initial_secs: 2,
            reconnect_max_secs: 30,
        }
    }
}

impl Default for ReachConf {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl Default for StatusApiConf {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

impl Default for CountersConf {
    fn default() -> Self {
        Self {
            failed_messages: Authority::Poll,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultEndpoints::default(),
            polling: PollingConf::default(),
            push: PushConf::default(),
            reach: ReachConf::default(),
            status_api: StatusApiConf::default(),
            store_path: None,
            counters: CountersConf::default(),
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PULSE_KERNEL_CONFIG").unwrap_or_else(|_| "pulse.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            tracing::warn!("[kernel] invalid config {path}: {e}");
            KernelConfig::default()
        })
    } else {
        tracing::info!("[kernel] no {path}, using default config");
        KernelConfig::default()
    }
}
