/**
 * ENDPOINTS - Résolution des adresses ServiceControl / Monitoring
 *
 * RÔLE :
 * Détermine les deux adresses de base (API ServiceControl, Monitoring) une
 * seule fois au démarrage, puis les passe par référence à tous les composants.
 *
 * PRÉCÉDENCE (par adresse, indépendamment) :
 * 1. Paramètre de la requête courante (`scu` / `mu`) -> persisté puis utilisé
 * 2. Valeur persistée sous `scu` / `mu`
 * 3. Défaut compilé (`service_control_url`, premier de `monitoring_urls`)
 *
 * Monitoring désactivé = sentinelle `!`, distincte de "non défini".
 * Une mise à jour ne patche jamais la config en place : elle vide le store et
 * renvoie une nouvelle cible de requête, la session complète est rechargée.
 */

use crate::backend::base_url;
use crate::config::DefaultEndpoints;
use crate::error::{PulseError, Result};
use crate::store::PersistedStore;
use serde::Serialize;
use tracing::{debug, warn};

pub const SERVICE_CONTROL_KEY: &str = "scu";
pub const MONITORING_KEY: &str = "mu";
pub const MONITORING_DISABLED: &str = "!";

/// Paramètres de la requête courante (`?scu=...&mu=...`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub service_control_url: Option<String>,
    pub monitoring_url: Option<String>,
}

impl RequestParams {
    /// Découpage volontairement simple : pas de décodage, la première
    /// occurrence d'une clé gagne, une valeur vide compte comme absente.
    pub fn parse(query: &str) -> Self {
        let query = query.trim();
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut params = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if value.is_empty() {
                continue;
            }
            match name {
                SERVICE_CONTROL_KEY if params.service_control_url.is_none() => {
                    params.service_control_url = Some(value.to_string());
                }
                MONITORING_KEY if params.monitoring_url.is_none() => {
                    params.monitoring_url = Some(value.to_string());
                }
                _ => {}
            }
        }
        params
    }

    pub fn to_query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(scu) = &self.service_control_url {
            parts.push(format!("{SERVICE_CONTROL_KEY}={scu}"));
        }
        if let Some(mu) = &self.monitoring_url {
            parts.push(format!("{MONITORING_KEY}={mu}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSource {
    Request,
    Persisted,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "url", rename_all = "snake_case")]
pub enum MonitoringEndpoint {
    Enabled(String),
    /// Désactivé explicitement (`!`)
    Disabled,
    /// Aucune source n'a fourni de valeur
    Undefined,
}

impl MonitoringEndpoint {
    fn from_value(value: String) -> Self {
        if value == MONITORING_DISABLED {
            MonitoringEndpoint::Disabled
        } else {
            MonitoringEndpoint::Enabled(value)
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            MonitoringEndpoint::Enabled(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, MonitoringEndpoint::Enabled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointConfiguration {
    pub service_control_url: String,
    pub service_control_source: EndpointSource,
    pub monitoring: MonitoringEndpoint,
    pub monitoring_source: Option<EndpointSource>,
}

/// Nouvelle cible de requête à recharger après une mise à jour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reload {
    pub params: RequestParams,
}

impl Reload {
    pub fn query(&self) -> String {
        self.params.to_query()
    }
}

fn pick(
    label: &str,
    key: &str,
    requested: Option<&String>,
    store: &dyn PersistedStore,
    default: Option<&String>,
) -> Option<(String, EndpointSource)> {
    if let Some(value) = requested {
        if let Err(e) = store.set(key, value) {
            warn!("[endpoints] failed to persist {label} url: {e}");
        }
        debug!("[endpoints] {label} url found in request and stored: {value}");
        return Some((value.clone(), EndpointSource::Request));
    }
    if let Some(value) = store.get(key).filter(|v| !v.is_empty()) {
        debug!("[endpoints] {label} url, not in request, found in store: {value}");
        return Some((value, EndpointSource::Persisted));
    }
    if let Some(value) = default.filter(|v| !v.is_empty()) {
        debug!("[endpoints] setting {label} url to its default value: {value}");
        return Some((value.clone(), EndpointSource::Default));
    }
    None
}

pub fn resolve(
    params: &RequestParams,
    store: &dyn PersistedStore,
    defaults: &DefaultEndpoints,
) -> Result<EndpointConfiguration> {
    let service_control = pick(
        "ServiceControl",
        SERVICE_CONTROL_KEY,
        params.service_control_url.as_ref(),
        store,
        defaults.service_control_url.as_ref(),
    );
    let monitoring = pick(
        "Monitoring",
        MONITORING_KEY,
        params.monitoring_url.as_ref(),
        store,
        defaults.monitoring_urls.first(),
    );

    let Some((service_control_url, service_control_source)) = service_control else {
        warn!("[endpoints] ServiceControl url is not defined");
        return Err(PulseError::ConfigurationMissing);
    };

    let (monitoring, monitoring_source) = match monitoring {
        Some((value, source)) => (MonitoringEndpoint::from_value(value), Some(source)),
        None => {
            warn!("[endpoints] Monitoring url is not defined");
            (MonitoringEndpoint::Undefined, None)
        }
    };

    Ok(EndpointConfiguration {
        service_control_url,
        service_control_source,
        monitoring,
        monitoring_source,
    })
}

/// Adresse absolue http(s), sinon le rechargement échouerait au démarrage
fn check_address(label: &str, address: &str) -> Result<()> {
    let url = base_url(address)?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        _ => Err(PulseError::InvalidConfiguration(format!(
            "{label} URL must be an absolute http(s) address: {address}"
        ))),
    }
}

/// Valide les nouvelles adresses, vide le store et renvoie la cible de reload.
/// Rien n'est modifié si l'adresse ServiceControl est vide.
pub fn update(
    store: &dyn PersistedStore,
    new_service_control_url: &str,
    new_monitoring_url: Option<&str>,
) -> Result<Reload> {
    let service_control_url = new_service_control_url.trim();
    if service_control_url.is_empty() {
        return Err(PulseError::InvalidConfiguration(
            "ServiceControl URL is mandatory".into(),
        ));
    }

    check_address("ServiceControl", service_control_url)?;

    let monitoring_url = match new_monitoring_url.map(str::trim) {
        Some(url) if !url.is_empty() && url != MONITORING_DISABLED => {
            check_address("Monitoring", url)?;
            url.to_string()
        }
        _ => MONITORING_DISABLED.to_string(),
    };

    // les valeurs seront re-persistées au rechargement
    store.remove(SERVICE_CONTROL_KEY)?;
    store.remove(MONITORING_KEY)?;

    let reload = Reload {
        params: RequestParams {
            service_control_url: Some(service_control_url.to_string()),
            monitoring_url: Some(monitoring_url),
        },
    };
    debug!("[endpoints] update connections - new query string: {}", reload.query());
    Ok(reload)
}
