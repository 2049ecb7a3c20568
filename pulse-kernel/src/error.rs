use thiserror::Error;

/// Erreurs du noyau Pulse
///
/// Seules `ConfigurationMissing` et `InvalidConfiguration` remontent jusqu'au
/// niveau supérieur. Les autres sont contenues dans le composant qui les
/// produit et se traduisent en statut (bus, poll, validation).
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("ServiceControl URL is not defined")]
    ConfigurationMissing,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connectivity failure: {0}")]
    ConnectivityFailure(String),
    #[error("Address unreachable: {0}")]
    ValidationFailure(String),
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    /// Erreurs récupérables localement (reconnexion, prochain intervalle)
    pub fn is_transient(&self) -> bool {
        matches!(self, PulseError::ConnectivityFailure(_) | PulseError::Http(_))
    }
}
