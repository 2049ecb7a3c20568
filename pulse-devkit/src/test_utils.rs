/*!
Test Harness pour le noyau Pulse

Assemble une session complète sans réseau :
- backend ServiceControl simulé (`MockServiceControl`)
- push channel simulé (`MockPushChannel`)
- configuration et adresses résolues de test
*/

use crate::mock_backend::MockServiceControl;
use crate::push_stub::{self, MockPushChannel, MockPushTransport};
use anyhow::Result;
use pulse_kernel::config::KernelConfig;
use pulse_kernel::endpoints::{EndpointConfiguration, EndpointSource, MonitoringEndpoint};
use pulse_kernel::health::HealthTracker;
use pulse_kernel::session::{Session, SessionContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const TEST_SERVICE_CONTROL_URL: &str = "http://servicecontrol.test:33333/api/";
pub const TEST_MONITORING_URL: &str = "http://monitoring.test:33633/";

/// Logs visibles avec `cargo test -- --nocapture`, une seule initialisation
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("pulse_kernel=debug,pulse_devkit=debug"))
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub backend: MockServiceControl,
    pub push: MockPushChannel,
    pub config: KernelConfig,
    pub endpoints: EndpointConfiguration,
    pub health: HealthTracker,
    transport: Option<MockPushTransport>,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        let (push, transport) = push_stub::pair();
        let mut config = KernelConfig::default();
        config.push.reconnect_initial_secs = 1;
        config.push.reconnect_max_secs = 4;

        Self {
            backend: MockServiceControl::new(),
            push,
            config,
            endpoints: EndpointConfiguration {
                service_control_url: TEST_SERVICE_CONTROL_URL.into(),
                service_control_source: EndpointSource::Request,
                monitoring: MonitoringEndpoint::Enabled(TEST_MONITORING_URL.into()),
                monitoring_source: Some(EndpointSource::Request),
            },
            health: HealthTracker::new(),
            transport: Some(transport),
        }
    }

    pub fn with_config(mut self, edit: impl FnOnce(&mut KernelConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn with_monitoring(mut self, monitoring: MonitoringEndpoint) -> Self {
        self.endpoints.monitoring = monitoring;
        self
    }

    /// Contexte neuf, pour monter des vues sans Event Bus
    pub fn context(&self) -> SessionContext<MockServiceControl> {
        SessionContext::new(
            Arc::new(self.config.clone()),
            self.endpoints.clone(),
            self.backend.clone(),
            self.health.clone(),
        )
    }

    /// Démarre la session sur le push channel simulé (une seule fois)
    pub fn start_session(&mut self) -> Result<Session<MockServiceControl>> {
        let Some(transport) = self.transport.take() else {
            anyhow::bail!("session already started on this harness");
        };
        let session = Session::start(self.context(), transport);
        info!("[devkit] session started");
        Ok(session)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Attend que `condition` soit vraie, en temps tokio (compatible `start_paused`)
pub async fn wait_until<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
