use crate::bus::{PushTransport, RawEvent};
use crate::config::PushConf;
use crate::endpoints::EndpointConfiguration;
use crate::error::{PulseError, Result};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tracing::debug;

/// Push channel ServiceControl via MQTT : un topic par nom d'événement,
/// `{prefix}/{EventName}`, payload JSON.
pub struct MqttTransport {
    host: String,
    port: u16,
    client_id: String,
    keep_alive: Duration,
    topic_prefix: String,
    // le client doit vivre aussi longtemps que l'eventloop
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttTransport {
    /// Le broker tourne sur l'hôte de l'adresse ServiceControl
    pub fn from_endpoints(endpoints: &EndpointConfiguration, push: &PushConf) -> Result<Self> {
        let url = reqwest::Url::parse(&endpoints.service_control_url)
            .map_err(|e| PulseError::InvalidConfiguration(format!("{}: {e}", endpoints.service_control_url)))?;
        let host = url
            .host_str()
            .ok_or_else(|| PulseError::InvalidConfiguration(format!("no host in {url}")))?
            .to_string();

        Ok(Self {
            host,
            port: push.port,
            client_id: format!("pulse-kernel-{}", uuid::Uuid::new_v4().simple()),
            keep_alive: Duration::from_secs(push.keep_alive_secs.max(5)),
            topic_prefix: push.topic_prefix.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn broker(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

/// Nom d'événement porté par un topic `{prefix}/{name}`
fn event_name(prefix: &str, topic: &str) -> Option<String> {
    let name = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.to_string())
}

impl PushTransport for MqttTransport {
    async fn connect(&mut self) -> Result<()> {
        self.session = None;

        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(self.keep_alive);
        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        client
            .subscribe(format!("{}/#", self.topic_prefix), QoS::AtLeastOnce)
            .await
            .map_err(|e| PulseError::ConnectivityFailure(format!("subscribe: {e}")))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => return Err(PulseError::ConnectivityFailure(format!("{}:{}: {e}", self.host, self.port))),
            }
        }

        debug!("[mqtt] connected to {}:{}", self.host, self.port);
        self.session = Some((client, eventloop));
        Ok(())
    }

    async fn next_event(&mut self) -> Result<RawEvent> {
        let Some((_, eventloop)) = self.session.as_mut() else {
            return Err(PulseError::ConnectivityFailure("not connected".into()));
        };

        let outcome = loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) => match event_name(&self.topic_prefix, &p.topic) {
                    Some(name) => {
                        break Ok(RawEvent {
                            name,
                            payload: p.payload.to_vec(),
                        })
                    }
                    None => debug!("[mqtt] ignoring topic {}", p.topic),
                },
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };

        outcome.map_err(|e| {
            self.session = None;
            PulseError::ConnectivityFailure(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{EndpointSource, MonitoringEndpoint};

    fn endpoints(url: &str) -> EndpointConfiguration {
        EndpointConfiguration {
            service_control_url: url.into(),
            service_control_source: EndpointSource::Default,
            monitoring: MonitoringEndpoint::Undefined,
            monitoring_source: None,
        }
    }

    #[test]
    fn test_event_name_from_topic() {
        let prefix = "servicecontrol/events";
        assert_eq!(
            event_name(prefix, "servicecontrol/events/AlertRaised").as_deref(),
            Some("AlertRaised")
        );
        assert_eq!(event_name(prefix, "servicecontrol/events"), None);
        assert_eq!(event_name(prefix, "servicecontrol/events/"), None);
        assert_eq!(event_name(prefix, "servicecontrol/events/a/b"), None);
        assert_eq!(event_name(prefix, "other/AlertRaised"), None);
    }

    #[test]
    fn test_broker_host_comes_from_service_control_url() {
        let push = PushConf {
            port: 1884,
            topic_prefix: "sc/events/".into(),
            ..PushConf::default()
        };
        let transport = MqttTransport::from_endpoints(&endpoints("http://sc.internal:33333/api/"), &push).unwrap();
        assert_eq!(transport.broker(), ("sc.internal", 1884));
        assert_eq!(transport.topic_prefix, "sc/events");
    }

    #[test]
    fn test_unparseable_url_is_invalid_configuration() {
        assert!(matches!(
            MqttTransport::from_endpoints(&endpoints("not a url"), &PushConf::default()),
            Err(PulseError::InvalidConfiguration(_))
        ));
    }
}
