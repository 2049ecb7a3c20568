/**
 * EVENTS - Événements typés du push channel et du notifier local
 *
 * RÔLE :
 * Chaque nom d'événement est une variante avec un payload déclaré. Les
 * reducers font un `match` exhaustif au lieu de tester la présence de champs.
 *
 * SOURCES :
 * - Push channel (backend) : heartbeats, alertes, custom checks, MessageFailed
 * - Polling local : compteurs *Updated et métriques de monitoring
 * - Event Bus : ConnectivityChanged (statut, jamais un événement de données)
 */

use crate::bus::BusState;
use crate::error::{PulseError, Result};
use crate::models::{Alert, HeartbeatKey, MonitoredEndpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EndpointFailedToHeartbeat,
    EndpointHeartbeatRestored,
    HeartbeatingEndpointDetected,
    AlertRaised,
    CustomCheckFailed,
    CustomCheckSucceeded,
    MessageFailed,
    ExceptionGroupCountUpdated,
    ArchivedMessagesUpdated,
    PendingRetriesTotalUpdated,
    MessageFailuresUpdated,
    MonitoredEndpointsUpdated,
    ConnectivityChanged,
}

impl EventKind {
    /// Événements acceptés depuis le push channel
    pub const PUSHED: [EventKind; 7] = [
        EventKind::EndpointFailedToHeartbeat,
        EventKind::EndpointHeartbeatRestored,
        EventKind::HeartbeatingEndpointDetected,
        EventKind::AlertRaised,
        EventKind::CustomCheckFailed,
        EventKind::CustomCheckSucceeded,
        EventKind::MessageFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::EndpointFailedToHeartbeat => "EndpointFailedToHeartbeat",
            EventKind::EndpointHeartbeatRestored => "EndpointHeartbeatRestored",
            EventKind::HeartbeatingEndpointDetected => "HeartbeatingEndpointDetected",
            EventKind::AlertRaised => "AlertRaised",
            EventKind::CustomCheckFailed => "CustomCheckFailed",
            EventKind::CustomCheckSucceeded => "CustomCheckSucceeded",
            EventKind::MessageFailed => "MessageFailed",
            EventKind::ExceptionGroupCountUpdated => "ExceptionGroupCountUpdated",
            EventKind::ArchivedMessagesUpdated => "ArchivedMessagesUpdated",
            EventKind::PendingRetriesTotalUpdated => "PendingRetriesTotalUpdated",
            EventKind::MessageFailuresUpdated => "MessageFailuresUpdated",
            EventKind::MonitoredEndpointsUpdated => "MonitoredEndpointsUpdated",
            EventKind::ConnectivityChanged => "ConnectivityChanged",
        }
    }

    /// Résout un nom reçu du push channel. Les événements synthétisés
    /// localement ne peuvent pas être injectés depuis le réseau.
    pub fn from_pushed_name(name: &str) -> Option<Self> {
        Self::PUSHED.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatLost {
    pub endpoint: String,
    pub machine: String,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "lastReceivedAt")]
    pub last_received_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRestored {
    pub endpoint: String,
    pub machine: String,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "restoredAt")]
    pub restored_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDetected {
    pub endpoint: String,
    pub machine: String,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "detectedAt")]
    pub detected_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCheckFailed {
    #[serde(alias = "customCheckId")]
    pub custom_check_id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "failureReason")]
    pub failure_reason: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "failedAt")]
    pub failed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCheckSucceeded {
    #[serde(alias = "customCheckId")]
    pub custom_check_id: String,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "succeededAt")]
    pub succeeded_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFailed {
    #[serde(alias = "failedMessageId")]
    pub failed_message_id: String,
    #[serde(default, alias = "messageType")]
    pub message_type: Option<String>,
    #[serde(default, alias = "receivingEndpoint")]
    pub receiving_endpoint: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "timeOfFailure")]
    pub time_of_failure: Option<OffsetDateTime>,
    #[serde(default, alias = "exceptionMessage")]
    pub exception_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EndpointFailedToHeartbeat(HeartbeatLost),
    EndpointHeartbeatRestored(HeartbeatRestored),
    HeartbeatingEndpointDetected(EndpointDetected),
    AlertRaised(Alert),
    CustomCheckFailed(CustomCheckFailed),
    CustomCheckSucceeded(CustomCheckSucceeded),
    MessageFailed(MessageFailed),
    ExceptionGroupCountUpdated(u64),
    ArchivedMessagesUpdated(u64),
    PendingRetriesTotalUpdated(u64),
    MessageFailuresUpdated(u64),
    MonitoredEndpointsUpdated(Vec<MonitoredEndpoint>),
    ConnectivityChanged(BusState),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::EndpointFailedToHeartbeat(_) => EventKind::EndpointFailedToHeartbeat,
            Event::EndpointHeartbeatRestored(_) => EventKind::EndpointHeartbeatRestored,
            Event::HeartbeatingEndpointDetected(_) => EventKind::HeartbeatingEndpointDetected,
            Event::AlertRaised(_) => EventKind::AlertRaised,
            Event::CustomCheckFailed(_) => EventKind::CustomCheckFailed,
            Event::CustomCheckSucceeded(_) => EventKind::CustomCheckSucceeded,
            Event::MessageFailed(_) => EventKind::MessageFailed,
            Event::ExceptionGroupCountUpdated(_) => EventKind::ExceptionGroupCountUpdated,
            Event::ArchivedMessagesUpdated(_) => EventKind::ArchivedMessagesUpdated,
            Event::PendingRetriesTotalUpdated(_) => EventKind::PendingRetriesTotalUpdated,
            Event::MessageFailuresUpdated(_) => EventKind::MessageFailuresUpdated,
            Event::MonitoredEndpointsUpdated(_) => EventKind::MonitoredEndpointsUpdated,
            Event::ConnectivityChanged(_) => EventKind::ConnectivityChanged,
        }
    }

    /// Décode un événement du push channel : nom + payload JSON
    pub fn from_wire(name: &str, payload: &[u8]) -> Result<Self> {
        let kind = EventKind::from_pushed_name(name)
            .ok_or_else(|| PulseError::UnknownEvent(name.to_string()))?;

        let event = match kind {
            EventKind::EndpointFailedToHeartbeat => {
                Event::EndpointFailedToHeartbeat(serde_json::from_slice(payload)?)
            }
            EventKind::EndpointHeartbeatRestored => {
                Event::EndpointHeartbeatRestored(serde_json::from_slice(payload)?)
            }
            EventKind::HeartbeatingEndpointDetected => {
                Event::HeartbeatingEndpointDetected(serde_json::from_slice(payload)?)
            }
            EventKind::AlertRaised => Event::AlertRaised(serde_json::from_slice(payload)?),
            EventKind::CustomCheckFailed => Event::CustomCheckFailed(serde_json::from_slice(payload)?),
            EventKind::CustomCheckSucceeded => {
                Event::CustomCheckSucceeded(serde_json::from_slice(payload)?)
            }
            EventKind::MessageFailed => Event::MessageFailed(serde_json::from_slice(payload)?),
            other => return Err(PulseError::UnknownEvent(other.name().to_string())),
        };
        Ok(event)
    }

    /// Mise à jour de heartbeat portée par l'événement, si c'en est une :
    /// (clé, actif, horodatage embarqué)
    pub fn heartbeat_update(&self) -> Option<(HeartbeatKey, bool, Option<OffsetDateTime>)> {
        match self {
            Event::EndpointFailedToHeartbeat(e) => Some((
                HeartbeatKey::new(&e.endpoint, &e.machine),
                false,
                e.last_received_at,
            )),
            Event::EndpointHeartbeatRestored(e) => Some((
                HeartbeatKey::new(&e.endpoint, &e.machine),
                true,
                e.restored_at,
            )),
            Event::HeartbeatingEndpointDetected(e) => Some((
                HeartbeatKey::new(&e.endpoint, &e.machine),
                true,
                e.detected_at,
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_heartbeat_lost() {
        let payload = br#"{"endpoint":"Sales","machine":"srv-01","last_received_at":"2024-03-01T10:00:00Z"}"#;
        let event = Event::from_wire("EndpointFailedToHeartbeat", payload).unwrap();
        assert_eq!(event.kind(), EventKind::EndpointFailedToHeartbeat);

        let (key, active, at) = event.heartbeat_update().unwrap();
        assert_eq!(key, HeartbeatKey::new("Sales", "srv-01"));
        assert!(!active);
        assert!(at.is_some());
    }

    #[test]
    fn test_decode_accepts_camel_case_timestamps() {
        let payload = br#"{"endpoint":"Sales","machine":"srv-01","restoredAt":"2024-03-01T10:05:00Z"}"#;
        match Event::from_wire("EndpointHeartbeatRestored", payload).unwrap() {
            Event::EndpointHeartbeatRestored(e) => assert!(e.restored_at.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_missing_key_field_is_rejected() {
        let payload = br#"{"machine":"srv-01"}"#;
        assert!(matches!(
            Event::from_wire("HeartbeatingEndpointDetected", payload),
            Err(PulseError::Json(_))
        ));
    }

    #[test]
    fn test_local_events_cannot_come_from_the_wire() {
        assert!(matches!(
            Event::from_wire("MessageFailuresUpdated", b"12"),
            Err(PulseError::UnknownEvent(_))
        ));
        assert!(matches!(
            Event::from_wire("SomethingElse", b"{}"),
            Err(PulseError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_pushed_names_round_trip() {
        for kind in EventKind::PUSHED {
            assert_eq!(EventKind::from_pushed_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_pushed_name("ArchivedMessagesUpdated"), None);
    }
}
