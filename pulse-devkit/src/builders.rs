/*!
Payloads d'événements au format du push channel

Les noms de champs suivent le format camelCase émis par le backend.
*/

use serde_json::{json, Value};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub struct PulseEventBuilder;

impl PulseEventBuilder {
    /// EndpointFailedToHeartbeat
    pub fn heartbeat_lost(endpoint: &str, machine: &str) -> Value {
        json!({
            "endpoint": endpoint,
            "machine": machine,
            "lastReceivedAt": now(),
        })
    }

    /// EndpointHeartbeatRestored
    pub fn heartbeat_restored(endpoint: &str, machine: &str) -> Value {
        json!({
            "endpoint": endpoint,
            "machine": machine,
            "restoredAt": now(),
        })
    }

    /// HeartbeatingEndpointDetected
    pub fn endpoint_detected(endpoint: &str, machine: &str) -> Value {
        json!({
            "endpoint": endpoint,
            "machine": machine,
            "detectedAt": now(),
        })
    }

    pub fn alert_raised(id: Option<&str>, description: &str) -> Value {
        json!({
            "id": id,
            "description": description,
            "severity": "error",
            "raisedAt": now(),
            "relatedTo": [],
        })
    }

    pub fn custom_check_failed(check_id: &str, reason: &str) -> Value {
        json!({
            "customCheckId": check_id,
            "category": "Health",
            "failureReason": reason,
            "failedAt": now(),
        })
    }

    pub fn custom_check_succeeded(check_id: &str) -> Value {
        json!({
            "customCheckId": check_id,
            "succeededAt": now(),
        })
    }

    pub fn message_failed(message_id: &str, message_type: &str) -> Value {
        json!({
            "failedMessageId": message_id,
            "messageType": message_type,
            "receivingEndpoint": "Sales",
            "timeOfFailure": now(),
            "exceptionMessage": "System.TimeoutException",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_kernel::events::Event;

    #[test]
    fn test_payloads_decode_as_kernel_events() {
        let payload = serde_json::to_vec(&PulseEventBuilder::custom_check_failed("disk", "full")).unwrap();
        let event = Event::from_wire("CustomCheckFailed", &payload).unwrap();
        match event {
            Event::CustomCheckFailed(check) => {
                assert_eq!(check.custom_check_id, "disk");
                assert!(check.failed_at.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        let payload = serde_json::to_vec(&PulseEventBuilder::message_failed("m-1", "PlaceOrder")).unwrap();
        assert!(matches!(
            Event::from_wire("MessageFailed", &payload).unwrap(),
            Event::MessageFailed(_)
        ));
    }
}
