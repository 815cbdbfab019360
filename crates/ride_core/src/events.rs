//! Notification payloads pushed to rider and driver subscriptions.
//!
//! Payloads are transport-agnostic; the gateway frames them (server-sent
//! events for the mobile client). The client keys off the literal `type` tag,
//! so MATCH/STATUS spellings are part of the wire contract.

use serde::{Deserialize, Serialize};

use crate::types::{CancelReason, DriverId, RiderId, TripId, TripStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    /// A driver was reserved for the trip. Sent to both parties.
    #[serde(rename = "MATCH")]
    Match {
        trip_id: TripId,
        rider_id: RiderId,
        driver_id: DriverId,
    },
    /// The trip changed state (started, completed, cancelled).
    #[serde(rename = "STATUS")]
    Status {
        trip_id: TripId,
        status: TripStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<CancelReason>,
    },
}

impl NotificationEvent {
    pub fn trip_id(&self) -> TripId {
        match self {
            NotificationEvent::Match { trip_id, .. } => *trip_id,
            NotificationEvent::Status { trip_id, .. } => *trip_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TripStatus;

    #[test]
    fn match_event_carries_the_match_tag() {
        let event = NotificationEvent::Match {
            trip_id: TripId::new(),
            rider_id: "rider-1".to_string(),
            driver_id: "driver-1".to_string(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"MATCH\""), "got {json}");
    }

    #[test]
    fn status_event_omits_absent_reason() {
        let event = NotificationEvent::Status {
            trip_id: TripId::new(),
            status: TripStatus::Completed,
            reason: None,
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"STATUS\""));
        assert!(json.contains("\"COMPLETED\""));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn timeout_cancellation_carries_its_reason() {
        let event = NotificationEvent::Status {
            trip_id: TripId::new(),
            status: TripStatus::Cancelled,
            reason: Some(CancelReason::Timeout),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"reason\":\"TIMEOUT\""));
    }
}
