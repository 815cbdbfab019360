//! Core domain types shared across the engine.
//!
//! Rider, driver, and station ids are opaque strings issued by the upstream
//! auth service; the engine performs no credential checks. Trip ids are minted
//! here.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Driver id, trusted from upstream auth.
pub type DriverId = String;
/// Rider id, trusted from upstream auth.
pub type RiderId = String;
/// Station id as served by the gateway's `/stations` table.
pub type StationId = String;

/// Unique trip identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(pub Uuid);

impl TripId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Vehicle classes offered to riders. Wire codes (1-6) match the mobile
/// client's numeric enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Hatchback,
    SedanAc,
    Suv,
    Luxury,
    Van,
    Auto,
}

impl VehicleType {
    pub fn code(self) -> u8 {
        match self {
            VehicleType::Hatchback => 1,
            VehicleType::SedanAc => 2,
            VehicleType::Suv => 3,
            VehicleType::Luxury => 4,
            VehicleType::Van => 5,
            VehicleType::Auto => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(VehicleType::Hatchback),
            2 => Some(VehicleType::SedanAc),
            3 => Some(VehicleType::Suv),
            4 => Some(VehicleType::Luxury),
            5 => Some(VehicleType::Van),
            6 => Some(VehicleType::Auto),
            _ => None,
        }
    }
}

/// Driver availability as seen by the matcher. Offline drivers are removed
/// from match eligibility immediately; Busy drivers keep their trips but take
/// no new matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Online,
    Busy,
    Offline,
}

/// Trip lifecycle state. Edges are enforced by the trip store; see
/// [`TripStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Requested,
    Matched,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Whether `self -> next` is a legal state-machine edge. Cancellation is
    /// only reachable from Requested and Matched; Completed and Cancelled are
    /// terminal.
    pub fn can_transition(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Requested, Matched)
                | (Matched, InProgress)
                | (InProgress, Completed)
                | (Requested, Cancelled)
                | (Matched, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

/// Why a trip was cancelled; recorded on the trip and carried on STATUS
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    Rider,
    Driver,
    Timeout,
}

/// Who is asking for the cancellation. The rider path loses the
/// cancel-vs-match race once a seat is committed; the system actor is the
/// retry sweep's timeout path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    Rider,
    Driver,
    System,
}

impl CancelActor {
    pub fn reason(self) -> CancelReason {
        match self {
            CancelActor::Rider => CancelReason::Rider,
            CancelActor::Driver => CancelReason::Driver,
            CancelActor::System => CancelReason::Timeout,
        }
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A pickup station as listed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub location: GeoPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_codes_round_trip() {
        for code in 1..=6u8 {
            let vehicle = VehicleType::from_code(code).expect("valid code");
            assert_eq!(vehicle.code(), code);
        }
        assert_eq!(VehicleType::from_code(0), None);
        assert_eq!(VehicleType::from_code(7), None);
    }

    #[test]
    fn trip_status_edges_match_state_machine() {
        use TripStatus::*;
        assert!(Requested.can_transition(Matched));
        assert!(Matched.can_transition(InProgress));
        assert!(InProgress.can_transition(Completed));
        assert!(Requested.can_transition(Cancelled));
        assert!(Matched.can_transition(Cancelled));

        // No skipping states, no cancelling mid-trip, terminals stay terminal.
        assert!(!Requested.can_transition(Completed));
        assert!(!Requested.can_transition(InProgress));
        assert!(!InProgress.can_transition(Cancelled));
        assert!(!Completed.can_transition(Requested));
        assert!(!Cancelled.can_transition(Matched));
    }

    #[test]
    fn trip_status_serializes_to_client_tags() {
        let json = serde_json::to_string(&TripStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"IN_PROGRESS\"");
        let json = serde_json::to_string(&VehicleType::SedanAc).expect("serialize");
        assert_eq!(json, "\"SEDAN_AC\"");
    }
}
