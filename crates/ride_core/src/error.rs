//! Engine error taxonomy.
//!
//! `SeatConflict` never surfaces to callers (the matching pass retries the
//! next candidate); a matching pass that finds zero candidates leaves the trip
//! Requested rather than erroring; timeouts are delivered as notifications,
//! not as synchronous errors.

use thiserror::Error;

use crate::types::{DriverId, StationId, TripId, TripStatus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("trip not found: {0}")]
    TripNotFound(TripId),

    #[error("driver not found: {0}")]
    DriverNotFound(DriverId),

    #[error("station not found: {0}")]
    StationNotFound(StationId),

    #[error("invalid trip transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("no available driver")]
    NoAvailableDriver,

    #[error("seat already reserved")]
    SeatConflict,

    #[error("trip already matched; use the driver drop-off path")]
    AlreadyMatched,

    #[error("coordinates out of range: ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
