//! Trip store: the single source of truth for a trip's lifecycle.
//!
//! Every state change goes through the adjacency check in
//! [`TripStatus::can_transition`] under that trip's own lock, so within one
//! trip transitions are totally ordered; across trips no ordering is imposed.
//! Each accepted transition is appended to a timestamped audit log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::types::{
    CancelActor, CancelReason, DriverId, RiderId, StationId, TripId, TripStatus, VehicleType,
};

/// One entry in a trip's audit log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRecord {
    pub status: TripStatus,
    pub at: DateTime<Utc>,
}

/// A trip record. `driver_id` is `None` only while Requested (or Cancelled
/// before a match).
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub trip_id: TripId,
    pub rider_id: RiderId,
    pub driver_id: Option<DriverId>,
    pub pickup_station_id: StationId,
    pub drop_destination: String,
    pub requested_vehicle_type: VehicleType,
    pub arrival_time: String,
    pub status: TripStatus,
    pub cancel_reason: Option<CancelReason>,
    pub created_at: DateTime<Utc>,
    pub transitions: Vec<TransitionRecord>,
}

#[derive(Debug, Default)]
pub struct TripStore {
    trips: RwLock<HashMap<TripId, Arc<Mutex<Trip>>>>,
}

impl TripStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new trip in Requested.
    pub fn create(
        &self,
        rider_id: RiderId,
        pickup_station_id: StationId,
        drop_destination: String,
        requested_vehicle_type: VehicleType,
        arrival_time: String,
    ) -> Trip {
        let now = Utc::now();
        let trip = Trip {
            trip_id: TripId::new(),
            rider_id,
            driver_id: None,
            pickup_station_id,
            drop_destination,
            requested_vehicle_type,
            arrival_time,
            status: TripStatus::Requested,
            cancel_reason: None,
            created_at: now,
            transitions: vec![TransitionRecord {
                status: TripStatus::Requested,
                at: now,
            }],
        };
        let mut trips = self.trips.write().unwrap_or_else(PoisonError::into_inner);
        trips.insert(trip.trip_id, Arc::new(Mutex::new(trip.clone())));
        trip
    }

    /// Snapshot of the current record.
    pub fn get(&self, trip_id: TripId) -> Result<Trip> {
        let trip = self.cell(trip_id)?;
        let trip = trip.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(trip.clone())
    }

    /// Apply `trip -> new_status` if the edge is legal; Matched binds the
    /// driver. Returns the updated snapshot.
    pub fn transition(
        &self,
        trip_id: TripId,
        new_status: TripStatus,
        driver_id: Option<DriverId>,
    ) -> Result<Trip> {
        let cell = self.cell(trip_id)?;
        let mut trip = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if !trip.status.can_transition(new_status) {
            return Err(EngineError::InvalidTransition {
                from: trip.status,
                to: new_status,
            });
        }
        if new_status == TripStatus::Matched {
            trip.driver_id = driver_id;
        }
        Self::record(&mut trip, new_status);
        Ok(trip.clone())
    }

    /// Cancel while Requested or Matched. The rider path loses once a match
    /// commit has happened (`AlreadyMatched`); driver/system actors may cancel
    /// a Matched trip. The returned snapshot carries the bound driver, if any,
    /// so the caller can release the reserved seat.
    pub fn cancel(&self, trip_id: TripId, actor: CancelActor) -> Result<Trip> {
        let cell = self.cell(trip_id)?;
        let mut trip = cell.lock().unwrap_or_else(PoisonError::into_inner);
        match trip.status {
            TripStatus::Requested => {}
            TripStatus::Matched => {
                if actor == CancelActor::Rider {
                    return Err(EngineError::AlreadyMatched);
                }
            }
            from => {
                return Err(EngineError::InvalidTransition {
                    from,
                    to: TripStatus::Cancelled,
                })
            }
        }
        trip.cancel_reason = Some(actor.reason());
        Self::record(&mut trip, TripStatus::Cancelled);
        info!(trip_id = %trip.trip_id, reason = ?trip.cancel_reason, "trip cancelled");
        Ok(trip.clone())
    }

    /// Active (Matched or InProgress) trips assigned to a driver, oldest
    /// first: the passenger manifest.
    pub fn trips_for_driver(&self, driver_id: &str) -> Vec<Trip> {
        let mut trips = self.snapshots(|trip| {
            trip.driver_id.as_deref() == Some(driver_id)
                && matches!(trip.status, TripStatus::Matched | TripStatus::InProgress)
        });
        trips.sort_by_key(|trip| trip.created_at);
        trips
    }

    /// Whether the driver still has an InProgress trip.
    pub fn has_in_progress(&self, driver_id: &str) -> bool {
        !self
            .snapshots(|trip| {
                trip.driver_id.as_deref() == Some(driver_id)
                    && trip.status == TripStatus::InProgress
            })
            .is_empty()
    }

    /// Flip all of the driver's Matched trips to InProgress (the driver going
    /// Busy starts the ride). Returns the updated snapshots.
    pub fn start_matched_trips(&self, driver_id: &str) -> Vec<Trip> {
        let matched = self.snapshots(|trip| {
            trip.driver_id.as_deref() == Some(driver_id) && trip.status == TripStatus::Matched
        });
        matched
            .into_iter()
            .filter_map(|trip| {
                self.transition(trip.trip_id, TripStatus::InProgress, None).ok()
            })
            .collect()
    }

    /// Snapshots of every trip still waiting for a match, oldest first, for
    /// the retry sweep.
    pub fn requested(&self) -> Vec<Trip> {
        let mut trips = self.snapshots(|trip| trip.status == TripStatus::Requested);
        trips.sort_by_key(|trip| trip.created_at);
        trips
    }

    fn snapshots(&self, keep: impl Fn(&Trip) -> bool) -> Vec<Trip> {
        let cells: Vec<Arc<Mutex<Trip>>> = {
            let trips = self.trips.read().unwrap_or_else(PoisonError::into_inner);
            trips.values().cloned().collect()
        };
        cells
            .into_iter()
            .filter_map(|cell| {
                let trip = cell.lock().unwrap_or_else(PoisonError::into_inner);
                keep(&trip).then(|| trip.clone())
            })
            .collect()
    }

    fn record(trip: &mut Trip, status: TripStatus) {
        trip.status = status;
        trip.transitions.push(TransitionRecord {
            status,
            at: Utc::now(),
        });
    }

    fn cell(&self, trip_id: TripId) -> Result<Arc<Mutex<Trip>>> {
        let trips = self.trips.read().unwrap_or_else(PoisonError::into_inner);
        trips
            .get(&trip_id)
            .cloned()
            .ok_or(EngineError::TripNotFound(trip_id))
    }
}
