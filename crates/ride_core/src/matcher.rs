//! The matcher: one matching pass per request, a retry sweep for the rest.
//!
//! `request_ride` returns the trip id immediately; whether a driver was found
//! is delivered asynchronously through the notification hub and the pollable
//! trip status. A pass that loses the seat race simply moves to the next
//! candidate; a pass that finds nobody leaves the trip Requested for the
//! sweep, which retries on a fixed interval and times the request out after
//! `max_wait`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::NotificationEvent;
use crate::hub::NotificationHub;
use crate::registry::{DriverLocation, GeoRegistry};
use crate::stations::StationLookup;
use crate::trips::{Trip, TripStore};
use crate::types::{
    CancelActor, DriverStatus, GeoPoint, RiderId, StationId, TripId, TripStatus, VehicleType,
};

pub struct Matcher {
    config: EngineConfig,
    registry: Arc<GeoRegistry>,
    trips: Arc<TripStore>,
    hub: Arc<NotificationHub>,
    stations: Arc<dyn StationLookup>,
}

impl Matcher {
    pub fn new(
        config: EngineConfig,
        registry: Arc<GeoRegistry>,
        trips: Arc<TripStore>,
        hub: Arc<NotificationHub>,
        stations: Arc<dyn StationLookup>,
    ) -> Self {
        Self {
            config,
            registry,
            trips,
            hub,
            stations,
        }
    }

    /// Create a trip and run one matching pass. Returns the trip id right
    /// away; an unmatched trip stays Requested and is picked up by the sweep.
    pub fn request_ride(
        &self,
        rider_id: RiderId,
        pickup_station_id: StationId,
        drop_destination: String,
        requested_vehicle_type: VehicleType,
        arrival_time: String,
    ) -> Result<TripId> {
        // Resolving first keeps an unknown station from minting a trip record.
        let pickup = self.stations.resolve(&pickup_station_id)?;
        let trip = self.trips.create(
            rider_id,
            pickup_station_id,
            drop_destination,
            requested_vehicle_type,
            arrival_time,
        );
        info!(trip_id = %trip.trip_id, rider_id = %trip.rider_id, vehicle = ?requested_vehicle_type, "ride requested");
        self.matching_pass(&trip, pickup);
        Ok(trip.trip_id)
    }

    /// Rider-initiated cancel. Valid only while Requested: once a match commit
    /// has happened this loses the race with `AlreadyMatched` and the rider is
    /// pointed at the driver-facing drop-off path.
    pub fn cancel_ride(&self, trip_id: TripId) -> Result<Trip> {
        let cancelled = self.trips.cancel(trip_id, CancelActor::Rider)?;
        if let Some(driver_id) = cancelled.driver_id.as_deref() {
            // Unreachable on the rider path today, but any cancel that held a
            // seat must hand it back.
            let _ = self.registry.release_seat(driver_id);
        }
        self.publish_status(&cancelled);
        Ok(cancelled)
    }

    pub fn get_trip_status(&self, trip_id: TripId) -> Result<Trip> {
        self.trips.get(trip_id)
    }

    /// Driver's route registration; validates the target station.
    pub fn register_route(
        &self,
        driver_id: &str,
        target_station_id: StationId,
        stops: Vec<String>,
        total_seats: u8,
        vehicle_type: VehicleType,
    ) -> Result<()> {
        self.stations.resolve(&target_station_id)?;
        self.registry
            .register(driver_id, vehicle_type, total_seats, target_station_id, stops);
        Ok(())
    }

    pub fn update_driver_location(&self, driver_id: &str, lat: f64, lon: f64) -> Result<()> {
        self.registry.update_location(driver_id, lat, lon)
    }

    /// Set driver availability. Going Busy is the driver starting the ride:
    /// every Matched trip on their manifest moves to InProgress.
    pub fn set_driver_status(&self, driver_id: &str, status: DriverStatus) -> Result<()> {
        self.registry.set_status(driver_id, status)?;
        if status == DriverStatus::Busy {
            for started in self.trips.start_matched_trips(driver_id) {
                self.publish_status(&started);
            }
        }
        Ok(())
    }

    /// Active passenger manifest for a driver.
    pub fn get_driver_manifest(&self, driver_id: &str) -> Result<Vec<Trip>> {
        if !self.registry.contains(driver_id) {
            return Err(EngineError::DriverNotFound(driver_id.to_string()));
        }
        Ok(self.trips.trips_for_driver(driver_id))
    }

    /// Drop-off: InProgress -> Completed, seat released; completing the last
    /// active trip flips the driver Busy -> Online.
    pub fn complete_trip(&self, trip_id: TripId) -> Result<Trip> {
        let completed = self.trips.transition(trip_id, TripStatus::Completed, None)?;
        if let Some(driver_id) = completed.driver_id.as_deref() {
            let _ = self.registry.release_seat(driver_id);
            if !self.trips.has_in_progress(driver_id) {
                let _ = self.registry.clear_busy(driver_id);
            }
        }
        info!(trip_id = %completed.trip_id, driver_id = ?completed.driver_id, "trip completed");
        self.publish_status(&completed);
        Ok(completed)
    }

    pub fn track_driver(&self, driver_id: &str) -> Result<DriverLocation> {
        self.registry.track(driver_id)
    }

    /// One retry-sweep pass over Requested trips: time out the ones past
    /// `max_wait`, re-attempt matching for the rest. Called on a fixed
    /// interval by the engine's background task.
    pub fn sweep_once(&self) {
        let now = Utc::now();
        let max_wait =
            ChronoDuration::from_std(self.config.max_wait).unwrap_or(ChronoDuration::MAX);
        for trip in self.trips.requested() {
            if now.signed_duration_since(trip.created_at) > max_wait {
                if let Ok(cancelled) = self.trips.cancel(trip.trip_id, CancelActor::System) {
                    info!(trip_id = %trip.trip_id, "request timed out before a match");
                    self.publish_status(&cancelled);
                }
                continue;
            }
            // A station removed after the request was accepted leaves the trip
            // to the timeout path.
            if let Ok(pickup) = self.stations.resolve(&trip.pickup_station_id) {
                self.matching_pass(&trip, pickup);
            }
        }
    }

    /// One attempt to find and reserve a driver for a Requested trip. Seat
    /// races fall through to the next candidate and are never surfaced; a
    /// concurrent cancellation between the seat reservation and the Matched
    /// commit wins, and the seat is handed back.
    fn matching_pass(&self, trip: &Trip, pickup: GeoPoint) -> bool {
        let candidates = self.registry.nearest(
            pickup,
            trip.requested_vehicle_type,
            1,
            self.config.candidate_limit,
        );
        if candidates.is_empty() {
            debug!(trip_id = %trip.trip_id, "no available driver, still searching");
            return false;
        }
        for candidate in candidates {
            match self.registry.try_reserve_seat(&candidate.driver_id) {
                Ok(()) => {}
                Err(EngineError::SeatConflict) => {
                    debug!(trip_id = %trip.trip_id, driver_id = %candidate.driver_id, "lost seat race, trying next candidate");
                    continue;
                }
                // Driver dropped out between the query and the reservation.
                Err(_) => continue,
            }
            match self.trips.transition(
                trip.trip_id,
                TripStatus::Matched,
                Some(candidate.driver_id.clone()),
            ) {
                Ok(matched) => {
                    info!(
                        trip_id = %matched.trip_id,
                        driver_id = %candidate.driver_id,
                        distance_km = candidate.distance_km,
                        "trip matched"
                    );
                    let event = NotificationEvent::Match {
                        trip_id: matched.trip_id,
                        rider_id: matched.rider_id.clone(),
                        driver_id: candidate.driver_id.clone(),
                    };
                    self.hub.publish(&matched.rider_id, event.clone());
                    self.hub.publish(&candidate.driver_id, event);
                    return true;
                }
                Err(_) => {
                    // The trip was cancelled (or matched elsewhere) first.
                    let _ = self.registry.release_seat(&candidate.driver_id);
                    return false;
                }
            }
        }
        false
    }

    /// Publish-on-transition hook: STATUS to the rider and, when bound, the
    /// driver.
    fn publish_status(&self, trip: &Trip) {
        let event = NotificationEvent::Status {
            trip_id: trip.trip_id,
            status: trip.status,
            reason: trip.cancel_reason,
        };
        self.hub.publish(&trip.rider_id, event.clone());
        if let Some(driver_id) = trip.driver_id.as_deref() {
            self.hub.publish(driver_id, event);
        }
    }
}
