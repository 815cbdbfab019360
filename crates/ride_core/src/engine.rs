//! Composition root: owns the registry, trip store, hub, and matcher, and
//! runs the retry sweep as a background task with explicit start/shutdown.
//!
//! The engine is the process-wide instance the gateway talks to; there is no
//! ambient global state.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::NotificationEvent;
use crate::hub::NotificationHub;
use crate::matcher::Matcher;
use crate::registry::{DriverLocation, GeoRegistry};
use crate::stations::StationLookup;
use crate::trips::{Trip, TripStore};
use crate::types::{DriverStatus, RiderId, StationId, TripId, VehicleType};

struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<GeoRegistry>,
    trips: Arc<TripStore>,
    hub: Arc<NotificationHub>,
    matcher: Arc<Matcher>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl Engine {
    pub fn new(stations: Arc<dyn StationLookup>, config: EngineConfig) -> Self {
        let registry = Arc::new(GeoRegistry::new(&config));
        let trips = Arc::new(TripStore::new());
        let hub = Arc::new(NotificationHub::new(config.hub_buffer));
        let matcher = Arc::new(Matcher::new(
            config.clone(),
            Arc::clone(&registry),
            Arc::clone(&trips),
            Arc::clone(&hub),
            stations,
        ));
        Self {
            config,
            registry,
            trips,
            hub,
            matcher,
            sweep: Mutex::new(None),
        }
    }

    /// Start the retry sweep. Must be called from within a tokio runtime;
    /// calling it again while running is a no-op.
    pub fn start_sweep(&self) {
        let mut guard = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return;
        }
        let (shutdown, mut stop) = watch::channel(false);
        let matcher = Arc::clone(&self.matcher);
        let interval = self.config.sweep_interval;
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => matcher.sweep_once(),
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        *guard = Some(SweepHandle { shutdown, task });
        info!(interval_ms = self.config.sweep_interval.as_millis() as u64, "retry sweep started");
    }

    /// Stop the retry sweep and wait for the task to finish.
    pub async fn shutdown(&self) {
        let handle = {
            let mut guard = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        if let Some(SweepHandle { shutdown, task }) = handle {
            let _ = shutdown.send(true);
            let _ = task.await;
            info!("retry sweep stopped");
        }
    }

    // Rider-facing operations.

    pub fn request_ride(
        &self,
        rider_id: RiderId,
        pickup_station_id: StationId,
        drop_destination: String,
        requested_vehicle_type: VehicleType,
        arrival_time: String,
    ) -> Result<TripId> {
        self.matcher.request_ride(
            rider_id,
            pickup_station_id,
            drop_destination,
            requested_vehicle_type,
            arrival_time,
        )
    }

    pub fn cancel_ride(&self, trip_id: TripId) -> Result<Trip> {
        self.matcher.cancel_ride(trip_id)
    }

    pub fn get_trip_status(&self, trip_id: TripId) -> Result<Trip> {
        self.matcher.get_trip_status(trip_id)
    }

    pub fn track_driver(&self, driver_id: &str) -> Result<DriverLocation> {
        self.matcher.track_driver(driver_id)
    }

    // Driver-facing operations.

    pub fn register_route(
        &self,
        driver_id: &str,
        target_station_id: StationId,
        stops: Vec<String>,
        total_seats: u8,
        vehicle_type: VehicleType,
    ) -> Result<()> {
        self.matcher
            .register_route(driver_id, target_station_id, stops, total_seats, vehicle_type)
    }

    pub fn update_driver_location(&self, driver_id: &str, lat: f64, lon: f64) -> Result<()> {
        self.matcher.update_driver_location(driver_id, lat, lon)
    }

    pub fn set_driver_status(&self, driver_id: &str, status: DriverStatus) -> Result<()> {
        self.matcher.set_driver_status(driver_id, status)
    }

    pub fn get_driver_manifest(&self, driver_id: &str) -> Result<Vec<Trip>> {
        self.matcher.get_driver_manifest(driver_id)
    }

    pub fn complete_trip(&self, trip_id: TripId) -> Result<Trip> {
        self.matcher.complete_trip(trip_id)
    }

    // Notifications.

    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<NotificationEvent> {
        self.hub.subscribe(user_id)
    }

    /// The underlying registry, for composition and inspection.
    pub fn registry(&self) -> &GeoRegistry {
        &self.registry
    }

    /// The underlying trip store.
    pub fn trips(&self) -> &TripStore {
        &self.trips
    }

    /// Run one sweep pass synchronously (tests and manual drains).
    pub fn sweep_once(&self) {
        self.matcher.sweep_once();
    }
}
