//! Shared fixtures for tests: a small Bengaluru station table and driver
//! setup shortcuts.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::stations::StationDirectory;
use crate::types::{DriverStatus, GeoPoint, Station, VehicleType};

/// Majestic / city centre; also the coordinate the mobile client pins drivers
/// to in its demo mode.
pub const CENTRAL: GeoPoint = GeoPoint {
    lat: 12.9716,
    lon: 77.5946,
};

/// Kempegowda airport, ~30 km north of [`CENTRAL`].
pub const AIRPORT: GeoPoint = GeoPoint {
    lat: 13.1986,
    lon: 77.7066,
};

fn station(id: &str, name: &str, location: GeoPoint) -> Station {
    Station {
        id: id.to_string(),
        name: name.to_string(),
        location,
    }
}

/// Station table used across tests: `st-central`, `st-airport`,
/// `st-whitefield`.
pub fn test_stations() -> Arc<StationDirectory> {
    Arc::new(StationDirectory::with_stations([
        station("st-central", "Majestic", CENTRAL),
        station("st-airport", "Kempegowda Airport", AIRPORT),
        station("st-whitefield", "Whitefield", GeoPoint::new(12.9698, 77.7500)),
    ]))
}

pub fn test_engine() -> Engine {
    test_engine_with(EngineConfig::default())
}

pub fn test_engine_with(config: EngineConfig) -> Engine {
    Engine::new(test_stations(), config)
}

/// Register, mark Online, and ping a location: the full shift-start sequence.
pub fn bring_driver_online(
    engine: &Engine,
    driver_id: &str,
    vehicle: VehicleType,
    seats: u8,
    point: GeoPoint,
) {
    engine
        .register_route(driver_id, "st-central".to_string(), vec![], seats, vehicle)
        .expect("test station table has st-central");
    engine
        .set_driver_status(driver_id, DriverStatus::Online)
        .expect("driver was just registered");
    engine
        .update_driver_location(driver_id, point.lat, point.lon)
        .expect("test coordinates are valid");
}
