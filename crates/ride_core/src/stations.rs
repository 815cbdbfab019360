//! Pickup-station resolution.
//!
//! The engine treats stations as an external collaborator: ride requests carry
//! a `pickup_station_id` and the matcher only needs its coordinates. The
//! gateway serves the full station table to clients.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{EngineError, Result};
use crate::types::{GeoPoint, Station, StationId};

/// Resolves a station id to its coordinates.
pub trait StationLookup: Send + Sync {
    fn resolve(&self, station_id: &str) -> Result<GeoPoint>;
}

/// In-memory station table.
#[derive(Debug, Default)]
pub struct StationDirectory {
    stations: RwLock<HashMap<StationId, Station>>,
}

impl StationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        let directory = Self::new();
        for station in stations {
            directory.insert(station);
        }
        directory
    }

    pub fn insert(&self, station: Station) {
        let mut stations = self.stations.write().unwrap_or_else(PoisonError::into_inner);
        stations.insert(station.id.clone(), station);
    }

    pub fn list(&self) -> Vec<Station> {
        let stations = self.stations.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Station> = stations.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl StationLookup for StationDirectory {
    fn resolve(&self, station_id: &str) -> Result<GeoPoint> {
        let stations = self.stations.read().unwrap_or_else(PoisonError::into_inner);
        stations
            .get(station_id)
            .map(|station| station.location)
            .ok_or_else(|| EngineError::StationNotFound(station_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_returns_coordinates_for_known_station() {
        let directory = StationDirectory::with_stations([Station {
            id: "st-central".to_string(),
            name: "Central".to_string(),
            location: GeoPoint::new(12.9716, 77.5946),
        }]);

        let point = directory.resolve("st-central").expect("known station");
        assert_eq!(point, GeoPoint::new(12.9716, 77.5946));
    }

    #[test]
    fn resolve_fails_for_unknown_station() {
        let directory = StationDirectory::new();
        let err = directory.resolve("st-nowhere").unwrap_err();
        assert_eq!(err, EngineError::StationNotFound("st-nowhere".to_string()));
    }
}
