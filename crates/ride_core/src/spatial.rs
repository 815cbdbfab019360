//! Spatial operations: H3-based geographic bucketing and haversine distance.
//!
//! The registry buckets drivers into H3 cells (default resolution 9, ~240m)
//! and the nearest-driver search expands grid-disk rings around the pickup
//! cell. Grid disks for a (cell, k) pair are cached: pickup stations are a
//! small fixed set, so the same disks are requested on every matching pass.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

use crate::error::{EngineError, Result};
use crate::types::GeoPoint;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

const DISK_CACHE_ENTRIES: usize = 1_000;

/// H3 indexing at a fixed resolution with a bounded grid-disk cache.
#[derive(Debug)]
pub struct GeoIndex {
    resolution: Resolution,
    disk_cache: Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            disk_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DISK_CACHE_ENTRIES).expect("cache size must be non-zero"),
            )),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Index a coordinate pair into a cell at this resolution.
    pub fn cell_for(&self, point: GeoPoint) -> Result<CellIndex> {
        let coord = LatLng::new(point.lat, point.lon).map_err(|_| EngineError::InvalidCoordinates {
            lat: point.lat,
            lon: point.lon,
        })?;
        Ok(coord.to_cell(self.resolution))
    }

    /// All cells within grid distance `k` of `origin`, cached.
    pub fn ring(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        let mut cache = match self.disk_cache.lock() {
            Ok(guard) => guard,
            // Compute without the cache if the mutex is poisoned.
            Err(_) => return origin.grid_disk::<Vec<_>>(k),
        };
        cache
            .get_or_insert((origin, k), || origin.grid_disk::<Vec<_>>(k))
            .clone()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new(Resolution::Nine)
    }
}

/// Great-circle (haversine) distance between two coordinates, in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}
