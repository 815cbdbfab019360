//! Geo registry: live driver positions, capacity, and nearest-driver queries.
//!
//! Driver entries are individually synchronized: profile fields (status,
//! location, vehicle) sit behind a per-entry mutex, and the seat counter is an
//! atomic so the matcher's reservation is a single decrement-if-positive.
//! There is no registry-wide lock on the mutation path; the outer maps are
//! read-mostly `RwLock`s guarding only id -> entry and cell -> ids lookups.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use h3o::CellIndex;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::spatial::{distance_km, GeoIndex};
use crate::types::{DriverId, DriverStatus, GeoPoint, StationId, VehicleType};

/// Vehicle capacity bounds enforced on registration.
pub const MIN_SEATS: u8 = 1;
pub const MAX_SEATS: u8 = 8;

/// Defaults for drivers first seen through a location ping, before any route
/// registration. SedanAC/4 is the client's route-setup default; the driver
/// stays Offline (and thus unmatchable) until an explicit status change.
const AUTO_REGISTER_VEHICLE: VehicleType = VehicleType::SedanAc;
const AUTO_REGISTER_SEATS: u8 = 4;

/// A driver's last known position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time snapshot of one driver entry.
#[derive(Debug, Clone)]
pub struct DriverRecord {
    pub driver_id: DriverId,
    pub vehicle_type: VehicleType,
    pub total_seats: u32,
    pub seats_available: u32,
    pub status: DriverStatus,
    pub location: Option<DriverLocation>,
    pub target_station_id: Option<StationId>,
    pub stops: Vec<String>,
}

/// One match candidate returned by [`GeoRegistry::nearest`].
#[derive(Debug, Clone)]
pub struct DriverCandidate {
    pub driver_id: DriverId,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct DriverProfile {
    vehicle_type: VehicleType,
    status: DriverStatus,
    location: Option<DriverLocation>,
    target_station_id: Option<StationId>,
    stops: Vec<String>,
}

#[derive(Debug)]
struct DriverEntry {
    total_seats: AtomicU32,
    seats_available: AtomicU32,
    profile: Mutex<DriverProfile>,
}

impl DriverEntry {
    fn new(vehicle_type: VehicleType, total_seats: u8) -> Self {
        let seats = u32::from(total_seats.clamp(MIN_SEATS, MAX_SEATS));
        Self {
            total_seats: AtomicU32::new(seats),
            seats_available: AtomicU32::new(seats),
            profile: Mutex::new(DriverProfile {
                vehicle_type,
                status: DriverStatus::Offline,
                location: None,
                target_station_id: None,
                stops: Vec::new(),
            }),
        }
    }
}

/// Cell -> drivers buckets with a reverse map for incremental moves.
#[derive(Debug, Default)]
struct CellBuckets {
    by_cell: HashMap<CellIndex, Vec<DriverId>>,
    cell_of: HashMap<DriverId, CellIndex>,
}

impl CellBuckets {
    fn place(&mut self, driver_id: &DriverId, cell: CellIndex) {
        if let Some(old_cell) = self.cell_of.get(driver_id) {
            if *old_cell == cell {
                return;
            }
            let old_cell = *old_cell;
            if let Some(ids) = self.by_cell.get_mut(&old_cell) {
                ids.retain(|id| id != driver_id);
                if ids.is_empty() {
                    self.by_cell.remove(&old_cell);
                }
            }
        }
        self.by_cell.entry(cell).or_default().push(driver_id.clone());
        self.cell_of.insert(driver_id.clone(), cell);
    }

    fn ids_in_cells<'a>(&'a self, cells: &[CellIndex]) -> impl Iterator<Item = &'a DriverId> {
        let mut ids = Vec::new();
        for cell in cells {
            if let Some(bucket) = self.by_cell.get(cell) {
                ids.extend(bucket.iter());
            }
        }
        ids.into_iter()
    }
}

/// Registry of online drivers and their positions.
pub struct GeoRegistry {
    geo: GeoIndex,
    stale_after: ChronoDuration,
    search_ring_limit: u32,
    drivers: RwLock<HashMap<DriverId, Arc<DriverEntry>>>,
    buckets: RwLock<CellBuckets>,
}

impl GeoRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        let stale_after =
            ChronoDuration::from_std(config.stale_location_after).unwrap_or(ChronoDuration::MAX);
        Self {
            geo: GeoIndex::default(),
            stale_after,
            search_ring_limit: config.search_ring_limit,
            drivers: RwLock::new(HashMap::new()),
            buckets: RwLock::new(CellBuckets::default()),
        }
    }

    /// Upsert a driver's route registration. A re-registration starts a fresh
    /// shift: the seat counter resets to the new capacity. Status and last
    /// location are preserved for known drivers; new drivers start Offline.
    pub fn register(
        &self,
        driver_id: &str,
        vehicle_type: VehicleType,
        total_seats: u8,
        target_station_id: StationId,
        stops: Vec<String>,
    ) {
        let entry = self.entry_or_insert(driver_id, vehicle_type, total_seats);
        let seats = u32::from(total_seats.clamp(MIN_SEATS, MAX_SEATS));
        entry.total_seats.store(seats, Ordering::Release);
        entry.seats_available.store(seats, Ordering::Release);
        let mut profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        profile.vehicle_type = vehicle_type;
        profile.target_station_id = Some(target_station_id);
        profile.stops = stops;
        info!(driver_id, vehicle = ?vehicle_type, seats, "route registered");
    }

    /// Upsert a driver's position. Unknown drivers are auto-registered with
    /// defaults and remain Offline until a status change.
    pub fn update_location(&self, driver_id: &str, lat: f64, lon: f64) -> Result<()> {
        let point = GeoPoint::new(lat, lon);
        let cell = self.geo.cell_for(point)?;
        let entry = self.entry_or_insert(driver_id, AUTO_REGISTER_VEHICLE, AUTO_REGISTER_SEATS);
        {
            let mut profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
            profile.location = Some(DriverLocation {
                point,
                updated_at: Utc::now(),
            });
        }
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        buckets.place(&driver_id.to_string(), cell);
        Ok(())
    }

    /// Set a driver's availability. Offline drivers drop out of match
    /// eligibility immediately (the `nearest` filter); their last location is
    /// kept for tracking.
    pub fn set_status(&self, driver_id: &str, status: DriverStatus) -> Result<()> {
        let entry = self.entry(driver_id)?;
        let mut profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        profile.status = status;
        Ok(())
    }

    /// Flip Busy back to Online (end of the driver's last in-progress trip).
    /// A driver who went Offline mid-trip stays Offline.
    pub fn clear_busy(&self, driver_id: &str) -> Result<()> {
        let entry = self.entry(driver_id)?;
        let mut profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        if profile.status == DriverStatus::Busy {
            profile.status = DriverStatus::Online;
        }
        Ok(())
    }

    /// Atomically reserve one seat: a single decrement-if-positive. Exactly
    /// one of any set of concurrent callers wins the last seat.
    pub fn try_reserve_seat(&self, driver_id: &str) -> Result<()> {
        let entry = self.entry(driver_id)?;
        entry
            .seats_available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seats| {
                seats.checked_sub(1)
            })
            .map(|_| ())
            .map_err(|_| EngineError::SeatConflict)
    }

    /// Return one seat (completion or cancellation). Capped at the vehicle's
    /// capacity, so a stray double-release cannot overflow the counter.
    pub fn release_seat(&self, driver_id: &str) -> Result<()> {
        let entry = self.entry(driver_id)?;
        let total = entry.total_seats.load(Ordering::Acquire);
        let _ = entry
            .seats_available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seats| {
                if seats < total {
                    Some(seats + 1)
                } else {
                    None
                }
            });
        Ok(())
    }

    pub fn seats_available(&self, driver_id: &str) -> Result<u32> {
        Ok(self.entry(driver_id)?.seats_available.load(Ordering::Acquire))
    }

    /// Last known position, for rider-side tracking.
    pub fn track(&self, driver_id: &str) -> Result<DriverLocation> {
        let entry = self.entry(driver_id)?;
        let profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        profile
            .location
            .ok_or_else(|| EngineError::DriverNotFound(driver_id.to_string()))
    }

    pub fn get(&self, driver_id: &str) -> Result<DriverRecord> {
        let entry = self.entry(driver_id)?;
        let profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(DriverRecord {
            driver_id: driver_id.to_string(),
            vehicle_type: profile.vehicle_type,
            total_seats: entry.total_seats.load(Ordering::Acquire),
            seats_available: entry.seats_available.load(Ordering::Acquire),
            status: profile.status,
            location: profile.location,
            target_station_id: profile.target_station_id.clone(),
            stops: profile.stops.clone(),
        })
    }

    pub fn contains(&self, driver_id: &str) -> bool {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        drivers.contains_key(driver_id)
    }

    /// Nearest eligible drivers to `origin`: Online, exact vehicle-type match,
    /// at least `min_seats` free, location fresher than the staleness
    /// threshold. Ordered by ascending haversine distance; ties go to the
    /// fresher location. An empty result is a valid "no match" outcome.
    ///
    /// Cell buckets around the origin are searched first; whenever the rings
    /// produce fewer than `limit` eligible drivers, the remaining entries are
    /// scanned so the result stays a global nearest-k.
    pub fn nearest(
        &self,
        origin: GeoPoint,
        vehicle_type: VehicleType,
        min_seats: u32,
        limit: usize,
    ) -> Vec<DriverCandidate> {
        if limit == 0 {
            return Vec::new();
        }
        let Ok(origin_cell) = self.geo.cell_for(origin) else {
            return Vec::new();
        };
        let now = Utc::now();

        let mut seen: HashSet<DriverId> = HashSet::new();
        let mut candidates: Vec<DriverCandidate> = Vec::new();

        let ring_ids: Vec<DriverId> = {
            let cells = self.geo.ring(origin_cell, self.search_ring_limit);
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            buckets.ids_in_cells(&cells).cloned().collect()
        };
        for driver_id in ring_ids {
            if seen.insert(driver_id.clone()) {
                if let Some(candidate) =
                    self.candidate_snapshot(&driver_id, origin, vehicle_type, min_seats, now)
                {
                    candidates.push(candidate);
                }
            }
        }

        if candidates.len() < limit {
            let all_ids: Vec<DriverId> = {
                let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
                drivers.keys().cloned().collect()
            };
            for driver_id in all_ids {
                if seen.insert(driver_id.clone()) {
                    if let Some(candidate) =
                        self.candidate_snapshot(&driver_id, origin, vehicle_type, min_seats, now)
                    {
                        candidates.push(candidate);
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        candidates.truncate(limit);
        debug!(
            vehicle = ?vehicle_type,
            found = candidates.len(),
            "nearest query"
        );
        candidates
    }

    /// Consistent per-entry snapshot: status, location, and freshness are read
    /// under the entry lock so a concurrent ping cannot tear the candidate.
    fn candidate_snapshot(
        &self,
        driver_id: &DriverId,
        origin: GeoPoint,
        vehicle_type: VehicleType,
        min_seats: u32,
        now: DateTime<Utc>,
    ) -> Option<DriverCandidate> {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        let entry = Arc::clone(drivers.get(driver_id)?);
        drop(drivers);

        let profile = entry.profile.lock().unwrap_or_else(PoisonError::into_inner);
        if profile.status != DriverStatus::Online || profile.vehicle_type != vehicle_type {
            return None;
        }
        let location = profile.location?;
        // Lazily expired entry, not an error.
        if now.signed_duration_since(location.updated_at) > self.stale_after {
            return None;
        }
        drop(profile);

        if entry.seats_available.load(Ordering::Acquire) < min_seats {
            return None;
        }
        Some(DriverCandidate {
            driver_id: driver_id.clone(),
            location: location.point,
            distance_km: distance_km(origin, location.point),
            updated_at: location.updated_at,
        })
    }

    fn entry(&self, driver_id: &str) -> Result<Arc<DriverEntry>> {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        drivers
            .get(driver_id)
            .cloned()
            .ok_or_else(|| EngineError::DriverNotFound(driver_id.to_string()))
    }

    fn entry_or_insert(
        &self,
        driver_id: &str,
        vehicle_type: VehicleType,
        total_seats: u8,
    ) -> Arc<DriverEntry> {
        {
            let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = drivers.get(driver_id) {
                return Arc::clone(entry);
            }
        }
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            drivers
                .entry(driver_id.to_string())
                .or_insert_with(|| Arc::new(DriverEntry::new(vehicle_type, total_seats))),
        )
    }
}
