//! Ride-matching and trip lifecycle engine: geo-indexed driver registry,
//! matcher with a background retry sweep, trip state machine, and per-user
//! notification fan-out. The HTTP gateway, auth, and persistence are external
//! collaborators.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hub;
pub mod matcher;
pub mod registry;
pub mod spatial;
pub mod stations;
pub mod trips;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
