//! End-to-end engine scenarios: matching, notifications, the retry sweep, and
//! the races the seat counter and state machine have to win.

use std::sync::Arc;
use std::time::Duration;

use ride_core::config::EngineConfig;
use ride_core::engine::Engine;
use ride_core::error::EngineError;
use ride_core::events::NotificationEvent;
use ride_core::test_helpers::{bring_driver_online, test_engine, test_engine_with, CENTRAL};
use ride_core::types::{CancelReason, DriverStatus, TripStatus, VehicleType};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn request(engine: &Engine, rider: &str, vehicle: VehicleType) -> ride_core::types::TripId {
    engine
        .request_ride(
            rider.to_string(),
            "st-central".to_string(),
            "Airport".to_string(),
            vehicle,
            "09:30".to_string(),
        )
        .expect("request accepted")
}

#[tokio::test]
async fn match_event_reaches_rider_and_driver() {
    let engine = test_engine();
    bring_driver_online(&engine, "driver-a", VehicleType::SedanAc, 4, CENTRAL);

    let mut rider_events = engine.subscribe("rider-1");
    let mut driver_events = engine.subscribe("driver-a");

    let trip_id = request(&engine, "rider-1", VehicleType::SedanAc);

    for events in [&mut rider_events, &mut driver_events] {
        let event = tokio::time::timeout(RECV_TIMEOUT, events.recv())
            .await
            .expect("event before timeout")
            .expect("channel open");
        match event {
            NotificationEvent::Match {
                trip_id: event_trip,
                driver_id,
                ..
            } => {
                assert_eq!(event_trip, trip_id);
                assert_eq!(driver_id, "driver-a");
            }
            other => panic!("expected MATCH, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn unmatchable_request_times_out_through_the_sweep() {
    let config = EngineConfig::default()
        .with_sweep_interval(Duration::from_millis(10))
        .with_max_wait(Duration::from_millis(30));
    let engine = test_engine_with(config);
    engine.start_sweep();

    let mut rider_events = engine.subscribe("rider-1");
    let trip_id = request(&engine, "rider-1", VehicleType::Luxury);

    let event = tokio::time::timeout(RECV_TIMEOUT, rider_events.recv())
        .await
        .expect("timeout event before deadline")
        .expect("channel open");
    assert_eq!(
        event,
        NotificationEvent::Status {
            trip_id,
            status: TripStatus::Cancelled,
            reason: Some(CancelReason::Timeout),
        }
    );

    let trip = engine.get_trip_status(trip_id).expect("trip");
    assert_eq!(trip.status, TripStatus::Cancelled);
    engine.shutdown().await;
}

#[tokio::test]
async fn lifecycle_pushes_a_status_event_per_transition() {
    let engine = test_engine();
    bring_driver_online(&engine, "driver-a", VehicleType::Auto, 2, CENTRAL);
    let mut rider_events = engine.subscribe("rider-1");

    let trip_id = request(&engine, "rider-1", VehicleType::Auto);
    engine
        .set_driver_status("driver-a", DriverStatus::Busy)
        .expect("known driver");
    engine.complete_trip(trip_id).expect("drop-off");

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(RECV_TIMEOUT, rider_events.recv())
            .await
            .expect("event before timeout")
            .expect("channel open");
        match event {
            NotificationEvent::Match { .. } => statuses.push(TripStatus::Matched),
            NotificationEvent::Status { status, .. } => statuses.push(status),
        }
    }
    assert_eq!(
        statuses,
        vec![
            TripStatus::Matched,
            TripStatus::InProgress,
            TripStatus::Completed
        ]
    );

    let trip = engine.get_trip_status(trip_id).expect("trip");
    let logged: Vec<TripStatus> = trip.transitions.iter().map(|t| t.status).collect();
    assert_eq!(
        logged,
        vec![
            TripStatus::Requested,
            TripStatus::Matched,
            TripStatus::InProgress,
            TripStatus::Completed
        ]
    );
}

#[test]
fn concurrent_requests_never_overbook_the_last_seat() {
    let engine = Arc::new(test_engine());
    bring_driver_online(&engine, "driver-a", VehicleType::SedanAc, 1, CENTRAL);

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || request(&engine, &format!("rider-{i}"), VehicleType::SedanAc))
        })
        .collect();
    let trip_ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("request thread"))
        .collect();

    let statuses: Vec<TripStatus> = trip_ids
        .iter()
        .map(|id| engine.get_trip_status(*id).expect("trip").status)
        .collect();
    let matched = statuses.iter().filter(|s| **s == TripStatus::Matched).count();
    let requested = statuses.iter().filter(|s| **s == TripStatus::Requested).count();

    assert_eq!(matched, 1, "exactly one rider wins the last seat");
    assert_eq!(requested, 1, "the loser keeps searching");
    assert_eq!(
        engine.registry().seats_available("driver-a").expect("known"),
        0
    );
}

#[test]
fn cancel_versus_match_commit_has_exactly_one_winner() {
    for _ in 0..20 {
        let engine = Arc::new(test_engine());
        let trip_id = request(&engine, "rider-1", VehicleType::SedanAc);

        let matcher_side = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                bring_driver_online(&engine, "driver-a", VehicleType::SedanAc, 4, CENTRAL);
                engine.sweep_once();
            })
        };
        let cancel_side = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.cancel_ride(trip_id))
        };

        matcher_side.join().expect("matcher thread");
        let cancel_result = cancel_side.join().expect("cancel thread");

        let trip = engine.get_trip_status(trip_id).expect("trip");
        match trip.status {
            TripStatus::Matched => {
                assert_eq!(cancel_result, Err(EngineError::AlreadyMatched));
                assert_eq!(
                    engine.registry().seats_available("driver-a").expect("known"),
                    3
                );
            }
            TripStatus::Cancelled => {
                assert!(cancel_result.is_ok());
                // Any seat the losing match attempt held was handed back.
                assert_eq!(
                    engine.registry().seats_available("driver-a").expect("known"),
                    4
                );
            }
            other => panic!("trip ended in {other:?}"),
        }
    }
}

#[tokio::test]
async fn sweep_matches_once_capacity_frees_up() {
    let config = EngineConfig::default().with_sweep_interval(Duration::from_millis(10));
    let engine = test_engine_with(config);
    bring_driver_online(&engine, "driver-a", VehicleType::Auto, 1, CENTRAL);

    let first = request(&engine, "rider-1", VehicleType::Auto);
    let second = request(&engine, "rider-2", VehicleType::Auto);
    assert_eq!(
        engine.get_trip_status(second).expect("trip").status,
        TripStatus::Requested
    );

    // First passenger rides and is dropped off; the freed seat lets the sweep
    // match the waiting request.
    engine
        .set_driver_status("driver-a", DriverStatus::Busy)
        .expect("known driver");
    engine.complete_trip(first).expect("drop-off");
    engine.start_sweep();

    let mut matched = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if engine.get_trip_status(second).expect("trip").status == TripStatus::Matched {
            matched = true;
            break;
        }
    }
    engine.shutdown().await;
    assert!(matched, "sweep should match the waiting trip");
}
