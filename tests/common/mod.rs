//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use loadframe_rs::station::{StationMessage, StationReceiver};
use std::time::{Duration, Instant};

pub use builders::SimulatedStationBuilder;

/// Settle delay used for 1000-series sessions in tests
pub fn test_settle() -> Duration {
    Duration::from_millis(20)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Collect messages until `predicate` matches one or `timeout` expires
///
/// Returns everything received, including the matching message.
pub fn wait_for(
    receiver: &StationReceiver,
    timeout: Duration,
    predicate: impl Fn(&StationMessage) -> bool,
) -> Vec<StationMessage> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Some(msg) = receiver.recv_timeout(remaining) else {
            break;
        };
        let done = predicate(&msg);
        received.push(msg);
        if done {
            break;
        }
    }
    received
}

/// Poll `condition` every few milliseconds until it holds or `timeout` expires
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
