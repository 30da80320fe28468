//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use fieldnet::graph::{ElementId, Network};
use fieldnet::SlotRef;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(500)
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

/// Connect `source.out` to `target.<input>`
pub fn wire(net: &Network, source: ElementId, target: ElementId, input: &str) {
    net.connect(SlotRef::output(source, "out"), SlotRef::input(target, input))
        .unwrap();
}

/// Scalar currently behind a slot
pub fn scalar_at(net: &Network, slot: SlotRef) -> f64 {
    net.read_slot(&slot).unwrap().as_scalar().unwrap()
}
