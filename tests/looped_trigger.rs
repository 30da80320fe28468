//! Integration tests for looped triggers
//!
//! These tests validate the clock threads:
//! - Tick counts over a run and quiescence after stop
//! - Idempotent start/stop, single stepping, drop behaviour
//! - Loop modes and lifecycle events
//!
//! Timing-sensitive, so they run serially.

mod common;

use common::builders::{RecorderBuilder, RecorderHandle};
use common::mock_helpers::{drain_events, wait_for_event};
use common::test_timeout;
use fieldnet::graph::{ElementId, NetworkEvent};
use fieldnet::{GraphError, LoopMode, Network};
use serial_test::serial;
use std::thread;
use std::time::Duration;

fn clocked(net: &Network, period_ms: u64, mode: LoopMode) -> (ElementId, RecorderHandle) {
    let clock = net
        .add_looped_trigger("clock", Duration::from_millis(period_ms), mode)
        .unwrap();
    let (kernel, handle) = RecorderBuilder::new("p").build();
    let p = net.add_step("p", kernel).unwrap();
    net.connect_trigger(clock, p).unwrap();
    (clock, handle)
}

#[test]
#[serial]
fn test_tick_count_matches_run_time() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 10, LoopMode::FixedStep);

    net.start(clock).unwrap();
    assert!(net.is_running(clock).unwrap());
    thread::sleep(Duration::from_millis(200));
    net.stop(clock).unwrap();
    assert!(!net.is_running(clock).unwrap());

    // 200ms at 10ms is N = 20 periods; N ± 1, plus the immediate first tick
    let stats = net.loop_statistics(clock).unwrap();
    assert!(
        (19..=22).contains(&stats.ticks),
        "expected about 20 ticks, got {}",
        stats.ticks
    );
    assert_eq!(handle.computes(), stats.ticks);
    assert!(stats.started_at.is_some());
}

#[test]
#[serial]
fn test_stop_is_a_quiescence_barrier() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 1, LoopMode::FixedStep);

    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(50));
    net.stop(clock).unwrap();

    let after_stop = handle.computes();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.computes(), after_stop);
}

#[test]
#[serial]
fn test_start_and_stop_are_idempotent() {
    let net = Network::new();
    let (clock, _) = clocked(&net, 5, LoopMode::RealTime);

    net.start(clock).unwrap();
    net.start(clock).unwrap();
    net.stop(clock).unwrap();
    net.stop(clock).unwrap();

    // Restarting resets the statistics
    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(20));
    net.stop(clock).unwrap();
    assert!(net.loop_statistics(clock).unwrap().ticks >= 1);
}

#[test]
#[serial]
fn test_first_tick_is_immediate() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 1000, LoopMode::FixedStep);
    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(100));
    net.stop(clock).unwrap();
    assert_eq!(handle.computes(), 1);
}

#[test]
#[serial]
fn test_step_once_requires_stopped_loop() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 20, LoopMode::FixedStep);

    let report = net.step_once(clock).unwrap();
    assert_eq!(report.computed, 1);
    assert_eq!(handle.computes(), 1);
    assert_eq!(net.loop_statistics(clock).unwrap().ticks, 1);

    net.start(clock).unwrap();
    assert!(matches!(
        net.step_once(clock),
        Err(GraphError::ThreadLifecycle(_))
    ));
    net.stop(clock).unwrap();
}

#[test]
#[serial]
fn test_simulated_mode_runs_back_to_back() {
    let net = Network::new();
    let (clock, _) = clocked(&net, 50, LoopMode::Simulated);
    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(100));
    net.stop(clock).unwrap();
    // A paced clock would manage 2 or 3 ticks
    assert!(net.loop_statistics(clock).unwrap().ticks > 10);
}

#[test]
#[serial]
fn test_dropping_network_stops_loops() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 1, LoopMode::FixedStep);
    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(20));
    drop(net);

    let after_drop = handle.computes();
    assert!(after_drop > 0);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(handle.computes(), after_drop);
}

#[test]
#[serial]
fn test_start_all_and_stop_all() {
    let net = Network::new();
    let fast = net
        .add_looped_trigger("fast", Duration::from_millis(2), LoopMode::FixedStep)
        .unwrap();
    let slow = net
        .add_looped_trigger("slow", Duration::from_millis(10), LoopMode::FixedStep)
        .unwrap();

    net.start_all().unwrap();
    assert!(net.is_running(fast).unwrap() && net.is_running(slow).unwrap());
    thread::sleep(Duration::from_millis(50));
    net.stop_all().unwrap();
    assert!(!net.is_running(fast).unwrap() && !net.is_running(slow).unwrap());

    let fast_ticks = net.loop_statistics(fast).unwrap().ticks;
    let slow_ticks = net.loop_statistics(slow).unwrap().ticks;
    assert!(fast_ticks > slow_ticks);
}

#[test]
#[serial]
fn test_loop_events() {
    let net = Network::new();
    let rx = net.subscribe();
    let (clock, _) = clocked(&net, 5, LoopMode::FixedStep);

    net.start(clock).unwrap();
    let started = wait_for_event(&rx, test_timeout(), |e| {
        matches!(e, NetworkEvent::LoopStarted { .. })
    });
    assert!(matches!(
        started,
        Some(NetworkEvent::LoopStarted { element, period }) if element == clock && period == Duration::from_millis(5)
    ));
    // A stop queued before the first tick would end the loop with no waves
    assert!(wait_for_event(&rx, test_timeout(), |e| {
        matches!(e, NetworkEvent::WaveFinished { origin, .. } if *origin == clock)
    })
    .is_some());
    net.stop(clock).unwrap();

    let events = drain_events(&rx);
    assert!(events.iter().any(|e| matches!(
        e,
        NetworkEvent::LoopStopped { element, ticks } if *element == clock && *ticks >= 1
    )));
}

#[test]
#[serial]
fn test_removing_running_loop_stops_it() {
    let net = Network::new();
    let (clock, handle) = clocked(&net, 1, LoopMode::FixedStep);
    net.start(clock).unwrap();
    thread::sleep(Duration::from_millis(10));
    net.remove_element(clock).unwrap();

    let after_remove = handle.computes();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.computes(), after_remove);
    assert!(net.find("clock").is_none());
}
