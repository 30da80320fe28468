//! Integration tests for network persistence
//!
//! These tests validate that a network written with `write_configuration`
//! and saved to disk rebuilds into an equivalent network.

mod common;

use common::scalar_at;
use fieldnet::config::{ElementConfigKind, NetworkConfig};
use fieldnet::graph::nodes::{Constant, Integrator, StaticGain, Sum};
use fieldnet::{
    DataRole, EngineSettings, GraphError, KernelRegistry, LoopMode, Network, SlotRef,
};
use std::time::Duration;
use tempfile::TempDir;

fn sample_network() -> Network {
    let net = Network::new();
    let rate = net.add_step("rate", Constant::new(2.0)).unwrap();
    let gain = net.add_step("gain", StaticGain::new(0.5)).unwrap();
    let sum = net.add_step("sum", Sum).unwrap();
    let integ = net.add_step("integ", Integrator::new(1.0)).unwrap();
    let clock = net
        .add_looped_trigger("clock", Duration::from_millis(100), LoopMode::FixedStep)
        .unwrap();
    let group = net.add_group("dynamics").unwrap();
    let join = net.add_multi_trigger("join").unwrap();

    net.set_parent(gain, Some(group)).unwrap();
    net.set_parent(integ, Some(group)).unwrap();
    net.promote(group, DataRole::Input, "u", SlotRef::input(gain, "in"))
        .unwrap();
    net.promote(group, DataRole::Output, "x", SlotRef::output(integ, "out"))
        .unwrap();

    net.connect(SlotRef::output(rate, "out"), SlotRef::input(group, "u"))
        .unwrap();
    net.connect(SlotRef::output(gain, "out"), SlotRef::input(integ, "rate"))
        .unwrap();
    net.connect(SlotRef::output(group, "x"), SlotRef::input(sum, "a"))
        .unwrap();
    net.connect_trigger(clock, rate).unwrap();
    net.connect_trigger(clock, join).unwrap();
    net.connect_trigger(sum, join).unwrap();
    net
}

#[test]
fn test_write_configuration_describes_network() {
    let config = sample_network().write_configuration();
    assert_eq!(config.elements.len(), 7);
    assert_eq!(config.connections.len(), 3);
    assert_eq!(config.triggers.len(), 3);
    assert_eq!(config.promotions.len(), 2);

    let gain = config.element("gain").unwrap();
    assert_eq!(gain.parent.as_deref(), Some("dynamics"));
    match &gain.kind {
        ElementConfigKind::Step { kernel, parameters } => {
            assert_eq!(kernel, "StaticGain");
            assert_eq!(parameters["gain"], 0.5);
        }
        other => panic!("unexpected kind {:?}", other),
    }
    assert_eq!(
        config.element("clock").unwrap().kind,
        ElementConfigKind::LoopedTrigger {
            period_us: 100_000,
            mode: LoopMode::FixedStep
        }
    );
    // Connections keep the promoted endpoints they were made with
    assert_eq!(config.connections[0].target.element, "dynamics");
}

#[test]
fn test_round_trip_json_and_toml() {
    let original = sample_network().write_configuration();
    let dir = TempDir::new().unwrap();
    let registry = KernelRegistry::with_builtins();

    for file in ["network.json", "nested/network.toml"] {
        let path = dir.path().join(file);
        original.save(&path).unwrap();
        let loaded = NetworkConfig::load(&path).unwrap();
        assert_eq!(loaded, original, "{} did not round trip", file);

        let rebuilt =
            Network::from_configuration(&loaded, &registry, EngineSettings::default()).unwrap();
        assert_eq!(rebuilt.write_configuration(), original);
    }
}

#[test]
fn test_rebuilt_network_computes() {
    let config = sample_network().write_configuration();
    let net = Network::from_configuration(
        &config,
        &KernelRegistry::with_builtins(),
        EngineSettings::default(),
    )
    .unwrap();

    let clock = net.find("clock").unwrap();
    let sum = net.find("sum").unwrap();
    net.step_once(clock).unwrap();
    // integ = 1.0 + (2.0 * 0.5) * 0.1
    common::assert_float_eq(scalar_at(&net, SlotRef::output(sum, "out")), 1.1, 1e-9);
}

#[test]
fn test_unknown_kernel_is_reported() {
    let config: NetworkConfig = serde_json::from_str(
        r#"{ "elements": [ { "name": "k", "type": "step", "kernel": "Convolution" } ] }"#,
    )
    .unwrap();
    let err = Network::from_configuration(
        &config,
        &KernelRegistry::with_builtins(),
        EngineSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::UnknownKernel(name) if name == "Convolution"));
}

#[test]
fn test_dangling_reference_is_reported() {
    let config: NetworkConfig = serde_json::from_str(
        r#"{ "triggers": [ { "source": "ghost", "listener": "nobody" } ] }"#,
    )
    .unwrap();
    assert!(matches!(
        Network::from_configuration(
            &config,
            &KernelRegistry::with_builtins(),
            EngineSettings::default()
        ),
        Err(GraphError::NotFound { .. })
    ));
}

#[test]
fn test_nested_groups_round_trip() {
    let net = Network::new();
    let outer = net.add_group("outer").unwrap();
    let inner = net.add_group("inner").unwrap();
    let gain = net.add_step("gain", StaticGain::new(3.0)).unwrap();
    let rate = net.add_step("rate", Constant::new(2.0)).unwrap();
    net.set_parent(inner, Some(outer)).unwrap();
    net.set_parent(gain, Some(inner)).unwrap();
    net.promote(inner, DataRole::Input, "y", SlotRef::input(gain, "in"))
        .unwrap();
    net.promote(outer, DataRole::Input, "x", SlotRef::input(inner, "y"))
        .unwrap();
    net.connect(SlotRef::output(rate, "out"), SlotRef::input(outer, "x"))
        .unwrap();

    let config = net.write_configuration();
    assert_eq!(config.promotions[0].group, "inner");
    assert_eq!(config.promotions[1].group, "outer");

    let rebuilt = Network::from_configuration(
        &config,
        &KernelRegistry::with_builtins(),
        EngineSettings::default(),
    )
    .unwrap();
    assert_eq!(rebuilt.write_configuration(), config);

    let gain = rebuilt.find("gain").unwrap();
    let outer = rebuilt.find("outer").unwrap();
    assert_eq!(
        rebuilt.resolve(&SlotRef::input(outer, "x")).unwrap(),
        SlotRef::input(gain, "in")
    );
    rebuilt.trigger(rebuilt.find("rate").unwrap()).unwrap();
    common::assert_float_eq(scalar_at(&rebuilt, SlotRef::output(gain, "out")), 6.0, 1e-9);
}

#[test]
fn test_sub_millisecond_periods_round_trip() {
    let net = Network::new();
    net.add_looped_trigger("fast", Duration::from_micros(500), LoopMode::Simulated)
        .unwrap();
    net.add_looped_trigger("odd", Duration::from_micros(1_500), LoopMode::FixedStep)
        .unwrap();

    let config = net.write_configuration();
    assert_eq!(
        config.element("fast").unwrap().kind,
        ElementConfigKind::LoopedTrigger {
            period_us: 500,
            mode: LoopMode::Simulated
        }
    );

    let rebuilt = Network::from_configuration(
        &config,
        &KernelRegistry::with_builtins(),
        EngineSettings::default(),
    )
    .unwrap();
    let odd = rebuilt.find("odd").unwrap();
    assert_eq!(rebuilt.step_once(odd).unwrap().origin, odd);
    assert_eq!(rebuilt.write_configuration(), config);
}
