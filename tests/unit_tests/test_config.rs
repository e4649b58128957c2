// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use gatelink::{
    cfg::config::ClusterConfig,
    cluster::Dispatch,
};

#[test]
fn empty_config_uses_defaults() {
    let mut cfg: ClusterConfig = serde_yaml::from_str("{}").expect("parse");
    cfg.validate_and_normalize().expect("valid");

    assert_eq!(cfg.transport.heartbeat_interval(), Duration::from_secs(10));
    assert_eq!(cfg.transport.rpc_timeout(), Duration::from_secs(3));
    assert_eq!(cfg.transport.conns_per_target(), 1);
    assert!(cfg.tracer.disabled);
    assert!(cfg.gate.id.is_none());
}

#[test]
fn full_config_round_trip() {
    let yaml = r#"
gate:
  id: gate-1
  name: edge
  addr: 0.0.0.0:4410
  timeout_secs: 5
  weight: 3
  dispatch: round-robin
  metadata:
    region: eu-1
node:
  name: logic
transport:
  heartbeat_interval_secs: 2
  rpc_timeout_secs: 1
  conns_per_target: 2
tracer:
  name: gatelink
  disabled: false
logger:
  level: debug
  output: stdout
"#;

    let mut cfg: ClusterConfig = serde_yaml::from_str(yaml).expect("parse");
    cfg.validate_and_normalize().expect("valid");

    assert_eq!(cfg.gate.id.as_deref(), Some("gate-1"));
    assert_eq!(cfg.gate.name.as_deref(), Some("edge"));
    assert_eq!(cfg.gate.dispatch, Some(Dispatch::RoundRobin));
    assert_eq!(cfg.gate.metadata.get("region").map(String::as_str), Some("eu-1"));
    assert_eq!(cfg.node.name.as_deref(), Some("logic"));
    assert_eq!(cfg.transport.heartbeat_interval(), Duration::from_secs(2));
    assert_eq!(cfg.transport.rpc_timeout(), Duration::from_secs(1));
    assert_eq!(cfg.transport.conns_per_target(), 2);
    assert!(!cfg.tracer.disabled);
    assert_eq!(cfg.logger.as_ref().map(|l| l.level.as_str()), Some("debug"));
}

#[test]
fn invalid_values_rejected() {
    let mut cfg: ClusterConfig =
        serde_yaml::from_str("transport:\n  heartbeat_interval_secs: 0\n").expect("parse");
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg: ClusterConfig =
        serde_yaml::from_str("gate:\n  weight: -1\n").expect("parse");
    assert!(cfg.validate_and_normalize().is_err());
}
