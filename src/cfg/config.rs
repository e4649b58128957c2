// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cluster::Dispatch;

/// Startup configuration of a cluster process. Every field is optional;
/// missing values fall back to the component defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Gate instance settings.
    #[serde(default)]
    pub gate: InstanceConfig,
    /// Logic-node instance settings.
    #[serde(default)]
    pub node: InstanceConfig,
    /// Cluster transport knobs shared by every peer link.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Distributed-tracing agent settings.
    #[serde(default)]
    pub tracer: TracerConfig,
    /// Logger settings; absent means stderr with the default filter.
    #[serde(default)]
    pub logger: Option<LogConfig>,
}

/// Per-instance identity and listen settings.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InstanceConfig {
    /// Stable instance id; a random one is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Cluster listen address, `host:port`; port 0 lets the OS pick.
    #[serde(default)]
    pub addr: Option<String>,
    /// Synchronous RPC deadline in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub weight: Option<i32>,
    /// Policy for choosing among equivalent peer instances.
    #[serde(default)]
    pub dispatch: Option<Dispatch>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InstanceConfig {
    /// Overlays the configured identity fields onto component defaults.
    pub fn apply(
        &self,
        id: &mut String,
        name: &mut String,
        addr: &mut String,
        weight: &mut i32,
    ) {
        if let Some(v) = &self.id {
            *id = v.clone();
        }
        if let Some(v) = &self.name {
            *name = v.clone();
        }
        if let Some(v) = &self.addr {
            *addr = v.clone();
        }
        if let Some(v) = self.weight {
            *weight = v;
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TransportConfig {
    /// Liveness probe interval in seconds; the deadline is twice this.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    /// Synchronous RPC deadline in seconds.
    #[serde(default)]
    pub rpc_timeout_secs: Option<u64>,
    /// Connections dialed per peer address.
    #[serde(default)]
    pub conns_per_target: Option<usize>,
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::transporter::DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::transporter::DEFAULT_RPC_TIMEOUT)
    }

    pub fn conns_per_target(&self) -> usize {
        self.conns_per_target.unwrap_or(1).max(1)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TracerConfig {
    /// Service name attached to exported spans.
    #[serde(default)]
    pub name: Option<String>,
    /// Collector endpoint; empty keeps the console reporter.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub disabled: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self { name: None, endpoint: None, disabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum RotationFreq {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogFileConfig {
    pub path: String,
    #[serde(default)]
    pub rotation_frequency: Option<RotationFreq>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// EnvFilter directive, e.g. `info` or `gatelink=debug`.
    pub level: String,
    pub output: Output,
    pub file: Option<LogFileConfig>,
}

impl ClusterConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ClusterConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if let Some(interval) = self.transport.heartbeat_interval_secs {
            ensure!(interval > 0, "transport.heartbeat_interval_secs must be > 0");
        }
        if let Some(timeout) = self.transport.rpc_timeout_secs {
            ensure!(timeout > 0, "transport.rpc_timeout_secs must be > 0");
        }
        if let Some(conns) = self.transport.conns_per_target {
            ensure!(conns >= 1, "transport.conns_per_target must be >= 1");
        }

        for (label, instance) in [("gate", &self.gate), ("node", &self.node)] {
            if let Some(weight) = instance.weight {
                ensure!(weight >= 0, "{label}.weight must be >= 0");
            }
            if let Some(timeout) = instance.timeout_secs {
                ensure!(timeout > 0, "{label}.timeout_secs must be > 0");
            }
        }

        Ok(())
    }
}
