// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Service-discovery port.
//!
//! The concrete backend (etcd, consul, nacos, …) lives outside this crate;
//! the core only registers itself, resolves peers by kind and watches for
//! topology changes. Instance fields are opaque strings to the core beyond
//! identity and endpoint resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::Result;

/// One registered cluster instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub alias: String,
    pub state: String,
    pub weight: i32,
    /// Dialable endpoint, `host:port`.
    pub endpoint: String,
    pub services: Vec<String>,
}

/// Stream of full snapshots for one instance kind.
pub type Watcher = mpsc::Receiver<Vec<ServiceInstance>>;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Registers or refreshes an instance (same id overwrites).
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()>;

    /// Current instances of a kind.
    async fn services(&self, kind: &str) -> Result<Vec<ServiceInstance>>;

    /// Watches a kind; each message is a full snapshot.
    async fn watch(&self, kind: &str) -> Result<Watcher>;
}
