// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Port to the end-user network layer.
//!
//! The accept loop (WebSocket or raw TCP) lives outside this crate; the
//! gate consumes its connections through [`NetConn`]. Implementations are
//! expected to keep `push` non-blocking: it enqueues on the connection's
//! bounded outgoing queue, and a full queue is grounds for closing that
//! user connection, never for stalling the session registry.

use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    sync::RwLock,
};

use crate::errors::Result;

/// A single end-user connection held by a gate.
///
/// Identity methods use interior mutability: `bind`/`unbind` and the group
/// operations are called under the session registry's lock and must not
/// block.
pub trait NetConn: Send + Sync + std::fmt::Debug {
    /// Stable connection id, unique within the gate.
    fn id(&self) -> i64;

    /// Bound user id, 0 when unbound.
    fn uid(&self) -> i64;

    fn bind(&self, uid: i64);

    fn unbind(&self);

    fn groups(&self) -> Vec<i64>;

    fn bind_group(&self, gid: i64);

    fn unbind_group(&self, gid: i64);

    /// Synchronous write; may block on the underlying socket.
    fn send(&self, msg: &[u8]) -> Result<()>;

    /// Asynchronous write; enqueues on the outgoing queue and returns.
    fn push(&self, msg: &[u8]) -> Result<()>;

    fn close(&self, force: bool) -> Result<()>;

    fn local_ip(&self) -> Result<IpAddr>;

    fn local_addr(&self) -> Result<SocketAddr>;

    fn remote_ip(&self) -> Result<IpAddr>;

    fn remote_addr(&self) -> Result<SocketAddr>;
}

/// Group membership helper for [`NetConn`] implementations.
#[derive(Debug, Default)]
pub struct ConnGroup {
    groups: RwLock<HashSet<i64>>,
}

impl ConnGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> Vec<i64> {
        self.groups
            .read()
            .map(|g| g.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has(&self, gid: i64) -> bool {
        self.groups.read().map(|g| g.contains(&gid)).unwrap_or(false)
    }

    pub fn bind(&self, gid: i64) {
        if let Ok(mut g) = self.groups.write() {
            g.insert(gid);
        }
    }

    pub fn unbind(&self, gid: i64) {
        if let Ok(mut g) = self.groups.write() {
            g.remove(&gid);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
