// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cluster RPC runtime: long-lived multiplexed TCP links between peers.
//!
//! A peer link carries pipelined request/response frames correlated by a
//! 64-bit sequence number, fire-and-forget frames with `seq = 0`, and
//! heartbeats. Servers identify peers through a mandatory handshake before
//! dispatching anything else.

pub mod client;
pub mod conn;
pub mod gate;
pub mod node;
pub mod pool;
pub mod server;

use std::time::Duration;

/// Default liveness probe interval; the deadline is twice this.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Default synchronous-call deadline.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound of the per-connection inbound frame queue. A full queue applies
/// backpressure on the reader rather than dropping frames.
pub const INBOUND_QUEUE_SIZE: usize = 10240;

pub(crate) const CONN_OPENED: i32 = 1;
pub(crate) const CONN_CLOSED: i32 = 2;
