// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::IpAddr,
    sync::{Arc, atomic::{AtomicI32, Ordering}},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    cluster::State,
    errors::{Error, Result},
    locate::Locator,
    session::{Kind, Session},
    transporter::gate::GateProvider,
};

/// Adaptor between incoming gate RPCs and the session registry.
///
/// Local session state is authoritative for membership; the locator is the
/// cluster-wide authority for user → gate ownership and is kept in sync on
/// bind/unbind. Subscriptions are named channels layered over a reserved
/// (negative) group-id space.
pub struct GateLocalProvider {
    gate_id: String,
    state: Arc<AtomicI32>,
    session: Arc<Session>,
    locator: Arc<dyn Locator>,
}

impl GateLocalProvider {
    pub fn new(
        gate_id: String,
        state: Arc<AtomicI32>,
        session: Arc<Session>,
        locator: Arc<dyn Locator>,
    ) -> Self {
        Self { gate_id, state, session, locator }
    }

    /// Maps a channel name into the reserved group-id space. Channel groups
    /// are negative so they can never collide with application groups.
    pub fn channel_group(channel: &str) -> i64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in channel.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        -(((hash >> 1) as i64).max(1))
    }

    /// Resolves the connection behind a subscribe/unsubscribe target.
    fn subscriber_cid(&self, kind: Kind, target: i64) -> Result<i64> {
        match kind {
            Kind::Conn => Ok(target),
            Kind::User => self.session.conn_id(Kind::User, target),
            Kind::Group => Err(Error::InvalidSessionKind),
        }
    }
}

#[async_trait]
impl GateProvider for GateLocalProvider {
    /// Binds locally first, then announces ownership; a locator failure
    /// reverts the local bind.
    async fn bind(&self, cid: i64, uid: i64) -> Result<()> {
        if cid <= 0 || uid <= 0 {
            return Err(Error::InvalidArgument);
        }

        let displaced = self.session.bind(cid, uid)?;
        if let Some(prior) = displaced {
            let _ = prior.close(true);
        }

        if let Err(e) = self.locator.bind_gate(uid, &self.gate_id).await {
            let _ = self.session.unbind(uid);
            return Err(e);
        }

        Ok(())
    }

    async fn unbind(&self, uid: i64) -> Result<()> {
        if uid == 0 {
            return Err(Error::InvalidArgument);
        }

        self.session.unbind(uid)?;

        self.locator.unbind_gate(uid, &self.gate_id).await
    }

    async fn bind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        if cid <= 0 {
            return Err(Error::InvalidArgument);
        }

        self.session.bind_groups(cid, groups)
    }

    async fn unbind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        if cid <= 0 {
            return Err(Error::InvalidArgument);
        }

        self.session.unbind_groups(cid, groups)
    }

    async fn get_ip(&self, kind: Kind, target: i64) -> Result<IpAddr> {
        self.session.remote_ip(kind, target)
    }

    async fn is_online(&self, kind: Kind, target: i64) -> Result<bool> {
        self.session.has(kind, target)
    }

    async fn stat(&self, kind: Kind) -> Result<i64> {
        self.session.stat(kind)
    }

    async fn disconnect(&self, kind: Kind, target: i64, force: bool) -> Result<()> {
        self.session.close(kind, target, force)
    }

    /// Pushes to the session; a user miss also retracts the stale
    /// `uid → gate` mapping from the locator in the background.
    async fn push(&self, kind: Kind, target: i64, message: Bytes) -> Result<()> {
        let res = self.session.push(kind, target, &message);

        if kind == Kind::User && matches!(&res, Err(Error::NotFoundSession)) {
            let locator = Arc::clone(&self.locator);
            let gate_id = self.gate_id.clone();
            tokio::spawn(async move {
                if let Err(e) = locator.unbind_gate(target, &gate_id).await {
                    tracing::error!(
                        uid = target,
                        gid = %gate_id,
                        "unbind gate failed: {e}",
                    );
                }
            });
        }

        res
    }

    async fn multicast(&self, kind: Kind, targets: &[i64], message: Bytes) -> Result<i64> {
        self.session.multicast(kind, targets, &message)
    }

    async fn broadcast(&self, kind: Kind, message: Bytes) -> Result<i64> {
        self.session.broadcast(kind, &message)
    }

    /// Publishes to a channel: a multicast over the channel's group.
    async fn publish(&self, channel: &str, message: Bytes) -> Result<i64> {
        if channel.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let gid = Self::channel_group(channel);
        self.session.multicast(Kind::Group, &[gid], &message)
    }

    /// Subscribes targets to a channel. Targets that disconnected since the
    /// caller resolved them are skipped.
    async fn subscribe(&self, kind: Kind, targets: &[i64], channel: &str) -> Result<()> {
        if channel.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let gid = Self::channel_group(channel);
        for target in targets {
            let cid = match self.subscriber_cid(kind, *target) {
                Ok(cid) => cid,
                Err(Error::NotFoundSession) => continue,
                Err(e) => return Err(e),
            };
            match self.session.bind_groups(cid, &[gid]) {
                Ok(()) | Err(Error::NotFoundSession) => {},
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn unsubscribe(&self, kind: Kind, targets: &[i64], channel: &str) -> Result<()> {
        if channel.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let gid = Self::channel_group(channel);
        for target in targets {
            let cid = match self.subscriber_cid(kind, *target) {
                Ok(cid) => cid,
                Err(Error::NotFoundSession) => continue,
                Err(e) => return Err(e),
            };
            match self.session.unbind_groups(cid, &[gid]) {
                Ok(()) | Err(Error::NotFoundSession) => {},
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn get_state(&self) -> Result<State> {
        Ok(State::try_from(self.state.load(Ordering::Acquire) as u8)
            .unwrap_or(State::Shut))
    }

    async fn set_state(&self, state: State) -> Result<()> {
        self.state.store(state as i32, Ordering::Release);
        Ok(())
    }
}
