// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, atomic::{AtomicUsize, Ordering}},
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use rand::RngExt;

use crate::{
    buffer::NocopyBuffer,
    cluster::{self, Dispatch},
    errors::{Error, Result},
    registry::Registry,
    transporter::client::{Client, ClientOptions},
};

/// Dial target: a fixed address or a service name resolved through the
/// registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Direct(String),
    Discovery(String),
}

impl Target {
    /// Parses `direct://host:port` or `discovery://service-name`.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(addr) = s.strip_prefix("direct://") {
            if addr.is_empty() {
                return Err(Error::InvalidArgument);
            }
            return Ok(Target::Direct(addr.to_owned()));
        }
        if let Some(name) = s.strip_prefix("discovery://") {
            if name.is_empty() {
                return Err(Error::InvalidArgument);
            }
            return Ok(Target::Discovery(name.to_owned()));
        }
        Err(Error::InvalidArgument)
    }
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub ins_kind: cluster::Kind,
    pub ins_id: String,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    /// Connections dialed per resolved address; sticky keys pick among them.
    pub conns_per_target: usize,
    pub dispatch: Dispatch,
}

impl PoolOptions {
    pub fn new(ins_kind: cluster::Kind, ins_id: impl Into<String>) -> Self {
        Self {
            ins_kind,
            ins_id: ins_id.into(),
            heartbeat_interval: crate::transporter::DEFAULT_HEARTBEAT_INTERVAL,
            rpc_timeout: crate::transporter::DEFAULT_RPC_TIMEOUT,
            conns_per_target: 1,
            dispatch: Dispatch::Random,
        }
    }
}

/// Keeps peer connections per resolved address, dialing on demand.
///
/// Dead connections are evicted lazily the next time the address is
/// fetched; the replacement is dialed in place. Sticky keys map to a fixed
/// slot so ordered fire-and-forget writes to the same key share a socket.
pub struct Pool {
    target: Target,
    registry: Option<Arc<dyn Registry>>,
    opts: PoolOptions,
    conns: DashMap<String, Vec<Arc<Client>>>,
    rr: AtomicUsize,
}

impl Pool {
    pub fn new(
        target: Target,
        registry: Option<Arc<dyn Registry>>,
        opts: PoolOptions,
    ) -> Self {
        Self {
            target,
            registry,
            opts,
            conns: DashMap::new(),
            rr: AtomicUsize::new(0),
        }
    }

    /// Synchronous RPC through a pooled connection. A connection that died
    /// under the call surfaces `ConnectionClosed`; the dead entry is
    /// evicted on the next fetch.
    pub async fn call(&self, seq: u64, buf: NocopyBuffer) -> Result<Bytes> {
        let client = self.fetch(None).await?;
        client.call(seq, buf).await
    }

    /// Fire-and-forget through a pooled connection, sticky when a key is
    /// given.
    pub async fn send(&self, buf: NocopyBuffer, sticky_key: Option<i64>) -> Result<()> {
        let client = self.fetch(sticky_key).await?;
        client.send(buf).await
    }

    /// Resolves the target, prunes dead connections and returns a live one,
    /// dialing replacements as needed.
    pub async fn fetch(&self, sticky_key: Option<i64>) -> Result<Arc<Client>> {
        let addr = self.resolve().await?;
        let wanted = self.opts.conns_per_target.max(1);

        loop {
            let live: Vec<Arc<Client>> = {
                let mut entry = self.conns.entry(addr.clone()).or_default();
                entry.retain(|c| c.is_open());
                entry.clone()
            };

            if live.len() >= wanted {
                let index = match sticky_key {
                    Some(key) => key.unsigned_abs() as usize % live.len(),
                    None => self.rr.fetch_add(1, Ordering::Relaxed) % live.len(),
                };
                return Ok(Arc::clone(&live[index]));
            }

            let client = Client::dial(ClientOptions {
                addr: addr.clone(),
                ins_kind: self.opts.ins_kind,
                ins_id: self.opts.ins_id.clone(),
                heartbeat_interval: self.opts.heartbeat_interval,
                rpc_timeout: self.opts.rpc_timeout,
            })
            .await?;

            // A concurrent fetch may have filled the slot meanwhile; the
            // surplus dial is closed instead of leaking its workers.
            let mut entry = self.conns.entry(addr.clone()).or_default();
            if entry.iter().filter(|c| c.is_open()).count() < wanted {
                entry.push(client);
            } else {
                client.close();
            }
        }
    }

    /// Picks a dialable address for the target, consulting the registry for
    /// discovery targets.
    async fn resolve(&self) -> Result<String> {
        match &self.target {
            Target::Direct(addr) => Ok(addr.clone()),
            Target::Discovery(name) => {
                let registry = self.registry.as_ref().ok_or(Error::MissTransporter)?;

                let mut instances = registry.services(name).await?;
                instances.retain(|ins| {
                    ins.state == cluster::State::Work.as_str() && !ins.endpoint.is_empty()
                });

                if instances.is_empty() {
                    tracing::warn!(service = %name, "no working instance to dial");
                    return Err(Error::InternalError);
                }

                let picked = match self.opts.dispatch {
                    Dispatch::Random => {
                        let i = rand::rng().random_range(0..instances.len());
                        &instances[i]
                    },
                    Dispatch::RoundRobin => {
                        let i = self.rr.fetch_add(1, Ordering::Relaxed) % instances.len();
                        &instances[i]
                    },
                    Dispatch::WeightRandom => {
                        let total: i64 =
                            instances.iter().map(|i| i.weight.max(1) as i64).sum();
                        let mut roll = rand::rng().random_range(0..total);
                        let mut chosen = &instances[0];
                        for ins in &instances {
                            roll -= ins.weight.max(1) as i64;
                            if roll < 0 {
                                chosen = ins;
                                break;
                            }
                        }
                        chosen
                    },
                };

                Ok(picked.endpoint.clone())
            },
        }
    }

    /// Drops every connection; the next fetch redials.
    pub fn close(&self) {
        let addrs: Vec<String> = self.conns.iter().map(|e| e.key().clone()).collect();
        for addr in addrs {
            if let Some((_, clients)) = self.conns.remove(&addr) {
                for client in clients {
                    client.close();
                }
            }
        }
    }
}
