// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Duration,
};

use std::collections::HashMap;

use async_trait::async_trait;
use gatelink::{
    cluster,
    errors::{Error, Result},
    locate::{LocateEvent, Locator, Watcher},
    network::{ConnGroup, NetConn},
    registry::{Registry, ServiceInstance},
};
use tokio::sync::mpsc;

/// In-memory stand-in for a user connection.
#[derive(Default, Debug)]
pub struct TestConn {
    pub cid: i64,
    pub uid: AtomicI64,
    pub groups: ConnGroup,
    pub pushed: Mutex<Vec<Vec<u8>>>,
    pub closed: AtomicBool,
}

impl TestConn {
    pub fn new(cid: i64) -> Arc<Self> {
        Arc::new(Self { cid, ..Default::default() })
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl NetConn for TestConn {
    fn id(&self) -> i64 {
        self.cid
    }

    fn uid(&self) -> i64 {
        self.uid.load(Ordering::Acquire)
    }

    fn bind(&self, uid: i64) {
        self.uid.store(uid, Ordering::Release);
    }

    fn unbind(&self) {
        self.uid.store(0, Ordering::Release);
    }

    fn groups(&self) -> Vec<i64> {
        self.groups.groups()
    }

    fn bind_group(&self, gid: i64) {
        self.groups.bind(gid);
    }

    fn unbind_group(&self, gid: i64) {
        self.groups.unbind(gid);
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.push(msg)
    }

    fn push(&self, msg: &[u8]) -> Result<()> {
        self.pushed
            .lock()
            .map_err(|_| Error::InternalError)?
            .push(msg.to_vec());
        Ok(())
    }

    fn close(&self, _force: bool) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn local_ip(&self) -> Result<IpAddr> {
        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }

    fn remote_ip(&self) -> Result<IpAddr> {
        Ok(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 4321))
    }
}

/// Locator recording bind/unbind calls, optionally slow or failing.
#[derive(Default)]
pub struct TestLocator {
    pub bound: Mutex<Vec<(i64, String)>>,
    pub unbound: Mutex<Vec<(i64, String)>>,
    pub delay: Option<Duration>,
    pub fail_bind: bool,
}

impl TestLocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay: Some(delay), ..Default::default() })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail_bind: true, ..Default::default() })
    }
}

#[async_trait]
impl Locator for TestLocator {
    async fn bind_gate(&self, uid: i64, gid: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_bind {
            return Err(Error::InternalError);
        }
        self.bound
            .lock()
            .map_err(|_| Error::InternalError)?
            .push((uid, gid.to_owned()));
        Ok(())
    }

    async fn unbind_gate(&self, uid: i64, gid: &str) -> Result<()> {
        self.unbound
            .lock()
            .map_err(|_| Error::InternalError)?
            .push((uid, gid.to_owned()));
        Ok(())
    }

    async fn locate_gate(&self, uid: i64) -> Result<String> {
        let bound = self.bound.lock().map_err(|_| Error::InternalError)?;
        bound
            .iter()
            .rev()
            .find(|(bound_uid, _)| *bound_uid == uid)
            .map(|(_, gid)| gid.clone())
            .ok_or(Error::NotFoundUserLocation)
    }

    async fn watch(&self, _kinds: &[cluster::Kind]) -> Result<Watcher> {
        let (_tx, rx) = mpsc::channel::<LocateEvent>(1);
        Ok(rx)
    }
}

/// In-memory service registry with snapshot watchers.
#[derive(Default)]
pub struct MemoryRegistry {
    instances: Mutex<HashMap<String, HashMap<String, ServiceInstance>>>,
    watchers: Mutex<Vec<(String, mpsc::Sender<Vec<ServiceInstance>>)>>,
}

impl MemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self, kind: &str) -> Vec<ServiceInstance> {
        self.instances
            .lock()
            .ok()
            .and_then(|m| m.get(kind).map(|k| k.values().cloned().collect()))
            .unwrap_or_default()
    }

    fn notify(&self, kind: &str) {
        let snapshot = self.snapshot(kind);
        if let Ok(watchers) = self.watchers.lock() {
            for (watched, tx) in watchers.iter() {
                if watched == kind {
                    let _ = tx.try_send(snapshot.clone());
                }
            }
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        self.instances
            .lock()
            .map_err(|_| Error::InternalError)?
            .entry(instance.kind.clone())
            .or_default()
            .insert(instance.id.clone(), instance.clone());
        self.notify(&instance.kind);
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        if let Some(by_id) = self
            .instances
            .lock()
            .map_err(|_| Error::InternalError)?
            .get_mut(&instance.kind)
        {
            by_id.remove(&instance.id);
        }
        self.notify(&instance.kind);
        Ok(())
    }

    async fn services(&self, kind: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self.snapshot(kind))
    }

    async fn watch(&self, kind: &str) -> Result<mpsc::Receiver<Vec<ServiceInstance>>> {
        let (tx, rx) = mpsc::channel(16);
        let _ = tx.try_send(self.snapshot(kind));
        self.watchers
            .lock()
            .map_err(|_| Error::InternalError)?
            .push((kind.to_owned(), tx));
        Ok(rx)
    }
}

/// Polls until `check` passes or the deadline elapses.
pub async fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
