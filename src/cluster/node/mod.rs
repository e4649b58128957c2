// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The logic-node component: lifecycle state machine, registry
//! integration, and the event/deliver dispatch gates feed through RPC.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::ClusterConfig,
    cluster::{Dispatch, Event, Hook, Kind, State},
    errors::{Error, Result},
    registry::{Registry, ServiceInstance},
    transporter::{
        node::{NodeProvider, NodeServer},
        server::{Server, ServerOptions},
    },
    utils::random_instance_id,
};

/// Bound of the queued-event channel between RPC dispatch and the worker.
const EVENT_QUEUE_SIZE: usize = 4096;

type HookFn = Box<dyn Fn() + Send + Sync>;

/// A connection event reported by a gate.
#[derive(Debug, Clone)]
pub struct EventCtx {
    pub event: Event,
    pub gid: String,
    pub cid: i64,
    pub uid: i64,
}

pub type EventHandler = Box<dyn Fn(&EventCtx) + Send + Sync>;

/// A user message routed to this node.
#[derive(Debug, Clone)]
pub struct DeliverCtx {
    pub gid: String,
    pub nid: String,
    pub cid: i64,
    pub uid: i64,
    pub message: Bytes,
}

pub type DeliverHandler = Box<dyn Fn(&DeliverCtx) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub id: String,
    pub name: String,
    pub addr: String,
    pub timeout: Duration,
    pub weight: i32,
    pub dispatch: Dispatch,
    pub metadata: HashMap<String, String>,
    pub heartbeat_interval: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            id: random_instance_id(),
            name: "node".to_owned(),
            addr: "0.0.0.0:0".to_owned(),
            timeout: crate::transporter::DEFAULT_RPC_TIMEOUT,
            weight: 1,
            dispatch: Dispatch::Random,
            metadata: HashMap::new(),
            heartbeat_interval: crate::transporter::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl NodeOptions {
    pub fn from_config(cfg: &ClusterConfig) -> Self {
        let mut opts = Self::default();
        cfg.node.apply(&mut opts.id, &mut opts.name, &mut opts.addr, &mut opts.weight);
        if let Some(timeout) = cfg.node.timeout() {
            opts.timeout = timeout;
        }
        if let Some(dispatch) = cfg.node.dispatch {
            opts.dispatch = dispatch;
        }
        opts.metadata = cfg.node.metadata.clone();
        opts.heartbeat_interval = cfg.transport.heartbeat_interval();
        opts
    }
}

/// Lifecycle shell around the node RPC server and its handler tables.
pub struct Node {
    opts: NodeOptions,
    state: Arc<AtomicI32>,
    registry: Arc<dyn Registry>,
    provider: Arc<NodeLocalProvider>,
    server: OnceCell<Server<NodeServer>>,
    instance: RwLock<Option<ServiceInstance>>,
    hooks: RwLock<HashMap<Hook, Vec<HookFn>>>,
    events: Arc<RwLock<HashMap<Event, EventHandler>>>,
    event_rx: Mutex<Option<mpsc::Receiver<EventCtx>>>,
    /// Known gate instances, refreshed by the registry watcher.
    peers: Arc<DashMap<String, ServiceInstance>>,
    cancel: CancellationToken,
}

impl Node {
    pub fn new(opts: NodeOptions, registry: Arc<dyn Registry>) -> Arc<Self> {
        let state = Arc::new(AtomicI32::new(State::Shut as i32));
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let provider = Arc::new(NodeLocalProvider {
            state: Arc::clone(&state),
            event_tx,
            deliver: RwLock::new(None),
        });

        Arc::new(Self {
            opts,
            state,
            registry,
            provider,
            server: OnceCell::new(),
            instance: RwLock::new(None),
            hooks: RwLock::new(HashMap::new()),
            events: Arc::new(RwLock::new(HashMap::new())),
            event_rx: Mutex::new(Some(event_rx)),
            peers: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.opts.name
    }

    pub fn id(&self) -> &str {
        &self.opts.id
    }

    pub fn provider(&self) -> &Arc<NodeLocalProvider> {
        &self.provider
    }

    pub fn state(&self) -> State {
        State::try_from(self.state.load(Ordering::Acquire) as u8).unwrap_or(State::Shut)
    }

    /// Registers a handler for a connection event. Only accepted while the
    /// node is Shut.
    pub fn add_event_handler(&self, event: Event, f: impl Fn(&EventCtx) + Send + Sync + 'static) {
        if self.state() != State::Shut {
            tracing::warn!(%event, "the node server is working, can't add event handler");
            return;
        }

        if let Ok(mut events) = self.events.write() {
            events.insert(event, Box::new(f));
        }
    }

    /// Registers the deliver handler. Only accepted while the node is Shut.
    pub fn set_deliver_handler(&self, f: impl Fn(&DeliverCtx) + Send + Sync + 'static) {
        if self.state() != State::Shut {
            tracing::warn!("the node server is working, can't set deliver handler");
            return;
        }

        if let Ok(mut deliver) = self.provider.deliver.write() {
            *deliver = Some(Box::new(f));
        }
    }

    /// Registers a lifecycle hook. Destroy hooks may be added at any time;
    /// the others only before start.
    pub fn add_hook(&self, hook: Hook, f: impl Fn() + Send + Sync + 'static) {
        if hook != Hook::Destroy && self.state() != State::Shut {
            tracing::warn!(?hook, "node is running, hook ignored");
            return;
        }

        if let Ok(mut hooks) = self.hooks.write() {
            hooks.entry(hook).or_default().push(Box::new(f));
        }
    }

    pub fn init(&self) {
        self.run_hooks(Hook::Init);
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state.swap(State::Work as i32, Ordering::AcqRel) != State::Shut as i32 {
            return Ok(());
        }

        let provider: Arc<dyn NodeProvider> = Arc::clone(&self.provider) as Arc<dyn NodeProvider>;
        let server = Server::bind(
            ServerOptions {
                addr: self.opts.addr.clone(),
                heartbeat_interval: self.opts.heartbeat_interval,
            },
            NodeServer::new(provider),
        )
        .await?;
        server.start().await;
        let endpoint = server.local_addr().to_string();
        let _ = self.server.set(server);

        self.spawn_event_worker().await;

        self.register_instance(endpoint).await?;

        self.watch_peers().await;

        tracing::info!(
            id = %self.opts.id,
            name = %self.opts.name,
            addr = %self.opts.addr,
            "node is running",
        );

        self.run_hooks(Hook::Start);

        Ok(())
    }

    pub async fn close(&self) {
        let flipped = self
            .state
            .compare_exchange(
                State::Work as i32,
                State::Hang as i32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            || self
                .state
                .compare_exchange(
                    State::Busy as i32,
                    State::Hang as i32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        if !flipped {
            return;
        }

        self.refresh_instance().await;

        self.run_hooks(Hook::Close);
    }

    pub async fn destroy(&self) {
        if self.state.swap(State::Shut as i32, Ordering::AcqRel) == State::Shut as i32 {
            return;
        }

        self.run_hooks(Hook::Destroy);

        self.deregister_instance().await;

        if let Some(server) = self.server.get() {
            server.stop();
        }

        self.cancel.cancel();
    }

    /// Known gate instances from the last registry snapshot.
    pub fn peers(&self) -> Vec<ServiceInstance> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    /// Keeps a snapshot of live gates for dispatch decisions.
    async fn watch_peers(&self) {
        let watcher = match self.registry.watch(Kind::Gate.as_str()).await {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::warn!("watch gate instances failed: {e}");
                return;
            },
        };

        let peers = Arc::clone(&self.peers);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut watcher = watcher;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    snapshot = watcher.recv() => {
                        let Some(instances) = snapshot else { return };
                        peers.clear();
                        for instance in instances {
                            peers.insert(instance.id.clone(), instance);
                        }
                    },
                }
            }
        });
    }

    /// Drains the event queue onto the registered handlers.
    async fn spawn_event_worker(&self) {
        let Some(mut event_rx) = self.event_rx.lock().await.take() else {
            return;
        };

        let events = Arc::clone(&self.events);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    received = event_rx.recv() => {
                        let Some(ctx) = received else { return };

                        let Ok(handlers) = events.read() else { continue };
                        if let Some(handler) = handlers.get(&ctx.event) {
                            handler(&ctx);
                        }
                    },
                }
            }
        });
    }

    async fn register_instance(&self, endpoint: String) -> Result<()> {
        let instance = ServiceInstance {
            id: self.opts.id.clone(),
            kind: Kind::Node.as_str().to_owned(),
            name: Kind::Node.as_str().to_owned(),
            alias: self.opts.name.clone(),
            state: self.state().as_str().to_owned(),
            weight: self.opts.weight,
            endpoint,
            services: Vec::new(),
        };

        self.registry.register(&instance).await?;

        if let Ok(mut slot) = self.instance.write() {
            *slot = Some(instance);
        }

        Ok(())
    }

    async fn refresh_instance(&self) {
        let instance = {
            let Ok(mut slot) = self.instance.write() else { return };
            let Some(instance) = slot.as_mut() else { return };
            instance.state = self.state().as_str().to_owned();
            instance.clone()
        };

        if let Err(e) = self.registry.register(&instance).await {
            tracing::error!("refresh node instance failed: {e}");
        }
    }

    async fn deregister_instance(&self) {
        let instance = {
            let Ok(slot) = self.instance.read() else { return };
            slot.clone()
        };

        if let Some(instance) = instance {
            if let Err(e) = self.registry.deregister(&instance).await {
                tracing::error!("deregister node instance failed: {e}");
            }
        }
    }

    fn run_hooks(&self, hook: Hook) {
        let Ok(hooks) = self.hooks.read() else { return };

        if let Some(handlers) = hooks.get(&hook) {
            for handler in handlers {
                handler();
            }
        }
    }
}

/// RPC-facing provider of a node: queues events for the worker, hands
/// deliveries to the registered handler, exposes the lifecycle state.
pub struct NodeLocalProvider {
    state: Arc<AtomicI32>,
    event_tx: mpsc::Sender<EventCtx>,
    deliver: RwLock<Option<DeliverHandler>>,
}

#[async_trait]
impl NodeProvider for NodeLocalProvider {
    async fn trigger(&self, gid: &str, event: Event, cid: i64, uid: i64) -> Result<()> {
        let ctx = EventCtx { event, gid: gid.to_owned(), cid, uid };

        self.event_tx
            .send(ctx)
            .await
            .map_err(|_| Error::IllegalOperation)
    }

    async fn deliver(
        &self,
        gid: &str,
        nid: &str,
        cid: i64,
        uid: i64,
        message: Bytes,
    ) -> Result<()> {
        let ctx = DeliverCtx {
            gid: gid.to_owned(),
            nid: nid.to_owned(),
            cid,
            uid,
            message,
        };

        let Ok(deliver) = self.deliver.read() else {
            return Err(Error::InternalError);
        };
        match deliver.as_ref() {
            Some(handler) => {
                handler(&ctx);
                Ok(())
            },
            None => Err(Error::IllegalOperation),
        }
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
