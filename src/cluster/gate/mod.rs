// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The gate component: terminates end-user connections, answers cluster
//! RPCs against the session registry, and keeps the locator informed about
//! user ownership.

pub mod provider;

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::ClusterConfig,
    cluster::{Dispatch, Hook, Kind, State},
    errors::Result,
    locate::Locator,
    registry::{Registry, ServiceInstance},
    session::Session,
    transporter::{
        gate::{GateProvider, GateServer},
        server::{Server, ServerOptions},
    },
    utils::random_instance_id,
};

pub use provider::GateLocalProvider;

type HookFn = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct GateOptions {
    pub id: String,
    pub name: String,
    pub addr: String,
    pub timeout: Duration,
    pub weight: i32,
    pub dispatch: Dispatch,
    pub metadata: HashMap<String, String>,
    pub heartbeat_interval: Duration,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            id: random_instance_id(),
            name: "gate".to_owned(),
            addr: "0.0.0.0:0".to_owned(),
            timeout: crate::transporter::DEFAULT_RPC_TIMEOUT,
            weight: 1,
            dispatch: Dispatch::Random,
            metadata: HashMap::new(),
            heartbeat_interval: crate::transporter::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl GateOptions {
    pub fn from_config(cfg: &ClusterConfig) -> Self {
        let mut opts = Self::default();
        cfg.gate.apply(&mut opts.id, &mut opts.name, &mut opts.addr, &mut opts.weight);
        if let Some(timeout) = cfg.gate.timeout() {
            opts.timeout = timeout;
        }
        if let Some(dispatch) = cfg.gate.dispatch {
            opts.dispatch = dispatch;
        }
        opts.metadata = cfg.gate.metadata.clone();
        opts.heartbeat_interval = cfg.transport.heartbeat_interval();
        opts
    }
}

/// Lifecycle shell around the session registry and the gate RPC server.
///
/// `init → start → close → destroy`: start CASes Shut→Work and is a no-op
/// on re-entry; close advertises Hang through the registry; destroy
/// deregisters, stops the transport and cancels the root token.
pub struct Gate {
    opts: GateOptions,
    state: Arc<AtomicI32>,
    session: Arc<Session>,
    provider: Arc<GateLocalProvider>,
    registry: Arc<dyn Registry>,
    server: OnceCell<Server<GateServer>>,
    instance: RwLock<Option<ServiceInstance>>,
    hooks: RwLock<HashMap<Hook, Vec<HookFn>>>,
    /// Known logic-node instances, refreshed by the registry watcher.
    peers: Arc<DashMap<String, ServiceInstance>>,
    cancel: CancellationToken,
}

impl Gate {
    pub fn new(
        opts: GateOptions,
        locator: Arc<dyn Locator>,
        registry: Arc<dyn Registry>,
    ) -> Arc<Self> {
        let state = Arc::new(AtomicI32::new(State::Shut as i32));
        let session = Arc::new(Session::new());
        let provider = Arc::new(GateLocalProvider::new(
            opts.id.clone(),
            Arc::clone(&state),
            Arc::clone(&session),
            locator,
        ));

        Arc::new(Self {
            opts,
            state,
            session,
            provider,
            registry,
            server: OnceCell::new(),
            instance: RwLock::new(None),
            hooks: RwLock::new(HashMap::new()),
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

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn provider(&self) -> &Arc<GateLocalProvider> {
        &self.provider
    }

    pub fn state(&self) -> State {
        State::try_from(self.state.load(Ordering::Acquire) as u8).unwrap_or(State::Shut)
    }

    /// Known logic-node instances from the last registry snapshot.
    pub fn peers(&self) -> Vec<ServiceInstance> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    /// Registers a lifecycle hook. Destroy hooks may be added at any time;
    /// the others only before start.
    pub fn add_hook(&self, hook: Hook, f: impl Fn() + Send + Sync + 'static) {
        if hook != Hook::Destroy && self.state() != State::Shut {
            tracing::warn!(?hook, "gate is running, hook ignored");
            return;
        }

        if let Ok(mut hooks) = self.hooks.write() {
            hooks.entry(hook).or_default().push(Box::new(f));
        }
    }

    /// Runs the init hooks. Dependencies are injected by construction, so
    /// there is nothing else to verify here.
    pub fn init(&self) {
        self.run_hooks(Hook::Init);
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state.swap(State::Work as i32, Ordering::AcqRel) != State::Shut as i32 {
            return Ok(());
        }

        let provider: Arc<dyn GateProvider> = Arc::clone(&self.provider) as Arc<dyn GateProvider>;
        let server = Server::bind(
            ServerOptions {
                addr: self.opts.addr.clone(),
                heartbeat_interval: self.opts.heartbeat_interval,
            },
            GateServer::new(provider),
        )
        .await?;
        server.start().await;
        let endpoint = server.local_addr().to_string();
        let _ = self.server.set(server);

        self.register_instance(endpoint).await?;

        self.watch_peers().await;

        tracing::info!(
            id = %self.opts.id,
            name = %self.opts.name,
            addr = %self.opts.addr,
            "gate is running",
        );

        self.run_hooks(Hook::Start);

        Ok(())
    }

    /// Flips to Hang and re-advertises the state so dispatchers drain us.
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

    async fn register_instance(&self, endpoint: String) -> Result<()> {
        let instance = ServiceInstance {
            id: self.opts.id.clone(),
            kind: Kind::Gate.as_str().to_owned(),
            name: Kind::Gate.as_str().to_owned(),
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
            tracing::error!("refresh gate instance failed: {e}");
        }
    }

    async fn deregister_instance(&self) {
        let instance = {
            let Ok(slot) = self.instance.read() else { return };
            slot.clone()
        };

        if let Some(instance) = instance {
            if let Err(e) = self.registry.deregister(&instance).await {
                tracing::error!("deregister gate instance failed: {e}");
            }
        }
    }

    /// Keeps a snapshot of live logic nodes for dispatch decisions.
    async fn watch_peers(self: &Arc<Self>) {
        let watcher = match self.registry.watch(Kind::Node.as_str()).await {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::warn!("watch node instances failed: {e}");
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

    fn run_hooks(&self, hook: Hook) {
        let Ok(hooks) = self.hooks.read() else { return };

        if let Some(handlers) = hooks.get(&hook) {
            for handler in handlers {
                handler();
            }
        }
    }
}
