// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use gatelink::{
    cluster::{Event, Hook, Kind, State},
    cluster::gate::{Gate, GateOptions},
    cluster::node::{Node, NodeOptions},
    transporter::{
        node::NodeClient,
        pool::{Pool, PoolOptions, Target},
    },
};

use crate::integration_tests::common::{MemoryRegistry, TestLocator, wait_for};

fn gate_options() -> GateOptions {
    GateOptions {
        id: "gate-1".to_owned(),
        addr: "127.0.0.1:0".to_owned(),
        heartbeat_interval: Duration::from_secs(1),
        ..GateOptions::default()
    }
}

fn node_options() -> NodeOptions {
    NodeOptions {
        id: "node-1".to_owned(),
        addr: "127.0.0.1:0".to_owned(),
        heartbeat_interval: Duration::from_secs(1),
        ..NodeOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn gate_lifecycle_tracks_registry_state() {
    let registry = MemoryRegistry::new();
    let gate = Gate::new(gate_options(), TestLocator::new(), registry.clone());

    let starts = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));

    let probe = starts.clone();
    gate.add_hook(Hook::Start, move || {
        probe.fetch_add(1, Ordering::AcqRel);
    });
    let probe = closes.clone();
    gate.add_hook(Hook::Close, move || {
        probe.fetch_add(1, Ordering::AcqRel);
    });
    let probe = destroys.clone();
    gate.add_hook(Hook::Destroy, move || {
        probe.fetch_add(1, Ordering::AcqRel);
    });

    gate.init();
    assert_eq!(gate.state(), State::Shut);

    gate.start().await.expect("start");
    assert_eq!(gate.state(), State::Work);
    assert_eq!(starts.load(Ordering::Acquire), 1);

    let instances = registry.snapshot(Kind::Gate.as_str());
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].id, "gate-1");
    assert_eq!(instances[0].state, "work");
    assert!(!instances[0].endpoint.is_empty());

    // Re-entrant start is a no-op.
    gate.start().await.expect("restart");
    assert_eq!(starts.load(Ordering::Acquire), 1);

    gate.close().await;
    assert_eq!(gate.state(), State::Hang);
    assert_eq!(closes.load(Ordering::Acquire), 1);
    assert_eq!(registry.snapshot(Kind::Gate.as_str())[0].state, "hang");

    // Close is idempotent once hung.
    gate.close().await;
    assert_eq!(closes.load(Ordering::Acquire), 1);

    gate.destroy().await;
    assert_eq!(gate.state(), State::Shut);
    assert_eq!(destroys.load(Ordering::Acquire), 1);
    assert!(registry.snapshot(Kind::Gate.as_str()).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn hooks_are_rejected_while_running() {
    let registry = MemoryRegistry::new();
    let gate = Gate::new(gate_options(), TestLocator::new(), registry);

    gate.start().await.expect("start");

    let fired = Arc::new(AtomicUsize::new(0));
    let probe = fired.clone();
    gate.add_hook(Hook::Start, move || {
        probe.fetch_add(1, Ordering::AcqRel);
    });

    // Destroy hooks may still be added while running.
    let probe = fired.clone();
    gate.add_hook(Hook::Destroy, move || {
        probe.fetch_add(1, Ordering::AcqRel);
    });

    gate.destroy().await;
    assert_eq!(fired.load(Ordering::Acquire), 1, "only the destroy hook may run");
}

#[tokio::test(flavor = "multi_thread")]
async fn node_dispatches_events_and_deliveries() {
    let registry = MemoryRegistry::new();
    let node = Node::new(node_options(), registry.clone());

    let events = Arc::new(Mutex::new(Vec::new()));
    let probe = events.clone();
    node.add_event_handler(Event::Connect, move |ctx| {
        if let Ok(mut seen) = probe.lock() {
            seen.push((ctx.gid.clone(), ctx.cid, ctx.uid));
        }
    });

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let probe = delivered.clone();
    node.set_deliver_handler(move |ctx| {
        if let Ok(mut seen) = probe.lock() {
            seen.push((ctx.gid.clone(), ctx.cid, ctx.uid, ctx.message.to_vec()));
        }
    });

    node.start().await.expect("start");

    let endpoint = registry.snapshot(Kind::Node.as_str())[0].endpoint.clone();
    let pool = Arc::new(Pool::new(
        Target::Direct(endpoint),
        None,
        PoolOptions::new(Kind::Gate, "gate-1"),
    ));
    let client = NodeClient::new(pool);

    client.trigger(Event::Connect, 4, 9).await.expect("trigger");
    let probe = events.clone();
    assert!(
        wait_for(Duration::from_secs(2), move || {
            probe
                .lock()
                .map(|seen| seen.contains(&("gate-1".to_owned(), 4, 9)))
                .unwrap_or(false)
        })
        .await
    );

    client.deliver(4, 9, &b"routed"[..]).await.expect("deliver");
    let probe = delivered.clone();
    assert!(
        wait_for(Duration::from_secs(2), move || {
            probe
                .lock()
                .map(|seen| {
                    seen.contains(&("gate-1".to_owned(), 4, 9, b"routed".to_vec()))
                })
                .unwrap_or(false)
        })
        .await
    );

    node.destroy().await;
    assert_eq!(node.state(), State::Shut);
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_target_resolves_through_registry() {
    let registry = MemoryRegistry::new();
    let node = Node::new(node_options(), registry.clone());
    node.start().await.expect("start");

    let pool = Arc::new(Pool::new(
        Target::Discovery(Kind::Node.as_str().to_owned()),
        Some(registry.clone()),
        PoolOptions::new(Kind::Gate, "gate-1"),
    ));
    let client = NodeClient::new(pool);

    let state = client.get_state().await.expect("get state");
    assert_eq!(state, State::Work);

    node.destroy().await;
}
