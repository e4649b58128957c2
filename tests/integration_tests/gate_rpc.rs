// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, atomic::AtomicI32},
    time::Duration,
};

use bytes::Bytes;
use gatelink::{
    buffer::NocopyBuffer,
    cluster::{Kind, State},
    cluster::gate::GateLocalProvider,
    errors::Error,
    network::NetConn,
    session::{self, Session},
    transporter::{
        gate::{GateClient, GateProvider, GateServer},
        pool::{Pool, PoolOptions, Target},
        server::{Server, ServerOptions},
    },
};

use crate::integration_tests::common::{TestConn, TestLocator, wait_for};

fn message(text: &str) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::copy_from_slice(text.as_bytes()));
    buf
}

struct Fixture {
    session: Arc<Session>,
    locator: Arc<TestLocator>,
    server: Server<GateServer>,
    client: GateClient,
}

async fn fixture_with_locator(locator: Arc<TestLocator>) -> Fixture {
    let session = Arc::new(Session::new());
    let state = Arc::new(AtomicI32::new(State::Work as i32));
    let provider: Arc<dyn GateProvider> = Arc::new(GateLocalProvider::new(
        "gate-1".to_owned(),
        state,
        Arc::clone(&session),
        locator.clone(),
    ));

    let server = Server::bind(
        ServerOptions {
            addr: "127.0.0.1:0".to_owned(),
            heartbeat_interval: Duration::from_secs(1),
        },
        GateServer::new(provider),
    )
    .await
    .expect("bind server");
    server.start().await;

    let mut opts = PoolOptions::new(Kind::Node, "node-1");
    opts.heartbeat_interval = Duration::from_secs(1);
    opts.rpc_timeout = Duration::from_millis(500);
    let pool = Arc::new(Pool::new(
        Target::Direct(server.local_addr().to_string()),
        None,
        opts,
    ));

    Fixture { session, locator, server, client: GateClient::new(pool) }
}

async fn fixture() -> Fixture {
    fixture_with_locator(TestLocator::new()).await
}

#[tokio::test(flavor = "multi_thread")]
async fn bind_and_online_round_trip() {
    let fx = fixture().await;
    let conn = TestConn::new(1);
    fx.session.add_conn(conn.clone());

    let miss = fx.client.bind(1, 7).await.expect("bind");
    assert!(!miss);
    assert_eq!(conn.uid(), 7);
    assert!(
        fx.locator
            .bound
            .lock()
            .expect("lock")
            .contains(&(7, "gate-1".to_owned()))
    );

    let (miss, online) = fx.client.is_online(session::Kind::User, 7).await.expect("online");
    assert!(!miss);
    assert!(online);

    let total = fx.client.stat(session::Kind::Conn).await.expect("stat");
    assert_eq!(total, 1);

    let miss = fx.client.unbind(7).await.expect("unbind");
    assert!(!miss);
    assert_eq!(conn.uid(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn bind_missing_session_reports_miss() {
    let fx = fixture().await;

    let miss = fx.client.bind(99, 7).await.expect("bind rpc");
    assert!(miss, "no such cid must surface NotFoundSession");
}

#[tokio::test(flavor = "multi_thread")]
async fn locator_failure_reverts_local_bind() {
    let fx = fixture_with_locator(TestLocator::failing()).await;
    let conn = TestConn::new(1);
    fx.session.add_conn(conn.clone());

    // The RPC decodes fine; the provider reports the locator failure.
    let miss = fx.client.bind(1, 7).await.expect("bind rpc");
    assert!(!miss);

    assert!(!fx.session.has(session::Kind::User, 7).expect("has"));
    assert_eq!(conn.uid(), 0, "local bind reverted");
}

#[tokio::test(flavor = "multi_thread")]
async fn push_reaches_user_connection() {
    let fx = fixture().await;
    let conn = TestConn::new(1);
    fx.session.add_conn(conn.clone());
    fx.client.bind(1, 7).await.expect("bind");

    fx.client
        .push(session::Kind::User, 7, message("hi"))
        .await
        .expect("push");

    let conn2 = conn.clone();
    assert!(wait_for(Duration::from_secs(2), move || conn2.pushed_count() == 1).await);
    assert_eq!(
        fx.session.stat(session::Kind::User).expect("stat"),
        1,
        "push must not disturb the registry",
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn group_multicast_through_rpc_dedupes() {
    let fx = fixture().await;
    let a = TestConn::new(1);
    let b = TestConn::new(2);
    let c = TestConn::new(3);
    fx.session.add_conn(a.clone());
    fx.session.add_conn(b.clone());
    fx.session.add_conn(c.clone());

    fx.client.bind_groups(1, &[10]).await.expect("a groups");
    fx.client.bind_groups(2, &[10, 20]).await.expect("b groups");
    fx.client.bind_groups(3, &[20]).await.expect("c groups");

    fx.client
        .multicast(session::Kind::Group, &[10, 20], message("m"))
        .await
        .expect("multicast");

    let (a2, b2, c2) = (a.clone(), b.clone(), c.clone());
    assert!(
        wait_for(Duration::from_secs(2), move || {
            a2.pushed_count() == 1 && b2.pushed_count() == 1 && c2.pushed_count() == 1
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_round_trips_over_channel_group() {
    let fx = fixture().await;
    let conn = TestConn::new(1);
    fx.session.add_conn(conn.clone());

    fx.client
        .subscribe(session::Kind::Conn, &[1], "news")
        .await
        .expect("subscribe");

    fx.client.publish("news", message("flash")).await.expect("publish");

    let conn2 = conn.clone();
    assert!(wait_for(Duration::from_secs(2), move || conn2.pushed_count() == 1).await);

    fx.client
        .unsubscribe(session::Kind::Conn, &[1], "news")
        .await
        .expect("unsubscribe");
    fx.client.publish("news", message("flash2")).await.expect("publish");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(conn.pushed_count(), 1, "unsubscribed connection stops receiving");
}

#[tokio::test(flavor = "multi_thread")]
async fn get_ip_and_state_round_trip() {
    let fx = fixture().await;
    fx.session.add_conn(TestConn::new(1));

    let (ip, miss) = fx.client.get_ip(session::Kind::Conn, 1).await.expect("ip");
    assert!(!miss);
    assert_eq!(ip.map(IpAddr::V4), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));

    let state = fx.client.get_state().await.expect("state");
    assert_eq!(state, State::Work);

    fx.client.set_state(State::Busy).await.expect("set state");
    assert_eq!(fx.client.get_state().await.expect("state"), State::Busy);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_provider_call_hits_deadline() {
    let fx = fixture_with_locator(TestLocator::slow(Duration::from_secs(2))).await;
    fx.session.add_conn(TestConn::new(1));

    let err = fx.client.bind(1, 7).await.expect_err("deadline");
    assert!(matches!(err, Error::DeadlineExceeded));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_stop_drains_pending_calls() {
    let fx = fixture_with_locator(TestLocator::slow(Duration::from_millis(400))).await;
    fx.session.add_conn(TestConn::new(1));

    // Prime the pooled connection before stopping the server.
    fx.client.stat(session::Kind::Conn).await.expect("stat");

    let client = fx.client;
    let handle = tokio::spawn(async move { client.bind(1, 7).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.server.stop();

    let res = handle.await.expect("join");
    assert!(
        matches!(res, Err(Error::ConnectionClosed) | Err(Error::DeadlineExceeded)),
        "pending call must terminate with a terminal error, got {res:?}",
    );
}
