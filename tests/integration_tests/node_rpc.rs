// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use gatelink::{
    cluster::{Event, Kind, State},
    errors::{Error, Result},
    transporter::{
        node::{NodeClient, NodeProvider, NodeServer},
        pool::{Pool, PoolOptions, Target},
        server::{Server, ServerOptions},
    },
};

use crate::integration_tests::common::wait_for;

#[derive(Default)]
struct RecordingProvider {
    triggers: Mutex<Vec<(String, Event, i64, i64)>>,
    delivers: Mutex<Vec<(String, String, i64, i64, Vec<u8>)>>,
    state: Mutex<State>,
}

#[async_trait]
impl NodeProvider for RecordingProvider {
    async fn trigger(&self, gid: &str, event: Event, cid: i64, uid: i64) -> Result<()> {
        self.triggers
            .lock()
            .map_err(|_| Error::InternalError)?
            .push((gid.to_owned(), event, cid, uid));
        Ok(())
    }

    async fn deliver(
        &self,
        gid: &str,
        nid: &str,
        cid: i64,
        uid: i64,
        message: Bytes,
    ) -> Result<()> {
        self.delivers.lock().map_err(|_| Error::InternalError)?.push((
            gid.to_owned(),
            nid.to_owned(),
            cid,
            uid,
            message.to_vec(),
        ));
        Ok(())
    }

    async fn get_state(&self) -> Result<State> {
        Ok(*self.state.lock().map_err(|_| Error::InternalError)?)
    }

    async fn set_state(&self, state: State) -> Result<()> {
        *self.state.lock().map_err(|_| Error::InternalError)? = state;
        Ok(())
    }
}

async fn fixture(client_kind: Kind) -> (Arc<RecordingProvider>, Server<NodeServer>, NodeClient) {
    let provider = Arc::new(RecordingProvider::default());
    let dyn_provider: Arc<dyn NodeProvider> = provider.clone();

    let server = Server::bind(
        ServerOptions {
            addr: "127.0.0.1:0".to_owned(),
            heartbeat_interval: Duration::from_secs(1),
        },
        NodeServer::new(dyn_provider),
    )
    .await
    .expect("bind server");
    server.start().await;

    let mut opts = PoolOptions::new(client_kind, "peer-1");
    opts.rpc_timeout = Duration::from_millis(500);
    let pool = Arc::new(Pool::new(
        Target::Direct(server.local_addr().to_string()),
        None,
        opts,
    ));

    (provider, server, NodeClient::new(pool))
}

#[tokio::test(flavor = "multi_thread")]
async fn gate_trigger_reaches_provider() {
    let (provider, _server, client) = fixture(Kind::Gate).await;

    client.trigger(Event::Connect, 4, 9).await.expect("trigger");

    let probe = provider.clone();
    assert!(
        wait_for(Duration::from_secs(2), move || {
            probe
                .triggers
                .lock()
                .map(|t| t.contains(&("peer-1".to_owned(), Event::Connect, 4, 9)))
                .unwrap_or(false)
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn trigger_from_non_gate_peer_is_rejected() {
    let (provider, _server, client) = fixture(Kind::Node).await;

    client.trigger(Event::Connect, 4, 9).await.expect("send succeeds locally");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        provider.triggers.lock().expect("lock").is_empty(),
        "a non-gate peer must not trigger events",
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn deliver_records_sender_identity() {
    let (provider, _server, client) = fixture(Kind::Gate).await;

    client.deliver(4, 9, &b"payload"[..]).await.expect("deliver");

    let probe = provider.clone();
    assert!(
        wait_for(Duration::from_secs(2), move || {
            probe
                .delivers
                .lock()
                .map(|d| {
                    d.contains(&(
                        "peer-1".to_owned(),
                        String::new(),
                        4,
                        9,
                        b"payload".to_vec(),
                    ))
                })
                .unwrap_or(false)
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn state_round_trip() {
    let (_provider, _server, client) = fixture(Kind::Gate).await;

    assert_eq!(client.get_state().await.expect("get"), State::Shut);

    client.set_state(State::Work).await.expect("set");
    assert_eq!(client.get_state().await.expect("get"), State::Work);
}
