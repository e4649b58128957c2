// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::{Arc, atomic::AtomicI32}, time::Duration};

use gatelink::{
    cluster::{Kind, State},
    cluster::gate::GateLocalProvider,
    protocol::{self, Route, frame::{DATA_BIT, encode_buffer}},
    session::Session,
    transporter::{
        gate::{GateProvider, GateServer},
        server::{Server, ServerOptions},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Instant, timeout},
};

use crate::integration_tests::common::{TestLocator, wait_for};

async fn start_server(heartbeat_interval: Duration) -> Server<GateServer> {
    let session = Arc::new(Session::new());
    let state = Arc::new(AtomicI32::new(State::Work as i32));
    let provider: Arc<dyn GateProvider> = Arc::new(GateLocalProvider::new(
        "gate-1".to_owned(),
        state,
        session,
        TestLocator::new(),
    ));

    let server = Server::bind(
        ServerOptions { addr: "127.0.0.1:0".to_owned(), heartbeat_interval },
        GateServer::new(provider),
    )
    .await
    .expect("bind server");
    server.start().await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn data_frame_before_handshake_closes_connection() {
    let server = start_server(Duration::from_secs(1)).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.expect("connect");

    let frame = encode_buffer(
        DATA_BIT,
        Route::Bind,
        1,
        None,
        Some(protocol::encode_bind_req(2, 3)),
    );
    stream.write_all(&frame.bytes()).await.expect("write");

    // The server must close without replying.
    let mut buf = [0u8; 64];
    let read = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close, not stall")
        .expect("read");
    assert_eq!(read, 0, "expected EOF, got {read} bytes");
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_peer_is_closed_after_liveness_deadline() {
    let interval = Duration::from_secs(1);
    let server = start_server(interval).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.expect("connect");

    let handshake = encode_buffer(
        DATA_BIT,
        Route::Handshake,
        1,
        None,
        Some(protocol::encode_handshake_req(Kind::Node, "node-1")),
    );
    stream.write_all(&handshake.bytes()).await.expect("write");

    // Consume the handshake reply, then go silent.
    let mut reply = [0u8; 64];
    let n = timeout(Duration::from_secs(2), stream.read(&mut reply))
        .await
        .expect("handshake reply")
        .expect("read");
    assert!(n > 0);

    let started = Instant::now();
    let mut buf = [0u8; 64];
    loop {
        let read = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("connection should be closed within the deadline")
            .expect("read");
        if read == 0 {
            break;
        }
    }

    let elapsed = started.elapsed();
    assert!(
        elapsed <= 2 * interval + Duration::from_secs(2),
        "closed after {elapsed:?}, expected within one tick past the deadline",
    );

    assert!(wait_for(Duration::from_secs(1), || server.conn_count() == 0).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn heartbeats_keep_the_connection_alive() {
    let interval = Duration::from_secs(1);
    let server = start_server(interval).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.expect("connect");

    let handshake = encode_buffer(
        DATA_BIT,
        Route::Handshake,
        1,
        None,
        Some(protocol::encode_handshake_req(Kind::Node, "node-1")),
    );
    stream.write_all(&handshake.bytes()).await.expect("write");

    let mut reply = [0u8; 64];
    let n = timeout(Duration::from_secs(2), stream.read(&mut reply))
        .await
        .expect("handshake reply")
        .expect("read");
    assert!(n > 0);

    // Beat every 500ms for 3s; the connection must survive the whole time.
    for _ in 0..6 {
        stream
            .write_all(&protocol::frame::heartbeat())
            .await
            .expect("the connection must stay open while beating");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert_eq!(server.conn_count(), 1);
}
