// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::SocketAddr,
    sync::{Arc, atomic::{AtomicU64, Ordering}},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{net::{TcpListener, TcpStream}, sync::{Mutex, mpsc}, time::interval};
use tokio_util::sync::CancellationToken;

use crate::{
    codes,
    errors::Result,
    protocol::{
        Route,
        frame::{self, DATA_BIT, Frame},
    },
    transporter::{INBOUND_QUEUE_SIZE, conn::Conn},
    utils::unix_now,
};

/// Per-route message handling plugged into the generic server.
///
/// Dispatch runs on the connection's processor worker; long-running work
/// must be handed off so one peer cannot starve another.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, conn: &Arc<Conn>, route: Route, frame: Frame) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: String,
    pub heartbeat_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:0".to_owned(),
            heartbeat_interval: crate::transporter::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Accepts peer links and runs a reader/processor worker pair per link.
pub struct Server<D: Dispatcher> {
    inner: Arc<Inner<D>>,
    listener: Mutex<Option<TcpListener>>,
    listen_addr: SocketAddr,
}

struct Inner<D> {
    dispatcher: D,
    conns: DashMap<u64, Arc<Conn>>,
    next_conn_id: AtomicU64,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
}

impl<D: Dispatcher> Server<D> {
    /// Binds the listen socket. The accept loop starts on [`Self::start`].
    pub async fn bind(opts: ServerOptions, dispatcher: D) -> Result<Self> {
        let listener = TcpListener::bind(&opts.addr).await?;
        let listen_addr = listener.local_addr()?;

        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher,
                conns: DashMap::new(),
                next_conn_id: AtomicU64::new(1),
                heartbeat_interval: opts.heartbeat_interval,
                cancel: CancellationToken::new(),
            }),
            listener: Mutex::new(Some(listener)),
            listen_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn conn_count(&self) -> usize {
        self.inner.conns.len()
    }

    /// Spawns the accept loop. Calling start twice is a no-op.
    pub async fn start(&self) {
        let Some(listener) = self.listener.lock().await.take() else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => serve_conn(Arc::clone(&inner), stream, remote),
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                        },
                    },
                }
            }
        });
    }

    /// Stops accepting and closes every live connection.
    pub fn stop(&self) {
        self.inner.cancel.cancel();

        let ids: Vec<u64> = self.inner.conns.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, conn)) = self.inner.conns.remove(&id) {
                conn.close();
            }
        }
    }
}

/// Wires up one accepted link: reader worker feeding a bounded channel,
/// processor worker draining it alongside the liveness ticker.
fn serve_conn<D: Dispatcher>(inner: Arc<Inner<D>>, stream: TcpStream, remote: SocketAddr) {
    if stream.set_nodelay(true).is_err() {
        return;
    }

    let (mut read_half, write_half) = stream.into_split();

    let id = inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let cancel = inner.cancel.child_token();
    let conn = Arc::new(Conn::new(id, write_half, remote, cancel.clone()));
    inner.conns.insert(id, Arc::clone(&conn));

    let (tx, mut rx) = mpsc::channel::<Frame>(INBOUND_QUEUE_SIZE);

    // Reader: frames off the socket into the bounded queue.
    {
        let inner = Arc::clone(&inner);
        let conn = Arc::clone(&conn);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    read = frame::read_trace_message(&mut read_half) => match read {
                        Ok(frame) => {
                            if tx.send(frame).await.is_err() {
                                return;
                            }
                        },
                        Err(e) => {
                            tracing::debug!(conn = id, "read failed: {e}");
                            close_and_recycle(&inner, &conn);
                            return;
                        },
                    },
                }
            }
        });
    }

    // Processor: heartbeat bookkeeping plus route dispatch.
    {
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut ticker = interval(inner.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let deadline =
                            unix_now() - 2 * inner.heartbeat_interval.as_secs() as i64;
                        if conn.last_heartbeat.load(Ordering::Acquire) < deadline {
                            tracing::warn!(
                                conn = id,
                                peer = ?conn.ins_id(),
                                "heartbeat deadline exceeded, closing"
                            );
                            close_and_recycle(&inner, &conn);
                            return;
                        }
                    },
                    received = rx.recv() => {
                        let Some(frame) = received else { return };

                        conn.last_heartbeat.store(unix_now(), Ordering::Release);

                        if frame.is_heartbeat {
                            if let Err(e) = conn.send_heartbeat().await {
                                tracing::warn!(conn = id, "heartbeat reply failed: {e}");
                            }
                            continue;
                        }

                        if !process_frame(&inner, &conn, frame).await {
                            return;
                        }
                    },
                }
            }
        });
    }
}

/// Handles one data frame. Returns false when the connection must stop.
async fn process_frame<D: Dispatcher>(
    inner: &Arc<Inner<D>>,
    conn: &Arc<Conn>,
    frame: Frame,
) -> bool {
    let Ok(route) = Route::try_from(frame.route) else {
        tracing::debug!(conn = conn.id, route = frame.route, "unknown route, dropped");
        return true;
    };

    // Handshake is mandatory before any other route.
    if !conn.handshaken() {
        if route != Route::Handshake {
            tracing::warn!(
                conn = conn.id,
                route = %route,
                "data frame before handshake, closing"
            );
            close_and_recycle(inner, conn);
            return false;
        }
        return handshake(inner, conn, &frame).await;
    }

    if route == Route::Handshake {
        tracing::debug!(conn = conn.id, "repeated handshake ignored");
        return true;
    }

    if let Err(e) = inner.dispatcher.dispatch(conn, route, frame).await {
        if !e.is_expected_miss() {
            tracing::warn!(conn = conn.id, route = %route, "process message failed: {e}");
        }
    }

    true
}

async fn handshake<D: Dispatcher>(
    inner: &Arc<Inner<D>>,
    conn: &Arc<Conn>,
    frame: &Frame,
) -> bool {
    let (seq, ins_kind, ins_id) = match crate::protocol::decode_handshake_req(&frame.data) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(conn = conn.id, "handshake decode failed: {e}, closing");
            close_and_recycle(inner, conn);
            return false;
        },
    };

    conn.set_identity(ins_kind, ins_id.clone());
    tracing::debug!(conn = conn.id, kind = %ins_kind, ins_id = %ins_id, "peer handshaken");

    if seq != 0 {
        let res = frame::encode_buffer(
            DATA_BIT,
            Route::Handshake,
            seq,
            None,
            Some(crate::protocol::encode_handshake_res(codes::OK)),
        );
        if let Err(e) = conn.send(res).await {
            tracing::warn!(conn = conn.id, "handshake reply failed: {e}");
        }
    }

    true
}

fn close_and_recycle<D>(inner: &Arc<Inner<D>>, conn: &Arc<Conn>) {
    if conn.close() {
        inner.conns.remove(&conn.id);
    }
}
