// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, atomic::{AtomicI32, AtomicI64, Ordering}},
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::{OwnedReadHalf, OwnedWriteHalf}},
    sync::{Mutex, oneshot},
    time::{interval, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::NocopyBuffer,
    cluster, codes,
    errors::{Error, Result},
    protocol::{
        Route,
        frame::{self, DATA_BIT},
    },
    transporter::{CONN_CLOSED, CONN_OPENED},
    utils::unix_now,
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Peer address to dial.
    pub addr: String,
    /// Our identity, announced in the handshake.
    pub ins_kind: cluster::Kind,
    pub ins_id: String,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
}

/// Client side of one peer link.
///
/// Synchronous calls register a `seq → oneshot` entry before writing and
/// block on the reply; fire-and-forget sends just write. A background
/// reader demultiplexes responses by sequence number; a heartbeater keeps
/// the link alive and enforces the liveness deadline. On teardown every
/// pending entry is drained with [`Error::ConnectionClosed`].
pub struct Client {
    opts: ClientOptions,
    state: AtomicI32,
    writer: Mutex<OwnedWriteHalf>,
    pending: DashMap<u64, oneshot::Sender<Bytes>>,
    cancel: CancellationToken,
    last_heartbeat: AtomicI64,
}

impl Client {
    /// Dials the peer and completes the handshake before returning. A
    /// non-OK handshake code fails the dial.
    pub async fn dial(opts: ClientOptions) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(&opts.addr).await?;
        stream.set_nodelay(true)?;

        let (mut read_half, mut write_half) = stream.into_split();

        handshake(&opts, &mut read_half, &mut write_half).await?;

        let client = Arc::new(Self {
            opts,
            state: AtomicI32::new(CONN_OPENED),
            writer: Mutex::new(write_half),
            pending: DashMap::new(),
            cancel: CancellationToken::new(),
            last_heartbeat: AtomicI64::new(unix_now()),
        });

        client.spawn_reader(read_half);
        client.spawn_heartbeater();

        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONN_OPENED
    }

    pub fn addr(&self) -> &str {
        &self.opts.addr
    }

    /// Synchronous RPC: writes the frame and waits for the correlated
    /// reply. On deadline or cancellation the pending entry is removed and
    /// a late reply is dropped.
    pub async fn call(&self, seq: u64, buf: NocopyBuffer) -> Result<Bytes> {
        self.check_state()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        if let Err(e) = self.write(buf).await {
            self.pending.remove(&seq);
            return Err(e);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.pending.remove(&seq);
                Err(Error::ConnectionClosed)
            },
            reply = timeout(self.opts.rpc_timeout, rx) => match reply {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(_)) => Err(Error::ConnectionClosed),
                Err(_) => {
                    self.pending.remove(&seq);
                    Err(Error::DeadlineExceeded)
                },
            },
        }
    }

    /// Fire-and-forget send. Once the local write buffer accepts the frame
    /// there is no observable failure.
    pub async fn send(&self, buf: NocopyBuffer) -> Result<()> {
        self.check_state()?;
        self.write(buf).await
    }

    async fn write(&self, mut buf: NocopyBuffer) -> Result<()> {
        let mut writer = self.writer.lock().await;

        let mut chunks: Vec<&[u8]> = Vec::new();
        buf.visit(&mut |chunk| {
            chunks.push(chunk);
            true
        });
        for chunk in chunks {
            writer.write_all(chunk).await?;
        }
        drop(writer);

        buf.release();

        Ok(())
    }

    fn check_state(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == CONN_CLOSED {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// One-shot close; drains every pending call with `ConnectionClosed`.
    pub fn close(&self) {
        if self
            .state
            .compare_exchange(CONN_OPENED, CONN_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.cancel.cancel();

        let seqs: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for seq in seqs {
            // Dropping the sender wakes the caller with ConnectionClosed.
            self.pending.remove(&seq);
        }
    }

    fn spawn_reader(self: &Arc<Self>, mut read_half: OwnedReadHalf) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = client.cancel.cancelled() => return,
                    read = frame::read_trace_message(&mut read_half) => match read {
                        Ok(frame) => {
                            client.last_heartbeat.store(unix_now(), Ordering::Release);

                            if frame.is_heartbeat {
                                continue;
                            }

                            if frame.seq == 0 {
                                tracing::debug!(
                                    addr = %client.opts.addr,
                                    route = frame.route,
                                    "unexpected fire-and-forget frame from server",
                                );
                                continue;
                            }

                            if let Some((_, tx)) = client.pending.remove(&frame.seq) {
                                let _ = tx.send(frame.data);
                            }
                        },
                        Err(e) => {
                            tracing::debug!(addr = %client.opts.addr, "read failed: {e}");
                            client.close();
                            return;
                        },
                    },
                }
            }
        });
    }

    fn spawn_heartbeater(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(client.opts.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = client.cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let deadline = unix_now()
                            - 2 * client.opts.heartbeat_interval.as_secs() as i64;
                        if client.last_heartbeat.load(Ordering::Acquire) < deadline {
                            tracing::warn!(
                                addr = %client.opts.addr,
                                "peer heartbeat deadline exceeded, closing",
                            );
                            client.close();
                            return;
                        }

                        let beat = frame::heartbeat();
                        let mut writer = client.writer.lock().await;
                        if let Err(e) = writer.write_all(&beat).await {
                            drop(writer);
                            tracing::debug!(addr = %client.opts.addr, "heartbeat failed: {e}");
                            client.close();
                            return;
                        }
                    },
                }
            }
        });
    }
}

/// Synchronous handshake on the fresh link, before the demux workers run.
async fn handshake(
    opts: &ClientOptions,
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
) -> Result<()> {
    let req = frame::encode_buffer(
        DATA_BIT,
        Route::Handshake,
        1,
        None,
        Some(crate::protocol::encode_handshake_req(opts.ins_kind, &opts.ins_id)),
    );

    let mut chunks: Vec<&[u8]> = Vec::new();
    req.visit(&mut |chunk| {
        chunks.push(chunk);
        true
    });
    for chunk in chunks {
        write_half.write_all(chunk).await?;
    }

    let reply = timeout(opts.rpc_timeout, frame::read_trace_message(read_half))
        .await
        .map_err(|_| Error::DeadlineExceeded)??;

    let code = crate::protocol::decode_handshake_res(&reply.data)?;
    codes::code_to_error(code)
}
