// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicI32, AtomicI64, Ordering},
};

use once_cell::sync::OnceCell;
use tokio::{io::AsyncWriteExt, net::tcp::OwnedWriteHalf, sync::Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::NocopyBuffer,
    cluster,
    errors::{Error, Result},
    protocol::frame,
    transporter::{CONN_CLOSED, CONN_OPENED},
    utils::unix_now,
};

/// Server side of one peer link.
///
/// The owning server spawns a reader/processor worker pair per connection;
/// this struct holds the shared half: write path, open/closed state,
/// liveness stamp and the peer identity learned at handshake. State flips
/// Opened → Closed exactly once via CAS; everything past that returns
/// [`Error::ConnectionClosed`].
pub struct Conn {
    pub(crate) id: u64,
    state: AtomicI32,
    writer: Mutex<OwnedWriteHalf>,
    pub(crate) cancel: CancellationToken,
    pub(crate) last_heartbeat: AtomicI64,
    identity: OnceCell<(cluster::Kind, String)>,
    remote: SocketAddr,
}

impl Conn {
    pub(crate) fn new(
        id: u64,
        writer: OwnedWriteHalf,
        remote: SocketAddr,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            state: AtomicI32::new(CONN_OPENED),
            writer: Mutex::new(writer),
            cancel,
            last_heartbeat: AtomicI64::new(unix_now()),
            identity: OnceCell::new(),
            remote,
        }
    }

    /// Peer kind announced at handshake, if the handshake completed.
    pub fn ins_kind(&self) -> Option<cluster::Kind> {
        self.identity.get().map(|(kind, _)| *kind)
    }

    /// Peer instance id announced at handshake.
    pub fn ins_id(&self) -> Option<&str> {
        self.identity.get().map(|(_, id)| id.as_str())
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub(crate) fn handshaken(&self) -> bool {
        self.identity.get().is_some()
    }

    pub(crate) fn set_identity(&self, kind: cluster::Kind, id: String) {
        let _ = self.identity.set((kind, id));
    }

    fn check_state(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == CONN_CLOSED {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Writes a frame and releases it. Ownership of the buffer transfers
    /// here; serialization order is the caller's concern.
    pub async fn send(&self, mut buf: NocopyBuffer) -> Result<()> {
        self.check_state()?;

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

    /// Echoes a heartbeat frame back to the peer.
    pub(crate) async fn send_heartbeat(&self) -> Result<()> {
        self.check_state()?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame::heartbeat()).await?;

        Ok(())
    }

    /// One-shot close. Returns false when the connection was already
    /// closed by another path.
    pub(crate) fn close(&self) -> bool {
        if self
            .state
            .compare_exchange(CONN_OPENED, CONN_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.cancel.cancel();
        true
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONN_OPENED
    }
}
