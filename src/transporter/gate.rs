// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed RPC surface of a gate: the client used by logic nodes to reach a
//! gate, and the server dispatch a gate runs over its session provider.

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, atomic::{AtomicU64, Ordering}},
};

use async_trait::async_trait;
use bytes::Bytes;
use fastrace::Span;

use crate::{
    buffer::NocopyBuffer,
    cluster, codes,
    errors::Result,
    protocol::{
        self, Route,
        frame::{DATA_BIT, Frame, encode_buffer, marshal_span_context, unmarshal_span_context},
    },
    session,
    tracer,
    transporter::{conn::Conn, pool::Pool, server::Dispatcher},
};

/// Everything a gate must answer on behalf of its sessions.
#[async_trait]
pub trait GateProvider: Send + Sync {
    async fn bind(&self, cid: i64, uid: i64) -> Result<()>;

    async fn unbind(&self, uid: i64) -> Result<()>;

    async fn bind_groups(&self, cid: i64, groups: &[i64]) -> Result<()>;

    /// An empty group list unbinds every group of the connection.
    async fn unbind_groups(&self, cid: i64, groups: &[i64]) -> Result<()>;

    async fn get_ip(&self, kind: session::Kind, target: i64) -> Result<IpAddr>;

    async fn is_online(&self, kind: session::Kind, target: i64) -> Result<bool>;

    async fn stat(&self, kind: session::Kind) -> Result<i64>;

    async fn disconnect(&self, kind: session::Kind, target: i64, force: bool) -> Result<()>;

    async fn push(&self, kind: session::Kind, target: i64, message: Bytes) -> Result<()>;

    async fn multicast(
        &self,
        kind: session::Kind,
        targets: &[i64],
        message: Bytes,
    ) -> Result<i64>;

    async fn broadcast(&self, kind: session::Kind, message: Bytes) -> Result<i64>;

    async fn publish(&self, channel: &str, message: Bytes) -> Result<i64>;

    async fn subscribe(
        &self,
        kind: session::Kind,
        targets: &[i64],
        channel: &str,
    ) -> Result<()>;

    async fn unsubscribe(
        &self,
        kind: session::Kind,
        targets: &[i64],
        channel: &str,
    ) -> Result<()>;

    async fn get_state(&self) -> Result<cluster::State>;

    async fn set_state(&self, state: cluster::State) -> Result<()>;
}

/// RPC client a logic node holds per gate.
pub struct GateClient {
    seq: AtomicU64,
    pool: Arc<Pool>,
}

impl GateClient {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { seq: AtomicU64::new(0), pool }
    }

    /// Binds a user to a connection. The returned flag reports a session
    /// miss on the gate.
    pub async fn bind(&self, cid: i64, uid: i64) -> Result<bool> {
        let seq = self.gen_seq();
        let (_span, buf) =
            self.trace_buffer(Route::Bind, seq, Some(protocol::encode_bind_req(cid, uid)));

        let res = self.pool.call(seq, buf).await?;
        let code = protocol::decode_bind_res(&res)?;

        Ok(code == codes::NOT_FOUND_SESSION)
    }

    pub async fn unbind(&self, uid: i64) -> Result<bool> {
        let seq = self.gen_seq();
        let (_span, buf) =
            self.trace_buffer(Route::Unbind, seq, Some(protocol::encode_unbind_req(uid)));

        let res = self.pool.call(seq, buf).await?;
        let code = protocol::decode_unbind_res(&res)?;

        Ok(code == codes::NOT_FOUND_SESSION)
    }

    pub async fn bind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(
            Route::BindGroups,
            seq,
            Some(protocol::encode_bind_groups_req(cid, groups)),
        );

        let res = self.pool.call(seq, buf).await?;
        codes::code_to_error(protocol::decode_bind_groups_res(&res)?)
    }

    pub async fn unbind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(
            Route::UnbindGroups,
            seq,
            Some(protocol::encode_unbind_groups_req(cid, groups)),
        );

        let res = self.pool.call(seq, buf).await?;
        codes::code_to_error(protocol::decode_unbind_groups_res(&res)?)
    }

    /// Resolves the client IP of a session. The second flag reports a miss.
    pub async fn get_ip(
        &self,
        kind: session::Kind,
        target: i64,
    ) -> Result<(Option<Ipv4Addr>, bool)> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(
            Route::GetIp,
            seq,
            Some(protocol::encode_get_ip_req(kind, target)),
        );

        let res = self.pool.call(seq, buf).await?;
        let (code, ip) = protocol::decode_get_ip_res(&res)?;

        Ok((ip, code == codes::NOT_FOUND_SESSION))
    }

    pub async fn stat(&self, kind: session::Kind) -> Result<i64> {
        let seq = self.gen_seq();
        let (_span, buf) =
            self.trace_buffer(Route::Stat, seq, Some(protocol::encode_stat_req(kind)));

        let res = self.pool.call(seq, buf).await?;
        let (_, total) = protocol::decode_stat_res(&res)?;

        Ok(total as i64)
    }

    /// Checks presence of a session. Returns `(miss, online)`.
    pub async fn is_online(
        &self,
        kind: session::Kind,
        target: i64,
    ) -> Result<(bool, bool)> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(
            Route::IsOnline,
            seq,
            Some(protocol::encode_is_online_req(kind, target)),
        );

        let res = self.pool.call(seq, buf).await?;
        let (code, online) = protocol::decode_is_online_res(&res)?;

        Ok((code == codes::NOT_FOUND_SESSION, online))
    }

    /// Fire-and-forget disconnect. Non-forced disconnects stick to the
    /// target's socket so they stay ordered behind pending pushes.
    pub async fn disconnect(
        &self,
        kind: session::Kind,
        target: i64,
        force: bool,
    ) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Disconnect,
            0,
            Some(protocol::encode_disconnect_req(kind, target, force)),
        );

        let sticky = if force { None } else { Some(target) };
        self.pool.send(buf, sticky).await
    }

    /// Fire-and-forget push to one target, ordered per target.
    pub async fn push(
        &self,
        kind: session::Kind,
        target: i64,
        message: NocopyBuffer,
    ) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Push,
            0,
            Some(protocol::encode_push_req(kind, target, message)),
        );

        self.pool.send(buf, Some(target)).await
    }

    pub async fn multicast(
        &self,
        kind: session::Kind,
        targets: &[i64],
        message: NocopyBuffer,
    ) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Multicast,
            0,
            Some(protocol::encode_multicast_req(kind, targets, message)),
        );

        self.pool.send(buf, None).await
    }

    pub async fn broadcast(&self, kind: session::Kind, message: NocopyBuffer) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Broadcast,
            0,
            Some(protocol::encode_broadcast_req(kind, message)),
        );

        self.pool.send(buf, None).await
    }

    pub async fn publish(&self, channel: &str, message: NocopyBuffer) -> Result<()> {
        let payload = protocol::encode_publish_req(channel, message)?;
        let (_span, buf) = self.trace_buffer(Route::Publish, 0, Some(payload));

        self.pool.send(buf, None).await
    }

    pub async fn subscribe(
        &self,
        kind: session::Kind,
        targets: &[i64],
        channel: &str,
    ) -> Result<()> {
        let payload = protocol::encode_subscribe_req(kind, targets, channel)?;

        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(Route::Subscribe, seq, Some(payload));

        let res = self.pool.call(seq, buf).await?;
        codes::code_to_error(protocol::decode_subscribe_res(&res)?)
    }

    pub async fn unsubscribe(
        &self,
        kind: session::Kind,
        targets: &[i64],
        channel: &str,
    ) -> Result<()> {
        let payload = protocol::encode_unsubscribe_req(kind, targets, channel)?;

        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(Route::Unsubscribe, seq, Some(payload));

        let res = self.pool.call(seq, buf).await?;
        codes::code_to_error(protocol::decode_unsubscribe_res(&res)?)
    }

    pub async fn get_state(&self) -> Result<cluster::State> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(Route::GetState, seq, None);

        let res = self.pool.call(seq, buf).await?;
        let (code, state) = protocol::decode_get_state_res(&res)?;
        codes::code_to_error(code)?;

        Ok(state)
    }

    pub async fn set_state(&self, state: cluster::State) -> Result<()> {
        let seq = self.gen_seq();
        let (_span, buf) = self.trace_buffer(
            Route::SetState,
            seq,
            Some(protocol::encode_set_state_req(state)),
        );

        let res = self.pool.call(seq, buf).await?;
        codes::code_to_error(protocol::decode_set_state_res(&res)?)
    }

    /// Opens a client span and assembles the frame, piggybacking the span
    /// context when tracing is on.
    fn trace_buffer(
        &self,
        route: Route,
        seq: u64,
        payload: Option<NocopyBuffer>,
    ) -> (Span, NocopyBuffer) {
        if !tracer::is_enabled() {
            return (Span::noop(), encode_buffer(DATA_BIT, route, seq, None, payload));
        }

        let span = tracer::client_span(&format!("gate.client.{route}"));
        let trace = tracer::span_context(&span).map(|sc| marshal_span_context(&sc));

        (span, encode_buffer(DATA_BIT, route, seq, trace, payload))
    }

    /// Monotonically increasing sequence generator that skips zero.
    fn gen_seq(&self) -> u64 {
        loop {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if seq != 0 {
                return seq;
            }
        }
    }
}

/// Route dispatch a gate plugs into the generic transport server.
pub struct GateServer {
    provider: Arc<dyn GateProvider>,
}

impl GateServer {
    pub fn new(provider: Arc<dyn GateProvider>) -> Self {
        Self { provider }
    }

    fn server_span(&self, route: Route, frame: &Frame) -> Span {
        tracer::server_span(
            &format!("gate.server.{route}"),
            frame.trace.as_deref().map(unmarshal_span_context),
        )
    }

    /// Assembles a response frame, carrying the server span context back.
    fn trace_res(
        &self,
        span: &Span,
        route: Route,
        seq: u64,
        payload: NocopyBuffer,
    ) -> NocopyBuffer {
        let trace = if tracer::is_enabled() {
            tracer::span_context(span).map(|sc| marshal_span_context(&sc))
        } else {
            None
        };

        encode_buffer(DATA_BIT, route, seq, trace, Some(payload))
    }
}

#[async_trait]
impl Dispatcher for GateServer {
    async fn dispatch(&self, conn: &Arc<Conn>, route: Route, frame: Frame) -> Result<()> {
        match route {
            Route::Bind => self.bind(conn, frame).await,
            Route::Unbind => self.unbind(conn, frame).await,
            Route::BindGroups => self.bind_groups(conn, frame).await,
            Route::UnbindGroups => self.unbind_groups(conn, frame).await,
            Route::GetIp => self.get_ip(conn, frame).await,
            Route::Stat => self.stat(conn, frame).await,
            Route::IsOnline => self.is_online(conn, frame).await,
            Route::Disconnect => self.disconnect(conn, frame).await,
            Route::Push => self.push(conn, frame).await,
            Route::Multicast => self.multicast(conn, frame).await,
            Route::Broadcast => self.broadcast(conn, frame).await,
            Route::Publish => self.publish(conn, frame).await,
            Route::Subscribe => self.subscribe(conn, frame).await,
            Route::Unsubscribe => self.unsubscribe(conn, frame).await,
            Route::GetState => self.get_state(conn, frame).await,
            Route::SetState => self.set_state(conn, frame).await,
            _ => {
                tracing::debug!(route = %route, "route not served by gate, dropped");
                Ok(())
            },
        }
    }
}

impl GateServer {
    async fn bind(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Bind, &frame);
        let (seq, cid, uid) = protocol::decode_bind_req(&frame.data)?;

        let res = self.provider.bind(cid, uid).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(&span, Route::Bind, seq, protocol::encode_bind_res(code)))
            .await
    }

    async fn unbind(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Unbind, &frame);
        let (seq, uid) = protocol::decode_unbind_req(&frame.data)?;

        let res = self.provider.unbind(uid).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(&span, Route::Unbind, seq, protocol::encode_unbind_res(code)))
            .await
    }

    async fn bind_groups(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::BindGroups, &frame);
        let (seq, cid, groups) = protocol::decode_bind_groups_req(&frame.data)?;

        let res = self.provider.bind_groups(cid, &groups).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::BindGroups,
            seq,
            protocol::encode_bind_groups_res(code),
        ))
        .await
    }

    async fn unbind_groups(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::UnbindGroups, &frame);
        let (seq, cid, groups) = protocol::decode_unbind_groups_req(&frame.data)?;

        let res = self.provider.unbind_groups(cid, &groups).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::UnbindGroups,
            seq,
            protocol::encode_unbind_groups_res(code),
        ))
        .await
    }

    async fn get_ip(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::GetIp, &frame);
        let (seq, kind, target) = protocol::decode_get_ip_req(&frame.data)?;

        let res = self.provider.get_ip(kind, target).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let (code, ip) = match &res {
            Ok(IpAddr::V4(v4)) => (codes::OK, Some(*v4)),
            // The wire packs IPv4 only; anything else reports as internal.
            Ok(IpAddr::V6(_)) => (codes::INTERNAL_ERROR, None),
            Err(e) => (codes::error_to_code(Some(e)), None),
        };

        conn.send(self.trace_res(
            &span,
            Route::GetIp,
            seq,
            protocol::encode_get_ip_res(code, ip),
        ))
        .await
    }

    async fn stat(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Stat, &frame);
        let (seq, kind) = protocol::decode_stat_req(&frame.data)?;

        let res = self.provider.stat(kind).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let code = codes::result_to_code(&res);
        let total = res.unwrap_or(0) as u64;
        conn.send(self.trace_res(
            &span,
            Route::Stat,
            seq,
            protocol::encode_stat_res(code, total),
        ))
        .await
    }

    async fn is_online(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::IsOnline, &frame);
        let (seq, kind, target) = protocol::decode_is_online_req(&frame.data)?;

        let res = self.provider.is_online(kind, target).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let code = codes::result_to_code(&res);
        let online = res.unwrap_or(false);
        conn.send(self.trace_res(
            &span,
            Route::IsOnline,
            seq,
            protocol::encode_is_online_res(code, online),
        ))
        .await
    }

    async fn disconnect(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Disconnect, &frame);
        let (seq, kind, target, force) = protocol::decode_disconnect_req(&frame.data)?;

        let res = self.provider.disconnect(kind, target, force).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::Disconnect,
            seq,
            protocol::encode_disconnect_res(code),
        ))
        .await
    }

    async fn push(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Push, &frame);
        let (seq, kind, target, message) = protocol::decode_push_req(&frame.data)?;

        let res = self.provider.push(kind, target, message).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(&span, Route::Push, seq, protocol::encode_push_res(code)))
            .await
    }

    async fn multicast(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Multicast, &frame);
        let (seq, kind, targets, message) = protocol::decode_multicast_req(&frame.data)?;

        let res = self.provider.multicast(kind, &targets, message).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let code = codes::result_to_code(&res);
        let total = res.unwrap_or(0) as u64;
        conn.send(self.trace_res(
            &span,
            Route::Multicast,
            seq,
            protocol::encode_multicast_res(code, total),
        ))
        .await
    }

    async fn broadcast(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Broadcast, &frame);
        let (seq, kind, message) = protocol::decode_broadcast_req(&frame.data)?;

        let res = self.provider.broadcast(kind, message).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let code = codes::result_to_code(&res);
        let total = res.unwrap_or(0) as u64;
        conn.send(self.trace_res(
            &span,
            Route::Broadcast,
            seq,
            protocol::encode_broadcast_res(code, total),
        ))
        .await
    }

    async fn publish(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Publish, &frame);
        let (seq, channel, message) = protocol::decode_publish_req(&frame.data)?;

        let res = self.provider.publish(&channel, message).await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let total = res.unwrap_or(0) as u64;
        conn.send(self.trace_res(
            &span,
            Route::Publish,
            seq,
            protocol::encode_publish_res(total),
        ))
        .await
    }

    async fn subscribe(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Subscribe, &frame);
        let (seq, kind, targets, channel) = protocol::decode_subscribe_req(&frame.data)?;

        let res = self.provider.subscribe(kind, &targets, &channel).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::Subscribe,
            seq,
            protocol::encode_subscribe_res(code),
        ))
        .await
    }

    async fn unsubscribe(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Unsubscribe, &frame);
        let (seq, kind, targets, channel) = protocol::decode_unsubscribe_req(&frame.data)?;

        let res = self.provider.unsubscribe(kind, &targets, &channel).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::Unsubscribe,
            seq,
            protocol::encode_unsubscribe_res(code),
        ))
        .await
    }

    async fn get_state(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::GetState, &frame);
        let seq = protocol::decode_get_state_req(&frame.data)?;

        let res = self.provider.get_state().await;
        if seq == 0 {
            return res.map(|_| ());
        }

        let code = codes::result_to_code(&res);
        let state = res.unwrap_or(cluster::State::Shut);
        conn.send(self.trace_res(
            &span,
            Route::GetState,
            seq,
            protocol::encode_get_state_res(code, state),
        ))
        .await
    }

    async fn set_state(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::SetState, &frame);
        let (seq, state) = protocol::decode_set_state_req(&frame.data)?;

        let res = self.provider.set_state(state).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(
            &span,
            Route::SetState,
            seq,
            protocol::encode_set_state_res(code),
        ))
        .await
    }
}
