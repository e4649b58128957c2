// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed RPC surface of a logic node: the client gates use to reach a
//! node, and the server dispatch a node runs over its provider.

use std::sync::{Arc, atomic::{AtomicU64, Ordering}};

use async_trait::async_trait;
use bytes::Bytes;
use fastrace::Span;

use crate::{
    buffer::NocopyBuffer,
    cluster, codes,
    errors::{Error, Result},
    protocol::{
        self, Route,
        frame::{DATA_BIT, Frame, encode_buffer, marshal_span_context, unmarshal_span_context},
    },
    tracer,
    transporter::{conn::Conn, pool::Pool, server::Dispatcher},
};

/// Everything a logic node must answer for its gates and peers.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// Handles a connection event reported by the gate `gid`.
    async fn trigger(
        &self,
        gid: &str,
        event: cluster::Event,
        cid: i64,
        uid: i64,
    ) -> Result<()>;

    /// Handles a routed user message. Exactly one of `gid`/`nid` identifies
    /// the sender, depending on the peer kind.
    async fn deliver(
        &self,
        gid: &str,
        nid: &str,
        cid: i64,
        uid: i64,
        message: Bytes,
    ) -> Result<()>;

    async fn get_state(&self) -> Result<cluster::State>;

    async fn set_state(&self, state: cluster::State) -> Result<()>;
}

/// RPC client a gate holds per logic node.
pub struct NodeClient {
    seq: AtomicU64,
    pool: Arc<Pool>,
}

impl NodeClient {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { seq: AtomicU64::new(0), pool }
    }

    /// Fire-and-forget event notification.
    pub async fn trigger(&self, event: cluster::Event, cid: i64, uid: i64) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Trigger,
            0,
            Some(protocol::encode_trigger_req(event, cid, uid)),
        );

        self.pool.send(buf, None).await
    }

    /// Fire-and-forget message delivery, ordered per connection id.
    pub async fn deliver(
        &self,
        cid: i64,
        uid: i64,
        message: impl Into<Bytes>,
    ) -> Result<()> {
        let (_span, buf) = self.trace_buffer(
            Route::Deliver,
            0,
            Some(protocol::encode_deliver_req(cid, uid, message)),
        );

        self.pool.send(buf, Some(cid)).await
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

    fn trace_buffer(
        &self,
        route: Route,
        seq: u64,
        payload: Option<NocopyBuffer>,
    ) -> (Span, NocopyBuffer) {
        if !tracer::is_enabled() {
            return (Span::noop(), encode_buffer(DATA_BIT, route, seq, None, payload));
        }

        let span = tracer::client_span(&format!("node.client.{route}"));
        let trace = tracer::span_context(&span).map(|sc| marshal_span_context(&sc));

        (span, encode_buffer(DATA_BIT, route, seq, trace, payload))
    }

    fn gen_seq(&self) -> u64 {
        loop {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if seq != 0 {
                return seq;
            }
        }
    }
}

/// Route dispatch a logic node plugs into the generic transport server.
pub struct NodeServer {
    provider: Arc<dyn NodeProvider>,
}

impl NodeServer {
    pub fn new(provider: Arc<dyn NodeProvider>) -> Self {
        Self { provider }
    }

    fn server_span(&self, route: Route, frame: &Frame) -> Span {
        tracer::server_span(
            &format!("node.server.{route}"),
            frame.trace.as_deref().map(unmarshal_span_context),
        )
    }

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
impl Dispatcher for NodeServer {
    async fn dispatch(&self, conn: &Arc<Conn>, route: Route, frame: Frame) -> Result<()> {
        match route {
            Route::Trigger => self.trigger(conn, frame).await,
            Route::Deliver => self.deliver(conn, frame).await,
            Route::GetState => self.get_state(conn, frame).await,
            Route::SetState => self.set_state(conn, frame).await,
            _ => {
                tracing::debug!(route = %route, "route not served by node, dropped");
                Ok(())
            },
        }
    }
}

impl NodeServer {
    async fn trigger(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Trigger, &frame);
        let (seq, event, cid, uid) = protocol::decode_trigger_req(&frame.data)?;

        // Only gates observe user connections.
        if conn.ins_kind() != Some(cluster::Kind::Gate) {
            return Err(Error::IllegalRequest);
        }

        let gid = conn.ins_id().unwrap_or_default().to_owned();

        let res = self.provider.trigger(&gid, event, cid, uid).await;
        if seq == 0 {
            return match res {
                Err(Error::NotFoundSession) => Ok(()),
                other => other,
            };
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(&span, Route::Trigger, seq, protocol::encode_trigger_res(code)))
            .await
    }

    async fn deliver(&self, conn: &Arc<Conn>, frame: Frame) -> Result<()> {
        let span = self.server_span(Route::Deliver, &frame);
        let (seq, cid, uid, message) = protocol::decode_deliver_req(&frame.data)?;

        let (gid, nid) = match conn.ins_kind() {
            Some(cluster::Kind::Gate) => (conn.ins_id().unwrap_or_default(), ""),
            Some(cluster::Kind::Node) => ("", conn.ins_id().unwrap_or_default()),
            _ => return Err(Error::IllegalRequest),
        };
        let (gid, nid) = (gid.to_owned(), nid.to_owned());

        let res = self.provider.deliver(&gid, &nid, cid, uid, message).await;
        if seq == 0 {
            return res;
        }

        let code = codes::result_to_code(&res);
        conn.send(self.trace_res(&span, Route::Deliver, seq, protocol::encode_deliver_res(code)))
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
