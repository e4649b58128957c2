// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frame assembly and parsing.
//!
//! On-wire layout of every cluster message:
//!
//! ```text
//! size(4) | header(1) | route(1) | seq(8) | [trace(25)] | payload
//! ```
//!
//! `size` counts every byte after the size field itself, big-endian.
//! Header bit 7 marks a heartbeat, bit 6 marks a present trace block.

use bytes::Bytes;
use fastrace::collector::{SpanContext, SpanId, TraceId};
use tokio::io::{AsyncRead, AsyncReadExt};
use zerocopy::{
    FromBytes, Immutable, KnownLayout,
    byteorder::big_endian::{U32, U64},
};

use crate::{
    buffer::{ByteOrder, NocopyBuffer},
    errors::{Error, Result},
    protocol::route::Route,
};

pub const SIZE_BYTES: usize = 4;
pub const HEADER_BYTES: usize = 1;
pub const ROUTE_BYTES: usize = 1;
pub const SEQ_BYTES: usize = 8;
pub const CODE_BYTES: usize = 2;
pub const TRACE_BYTES: usize = 25;

/// Offset of the payload in a traceless frame: size + header + route + seq.
pub const SIZE_HEAD_ROUTE_SEQ_BYTES: usize =
    SIZE_BYTES + HEADER_BYTES + ROUTE_BYTES + SEQ_BYTES;

pub const DATA_BIT: u8 = 0;
pub const HEARTBEAT_BIT: u8 = 1 << 7;
pub const TRACE_BIT: u8 = 1 << 6;

pub const B8: usize = 1;
pub const B16: usize = 2;
pub const B32: usize = 4;
pub const B64: usize = 8;

/// Assembles a full frame around an optional trace block and payload.
/// The trace bit is set automatically when a trace block is supplied.
pub fn encode_buffer(
    mut header: u8,
    route: Route,
    seq: u64,
    trace: Option<[u8; TRACE_BYTES]>,
    payload: Option<NocopyBuffer>,
) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(SIZE_HEAD_ROUTE_SEQ_BYTES);

    let mut size = (SIZE_HEAD_ROUTE_SEQ_BYTES - SIZE_BYTES) as u32;
    if trace.is_some() {
        size += TRACE_BYTES as u32;
        header |= TRACE_BIT;
    }
    if let Some(payload) = &payload {
        size += payload.len() as u32;
    }

    writer.write_u32(ByteOrder::Big, size);
    writer.write_u8(header);
    writer.write_u8(route as u8);
    writer.write_u64(ByteOrder::Big, seq);

    if let Some(trace) = trace {
        buf.mount(Bytes::from(trace.to_vec()));
    }
    if let Some(payload) = payload {
        if !payload.is_empty() {
            buf.mount_buffer(payload);
        }
    }

    buf
}

/// The 14 raw bytes of a heartbeat frame.
pub fn heartbeat() -> [u8; SIZE_HEAD_ROUTE_SEQ_BYTES] {
    let mut frame = [0u8; SIZE_HEAD_ROUTE_SEQ_BYTES];
    frame[..SIZE_BYTES]
        .copy_from_slice(&((SIZE_HEAD_ROUTE_SEQ_BYTES - SIZE_BYTES) as u32).to_be_bytes());
    frame[SIZE_BYTES] = HEARTBEAT_BIT;
    frame
}

/// Zero-copy view of the fixed wire prefix. The byteorder field types keep
/// the struct unaligned, so it can overlay any slab offset.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct FramePrefix {
    size: U32,
    header: u8,
    route: u8,
    seq: U64,
}

impl FramePrefix {
    fn parse(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(prefix, _)| prefix)
            .map_err(|_| Error::InvalidMessage)
    }
}

/// A parsed inbound frame. `data` is the complete slab including the
/// size/header/route/seq prefix so per-route decoders can seek from either
/// end; `trace` is a subslice of the same slab.
#[derive(Debug, Clone)]
pub struct Frame {
    pub is_heartbeat: bool,
    pub route: u8,
    pub seq: u64,
    pub data: Bytes,
    pub trace: Option<Bytes>,
}

/// Reads one frame: the 4-byte size, then one slab of `4 + size` bytes.
/// Heartbeats short-circuit with only the prefix parsed.
pub async fn read_trace_message<R>(reader: &mut R) -> Result<Frame>
where R: AsyncRead + Unpin {
    let mut size_buf = [0u8; SIZE_BYTES];
    reader.read_exact(&mut size_buf).await?;

    let size = u32::from_be_bytes(size_buf) as usize;
    if size == 0 {
        return Err(Error::InvalidMessage);
    }

    let mut slab = vec![0u8; SIZE_BYTES + size];
    slab[..SIZE_BYTES].copy_from_slice(&size_buf);
    reader.read_exact(&mut slab[SIZE_BYTES..]).await?;

    let data = Bytes::from(slab);
    let header = data[SIZE_BYTES];

    if header & HEARTBEAT_BIT == HEARTBEAT_BIT {
        return Ok(Frame {
            is_heartbeat: true,
            route: 0,
            seq: 0,
            data,
            trace: None,
        });
    }

    if size < HEADER_BYTES + ROUTE_BYTES + SEQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let prefix = FramePrefix::parse(&data)?;
    let route = prefix.route;
    let seq = prefix.seq.get();

    let trace = if header & TRACE_BIT == TRACE_BIT {
        if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + TRACE_BYTES {
            return Err(Error::InvalidMessage);
        }
        Some(data.slice(SIZE_HEAD_ROUTE_SEQ_BYTES..SIZE_HEAD_ROUTE_SEQ_BYTES + TRACE_BYTES))
    } else {
        None
    };

    Ok(Frame { is_heartbeat: false, route, seq, data, trace })
}

/// Header byte of an assembled frame slab.
pub fn decode_header(data: &[u8]) -> Result<u8> {
    Ok(FramePrefix::parse(data)?.header)
}

/// Sequence number of an assembled frame slab.
pub fn decode_seq(data: &[u8]) -> Result<u64> {
    Ok(FramePrefix::parse(data)?.seq.get())
}

/// Offset of the route payload: fixed prefix plus the trace block when the
/// trace bit is set.
pub(crate) fn payload_index(data: &[u8]) -> Result<usize> {
    let header = decode_header(data)?;
    let mut index = SIZE_HEAD_ROUTE_SEQ_BYTES;
    if header & TRACE_BIT == TRACE_BIT {
        index += TRACE_BYTES;
    }
    if index > data.len() {
        return Err(Error::InvalidMessage);
    }
    Ok(index)
}

/// Serializes a span context as trace-id(16) ‖ span-id(8) ‖ flags(1).
pub fn marshal_span_context(ctx: &SpanContext) -> [u8; TRACE_BYTES] {
    let mut out = [0u8; TRACE_BYTES];
    out[..16].copy_from_slice(&ctx.trace_id.0.to_be_bytes());
    out[16..24].copy_from_slice(&ctx.span_id.0.to_be_bytes());
    out[24] = 1; // sampled
    out
}

/// Deserializes a trace block. A short or all-zero block still yields a
/// valid (empty) remote context.
pub fn unmarshal_span_context(data: &[u8]) -> SpanContext {
    if data.len() < TRACE_BYTES {
        return SpanContext::new(TraceId(0), SpanId(0));
    }

    let trace_id = u128::from_be_bytes(
        data[..16].try_into().unwrap_or([0u8; 16]),
    );
    let span_id = u64::from_be_bytes(data[16..24].try_into().unwrap_or([0u8; 8]));

    SpanContext::new(TraceId(trace_id), SpanId(span_id))
}
