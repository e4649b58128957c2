// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use fastrace::collector::{SpanContext, SpanId, TraceId};
use gatelink::{
    errors::Error,
    protocol::{
        self, Route,
        frame::{
            DATA_BIT, HEARTBEAT_BIT, TRACE_BIT, TRACE_BYTES, encode_buffer, heartbeat,
            marshal_span_context, read_trace_message, unmarshal_span_context,
        },
    },
};

#[tokio::test]
async fn bind_frame_layout_without_trace() {
    let buf = encode_buffer(
        DATA_BIT,
        Route::Bind,
        1,
        None,
        Some(protocol::encode_bind_req(2, 3)),
    );
    let bytes = buf.bytes();

    // size counts header + route + seq + cid + uid.
    assert_eq!(&bytes[..4], &26u32.to_be_bytes());
    assert_eq!(bytes[4], 0x00);
    assert_eq!(bytes[5], Route::Bind as u8);
    assert_eq!(&bytes[6..14], &1u64.to_be_bytes());
    assert_eq!(&bytes[14..22], &2i64.to_be_bytes());
    assert_eq!(&bytes[22..30], &3i64.to_be_bytes());

    let (seq, cid, uid) = protocol::decode_bind_req(&bytes).expect("decode");
    assert_eq!((seq, cid, uid), (1, 2, 3));
}

#[tokio::test]
async fn bind_frame_layout_with_trace() {
    let trace = [0u8; TRACE_BYTES];
    let buf = encode_buffer(
        DATA_BIT,
        Route::Bind,
        1,
        Some(trace),
        Some(protocol::encode_bind_req(2, 3)),
    );
    let bytes = buf.bytes();

    assert_eq!(&bytes[..4], &51u32.to_be_bytes());
    assert_eq!(bytes[4] & TRACE_BIT, TRACE_BIT);

    let (seq, cid, uid) = protocol::decode_bind_req(&bytes).expect("decode");
    assert_eq!((seq, cid, uid), (1, 2, 3));

    let mut reader: &[u8] = &bytes;
    let frame = read_trace_message(&mut reader).await.expect("read");
    assert!(!frame.is_heartbeat);
    assert_eq!(frame.route, Route::Bind as u8);
    assert_eq!(frame.seq, 1);
    assert_eq!(frame.trace.as_deref(), Some(&trace[..]));
}

#[tokio::test]
async fn read_trace_message_round_trip() {
    let sc = SpanContext::new(TraceId(0x0102), SpanId(0x0304));
    let trace = marshal_span_context(&sc);

    let buf = encode_buffer(
        DATA_BIT,
        Route::Deliver,
        1,
        Some(trace),
        Some(protocol::encode_deliver_req(2, 3, &b"hello"[..])),
    );
    let bytes = buf.bytes();

    let mut reader: &[u8] = &bytes;
    let frame = read_trace_message(&mut reader).await.expect("read");

    assert!(!frame.is_heartbeat);
    assert_eq!(frame.route, Route::Deliver as u8);
    assert_eq!(frame.seq, 1);

    let (seq, cid, uid, message) =
        protocol::decode_deliver_req(&frame.data).expect("decode");
    assert_eq!((seq, cid, uid), (1, 2, 3));
    assert_eq!(&message[..], b"hello");

    let remote = unmarshal_span_context(frame.trace.as_deref().expect("trace"));
    assert_eq!(remote.trace_id, TraceId(0x0102));
    assert_eq!(remote.span_id, SpanId(0x0304));
}

#[tokio::test]
async fn heartbeat_frames_short_circuit() {
    let beat = heartbeat();
    assert_eq!(beat.len(), 14);
    assert_eq!(&beat[..4], &10u32.to_be_bytes());
    assert_eq!(beat[4] & HEARTBEAT_BIT, HEARTBEAT_BIT);

    let mut reader: &[u8] = &beat;
    let frame = read_trace_message(&mut reader).await.expect("read");
    assert!(frame.is_heartbeat);
    assert_eq!(frame.seq, 0);
    assert!(frame.trace.is_none());
}

#[tokio::test]
async fn zero_size_frame_is_invalid() {
    let raw = [0u8, 0, 0, 0];
    let mut reader: &[u8] = &raw;
    let err = read_trace_message(&mut reader).await.expect_err("must fail");
    assert!(matches!(err, Error::InvalidMessage));
}

#[test]
fn span_context_marshal_round_trip() {
    let sc = SpanContext::new(TraceId(u128::MAX - 5), SpanId(42));
    let raw = marshal_span_context(&sc);
    assert_eq!(raw.len(), TRACE_BYTES);

    let back = unmarshal_span_context(&raw);
    assert_eq!(back.trace_id, sc.trace_id);
    assert_eq!(back.span_id, sc.span_id);
}

#[test]
fn zero_trace_block_is_valid_empty_context() {
    let back = unmarshal_span_context(&[0u8; TRACE_BYTES]);
    assert_eq!(back.trace_id, TraceId(0));
    assert_eq!(back.span_id, SpanId(0));

    // Short blocks degrade to the empty context instead of failing.
    let short = unmarshal_span_context(&[1u8; 3]);
    assert_eq!(short.trace_id, TraceId(0));
}
