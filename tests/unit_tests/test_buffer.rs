// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use gatelink::buffer::{ByteOrder, NocopyBuffer, Whence};

#[test]
fn bytes_equals_visit_order() {
    let mut buf = NocopyBuffer::new();

    let writer = buf.malloc(8);
    writer.write_u32(ByteOrder::Big, 0x0102_0304);

    buf.mount(Bytes::from_static(b"hello"));

    let mut nested = NocopyBuffer::new();
    nested.mount(Bytes::from_static(b" world"));
    buf.mount_buffer(nested);

    let mut visited = Vec::new();
    buf.visit(&mut |chunk| {
        visited.extend_from_slice(chunk);
        true
    });

    let flat = buf.bytes();
    assert_eq!(&flat[..], &visited[..]);
    assert_eq!(flat.len(), buf.len());
    assert_eq!(&flat[..], b"\x01\x02\x03\x04hello world");
}

#[test]
fn mount_at_head_prepends() {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::from_static(b"body"));
    buf.mount_at(Bytes::from_static(b"head-"), Whence::Head);

    assert_eq!(&buf.bytes()[..], b"head-body");
}

#[test]
fn len_recomputed_after_mutation() {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::from_static(b"abc"));
    assert_eq!(buf.len(), 3);

    buf.mount(Bytes::from_static(b"de"));
    assert_eq!(buf.len(), 5);
}

#[test]
fn writer_grows_past_pooled_capacity() {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(32);
    for i in 0..100u8 {
        writer.write_u8(i);
    }

    assert_eq!(buf.len(), 100);
    assert_eq!(buf.bytes()[99], 99);
}

#[test]
fn delayed_release_frees_on_final_call() {
    let mut buf = NocopyBuffer::new();
    buf.malloc(32).write_u8(7);
    buf.mount(Bytes::from_static(b"xyz"));
    assert_eq!(buf.len(), 4);

    buf.delay(2);

    buf.release();
    assert_eq!(buf.len(), 4, "first release only decrements the delay");

    buf.release();
    assert_eq!(buf.len(), 0, "second release frees the graph");

    // Releasing an already-freed buffer stays a no-op.
    buf.release();
    assert_eq!(buf.len(), 0);
}

#[test]
fn force_release_ignores_delay() {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::from_static(b"abc"));
    buf.delay(5);

    buf.release_force();
    assert_eq!(buf.len(), 0);
}

#[test]
fn empty_buffer_behaviour() {
    let buf = NocopyBuffer::new();
    assert!(buf.is_empty());
    assert_eq!(buf.len(), 0);
    assert!(buf.bytes().is_empty());
}

#[test]
fn visit_stops_early() {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::from_static(b"one"));
    buf.mount(Bytes::from_static(b"two"));

    let mut seen = 0;
    let completed = buf.visit(&mut |_| {
        seen += 1;
        false
    });

    assert!(!completed);
    assert_eq!(seen, 1);
}
