// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use gatelink::{
    buffer::NocopyBuffer,
    cluster::{Event, State},
    codes,
    errors::Error,
    protocol::{self, Route, frame::DATA_BIT, frame::encode_buffer},
    session::{self, Kind},
};

fn frame(route: Route, seq: u64, payload: NocopyBuffer) -> Bytes {
    encode_buffer(DATA_BIT, route, seq, None, Some(payload)).bytes()
}

fn message(text: &str) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    buf.mount(Bytes::copy_from_slice(text.as_bytes()));
    buf
}

#[test]
fn bind_round_trip() {
    let data = frame(Route::Bind, 7, protocol::encode_bind_req(2, 3));
    let (seq, cid, uid) = protocol::decode_bind_req(&data).expect("decode");
    assert_eq!((seq, cid, uid), (7, 2, 3));

    let res = frame(Route::Bind, 7, protocol::encode_bind_res(codes::OK));
    assert_eq!(protocol::decode_bind_res(&res).expect("decode"), codes::OK);
}

#[test]
fn bind_req_too_short() {
    let err = protocol::decode_bind_req(&[0u8; 20]).expect_err("short");
    assert!(matches!(err, Error::InvalidMessage));
}

#[test]
fn unbind_round_trip() {
    let data = frame(Route::Unbind, 9, protocol::encode_unbind_req(42));
    let (seq, uid) = protocol::decode_unbind_req(&data).expect("decode");
    assert_eq!((seq, uid), (9, 42));
}

#[test]
fn bind_groups_round_trip() {
    let data = frame(
        Route::BindGroups,
        3,
        protocol::encode_bind_groups_req(11, &[100, 200, 300]),
    );
    let (seq, cid, groups) = protocol::decode_bind_groups_req(&data).expect("decode");
    assert_eq!(seq, 3);
    assert_eq!(cid, 11);
    assert_eq!(groups, vec![100, 200, 300]);
}

#[test]
fn unbind_groups_empty_means_all() {
    let data = frame(
        Route::UnbindGroups,
        4,
        protocol::encode_unbind_groups_req(11, &[]),
    );
    let (seq, cid, groups) = protocol::decode_unbind_groups_req(&data).expect("decode");
    assert_eq!(seq, 4);
    assert_eq!(cid, 11);
    assert!(groups.is_empty());
}

#[test]
fn get_ip_round_trip() {
    let data = frame(Route::GetIp, 5, protocol::encode_get_ip_req(Kind::User, 8));
    let (seq, kind, target) = protocol::decode_get_ip_req(&data).expect("decode");
    assert_eq!((seq, kind, target), (5, Kind::User, 8));

    let ip = "10.1.2.3".parse().expect("ip");
    let res = frame(Route::GetIp, 5, protocol::encode_get_ip_res(codes::OK, Some(ip)));
    let (code, decoded) = protocol::decode_get_ip_res(&res).expect("decode");
    assert_eq!(code, codes::OK);
    assert_eq!(decoded, Some(ip));

    // A miss carries no address.
    let res = frame(
        Route::GetIp,
        5,
        protocol::encode_get_ip_res(codes::NOT_FOUND_SESSION, None),
    );
    let (code, decoded) = protocol::decode_get_ip_res(&res).expect("decode");
    assert_eq!(code, codes::NOT_FOUND_SESSION);
    assert_eq!(decoded, None);
}

#[test]
fn stat_res_omits_zero_total() {
    let res = frame(Route::Stat, 2, protocol::encode_stat_res(codes::OK, 0));
    let (code, total) = protocol::decode_stat_res(&res).expect("decode");
    assert_eq!((code, total), (codes::OK, 0));

    let res = frame(Route::Stat, 2, protocol::encode_stat_res(codes::OK, 12));
    let (code, total) = protocol::decode_stat_res(&res).expect("decode");
    assert_eq!((code, total), (codes::OK, 12));
}

#[test]
fn is_online_round_trip() {
    let data = frame(Route::IsOnline, 6, protocol::encode_is_online_req(Kind::Conn, 4));
    let (seq, kind, target) = protocol::decode_is_online_req(&data).expect("decode");
    assert_eq!((seq, kind, target), (6, Kind::Conn, 4));

    let res = frame(Route::IsOnline, 6, protocol::encode_is_online_res(codes::OK, true));
    let (code, online) = protocol::decode_is_online_res(&res).expect("decode");
    assert_eq!((code, online), (codes::OK, true));
}

#[test]
fn disconnect_round_trip() {
    let data = frame(
        Route::Disconnect,
        0,
        protocol::encode_disconnect_req(Kind::User, 77, true),
    );
    let (seq, kind, target, force) =
        protocol::decode_disconnect_req(&data).expect("decode");
    assert_eq!((seq, kind, target, force), (0, Kind::User, 77, true));
}

#[test]
fn push_round_trip() {
    let data = frame(
        Route::Push,
        0,
        protocol::encode_push_req(Kind::Conn, 15, message("payload")),
    );
    let (seq, kind, target, body) = protocol::decode_push_req(&data).expect("decode");
    assert_eq!((seq, kind, target), (0, Kind::Conn, 15));
    assert_eq!(&body[..], b"payload");
}

#[test]
fn multicast_round_trip() {
    let data = frame(
        Route::Multicast,
        0,
        protocol::encode_multicast_req(Kind::User, &[1, 2, 3], message("hello world")),
    );
    let (seq, kind, targets, body) =
        protocol::decode_multicast_req(&data).expect("decode");
    assert_eq!(seq, 0);
    assert_eq!(kind, Kind::User);
    assert_eq!(targets, vec![1, 2, 3]);
    assert_eq!(&body[..], b"hello world");

    let res = frame(Route::Multicast, 8, protocol::encode_multicast_res(codes::OK, 20));
    let (code, total) = protocol::decode_multicast_res(&res).expect("decode");
    assert_eq!((code, total), (codes::OK, 20));
}

#[test]
fn broadcast_round_trip() {
    let data = frame(
        Route::Broadcast,
        0,
        protocol::encode_broadcast_req(Kind::Group, message("to-everyone")),
    );
    let (seq, kind, body) = protocol::decode_broadcast_req(&data).expect("decode");
    assert_eq!((seq, kind), (0, Kind::Group));
    assert_eq!(&body[..], b"to-everyone");
}

#[test]
fn publish_round_trip() {
    let payload = protocol::encode_publish_req("news", message("flash")).expect("encode");
    let data = frame(Route::Publish, 0, payload);

    let (seq, channel, body) = protocol::decode_publish_req(&data).expect("decode");
    assert_eq!(seq, 0);
    assert_eq!(channel, "news");
    assert_eq!(&body[..], b"flash");

    let res = frame(Route::Publish, 1, protocol::encode_publish_res(33));
    assert_eq!(protocol::decode_publish_res(&res).expect("decode"), 33);
}

#[test]
fn publish_channel_too_long_fails_before_io() {
    let channel = "c".repeat(256);
    let err = protocol::encode_publish_req(&channel, message("x")).expect_err("too long");
    assert!(matches!(err, Error::InvalidArgument));

    let err =
        protocol::encode_subscribe_req(Kind::User, &[1], &channel).expect_err("too long");
    assert!(matches!(err, Error::InvalidArgument));

    let err = protocol::encode_unsubscribe_req(Kind::User, &[1], &channel)
        .expect_err("too long");
    assert!(matches!(err, Error::InvalidArgument));
}

#[test]
fn subscribe_round_trip() {
    let payload =
        protocol::encode_subscribe_req(Kind::User, &[5, 6], "updates").expect("encode");
    let data = frame(Route::Subscribe, 10, payload);

    let (seq, kind, targets, channel) =
        protocol::decode_subscribe_req(&data).expect("decode");
    assert_eq!(seq, 10);
    assert_eq!(kind, Kind::User);
    assert_eq!(targets, vec![5, 6]);
    assert_eq!(channel, "updates");
}

#[test]
fn unsubscribe_round_trip() {
    let payload =
        protocol::encode_unsubscribe_req(Kind::Conn, &[9], "updates").expect("encode");
    let data = frame(Route::Unsubscribe, 11, payload);

    let (seq, kind, targets, channel) =
        protocol::decode_unsubscribe_req(&data).expect("decode");
    assert_eq!(seq, 11);
    assert_eq!(kind, Kind::Conn);
    assert_eq!(targets, vec![9]);
    assert_eq!(channel, "updates");
}

#[test]
fn handshake_round_trip() {
    let data = frame(
        Route::Handshake,
        1,
        protocol::encode_handshake_req(gatelink::cluster::Kind::Node, "node-1"),
    );
    let (seq, kind, ins_id) = protocol::decode_handshake_req(&data).expect("decode");
    assert_eq!(seq, 1);
    assert_eq!(kind, gatelink::cluster::Kind::Node);
    assert_eq!(ins_id, "node-1");

    let res = frame(Route::Handshake, 1, protocol::encode_handshake_res(codes::OK));
    assert_eq!(protocol::decode_handshake_res(&res).expect("decode"), codes::OK);
}

#[test]
fn trigger_uid_presence_by_residual() {
    let data = frame(
        Route::Trigger,
        0,
        protocol::encode_trigger_req(Event::Connect, 4, 9),
    );
    let (seq, event, cid, uid) = protocol::decode_trigger_req(&data).expect("decode");
    assert_eq!((seq, event, cid, uid), (0, Event::Connect, 4, 9));

    let data = frame(
        Route::Trigger,
        0,
        protocol::encode_trigger_req(Event::Disconnect, 4, 0),
    );
    let (_, event, cid, uid) = protocol::decode_trigger_req(&data).expect("decode");
    assert_eq!((event, cid, uid), (Event::Disconnect, 4, 0));
}

#[test]
fn deliver_round_trip() {
    let data = frame(
        Route::Deliver,
        0,
        protocol::encode_deliver_req(2, 3, Bytes::from_static(b"routed")),
    );
    let (seq, cid, uid, body) = protocol::decode_deliver_req(&data).expect("decode");
    assert_eq!((seq, cid, uid), (0, 2, 3));
    assert_eq!(&body[..], b"routed");
}

#[test]
fn state_round_trips() {
    let res = frame(
        Route::GetState,
        12,
        protocol::encode_get_state_res(codes::OK, State::Work),
    );
    let (code, state) = protocol::decode_get_state_res(&res).expect("decode");
    assert_eq!((code, state), (codes::OK, State::Work));

    let req = frame(Route::SetState, 13, protocol::encode_set_state_req(State::Hang));
    let (seq, state) = protocol::decode_set_state_req(&req).expect("decode");
    assert_eq!((seq, state), (13, State::Hang));
}

#[test]
fn invalid_session_kind_rejected() {
    assert!(session::Kind::try_from(0u8).is_err());
    assert!(session::Kind::try_from(4u8).is_err());
}

#[test]
fn code_error_mapping_round_trip() {
    for code in [
        codes::OK,
        codes::NOT_FOUND_SESSION,
        codes::INVALID_ARGUMENT,
        codes::ILLEGAL_REQUEST,
        codes::ILLEGAL_OPERATION,
        codes::NOT_FOUND_USER_LOCATION,
        codes::DEADLINE_EXCEEDED,
        codes::INTERNAL_ERROR,
    ] {
        let res = codes::code_to_error(code);
        assert_eq!(codes::error_to_code(res.as_ref().err()), code);
    }
}
