// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{
        B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
};

const DELIVER_REQ_BYTES: usize = B64 + B64;
const DELIVER_RES_BYTES: usize = CODE_BYTES;

/// Request payload: cid + uid + embedded message packet.
pub fn encode_deliver_req(cid: i64, uid: i64, message: impl Into<Bytes>) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(DELIVER_REQ_BYTES);
    writer.write_i64s(ByteOrder::Big, &[cid, uid]);
    buf.mount(message);
    buf
}

/// Frame: size + header + route + seq + [trace] + cid + uid + message.
pub fn decode_deliver_req(data: &Bytes) -> Result<(u64, i64, i64, Bytes)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + DELIVER_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let cid = reader.read_i64(ByteOrder::Big)?;
    let uid = reader.read_i64(ByteOrder::Big)?;

    let message = data.slice(index + DELIVER_REQ_BYTES..);

    Ok((seq, cid, uid, message))
}

/// Response payload: code.
pub fn encode_deliver_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(DELIVER_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_deliver_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + DELIVER_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
