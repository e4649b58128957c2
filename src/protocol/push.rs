// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{
        B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    session,
};

const PUSH_REQ_BYTES: usize = B8 + B64;
const PUSH_RES_BYTES: usize = CODE_BYTES;

/// Request payload: session kind + target + embedded message packet.
pub fn encode_push_req(
    kind: session::Kind,
    target: i64,
    message: NocopyBuffer,
) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(PUSH_REQ_BYTES);
    writer.write_u8(kind as u8);
    writer.write_i64(ByteOrder::Big, target);
    buf.mount_buffer(message);
    buf
}

/// Frame: size + header + route + seq + [trace] + kind + target + message.
/// The returned message is a zero-copy subslice of the frame slab.
pub fn decode_push_req(data: &Bytes) -> Result<(u64, session::Kind, i64, Bytes)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + PUSH_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let target = reader.read_i64(ByteOrder::Big)?;

    let message = data.slice(index + PUSH_REQ_BYTES..);

    Ok((seq, kind, target, message))
}

/// Response payload: code.
pub fn encode_push_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(PUSH_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_push_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + PUSH_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
