// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    codes,
    errors::{Error, Result},
    protocol::frame::{
        B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    session,
};

const BROADCAST_REQ_BYTES: usize = B8;
const BROADCAST_RES_BYTES: usize = CODE_BYTES + B64;

/// Request payload: session kind + embedded message packet.
pub fn encode_broadcast_req(kind: session::Kind, message: NocopyBuffer) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(BROADCAST_REQ_BYTES);
    writer.write_u8(kind as u8);
    buf.mount_buffer(message);
    buf
}

/// Frame: size + header + route + seq + [trace] + kind + message.
pub fn decode_broadcast_req(data: &Bytes) -> Result<(u64, session::Kind, Bytes)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + BROADCAST_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;

    let message = data.slice(index + BROADCAST_REQ_BYTES..);

    Ok((seq, kind, message))
}

/// Response payload: code + [total].
pub fn encode_broadcast_res(code: u16, total: u64) -> NocopyBuffer {
    let mut size = BROADCAST_RES_BYTES;
    if code != codes::OK || total == 0 {
        size -= B64;
    }

    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(size);
    writer.write_u16(ByteOrder::Big, code);

    if code == codes::OK && total != 0 {
        writer.write_u64(ByteOrder::Big, total);
    }

    buf
}

/// Frame: size + header + route + seq + [trace] + code + [total].
pub fn decode_broadcast_res(data: &[u8]) -> Result<(u16, u64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + BROADCAST_RES_BYTES - B64 {
        return Err(Error::InvalidMessage);
    }

    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let code = reader.read_u16(ByteOrder::Big)?;

    let total = if code == codes::OK && data.len() == index + BROADCAST_RES_BYTES {
        reader.read_u64(ByteOrder::Big)?
    } else {
        0
    };

    Ok((code, total))
}
