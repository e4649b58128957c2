// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
    session,
};

const DISCONNECT_REQ_BYTES: usize = B8 + B64 + B8;
const DISCONNECT_RES_BYTES: usize = CODE_BYTES;

/// Request payload: session kind + target + force flag.
pub fn encode_disconnect_req(
    kind: session::Kind,
    target: i64,
    force: bool,
) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(DISCONNECT_REQ_BYTES);
    writer.write_u8(kind as u8);
    writer.write_i64(ByteOrder::Big, target);
    writer.write_bool(force);
    buf
}

/// Frame: size + header + route + seq + [trace] + session kind + target + force.
pub fn decode_disconnect_req(data: &[u8]) -> Result<(u64, session::Kind, i64, bool)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + DISCONNECT_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(DISCONNECT_REQ_BYTES)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let target = reader.read_i64(ByteOrder::Big)?;
    let force = reader.read_bool()?;

    Ok((seq, kind, target, force))
}

/// Response payload: code.
pub fn encode_disconnect_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(DISCONNECT_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_disconnect_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + DISCONNECT_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
