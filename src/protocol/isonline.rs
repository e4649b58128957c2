// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
    session,
};

const IS_ONLINE_REQ_BYTES: usize = B8 + B64;
const IS_ONLINE_RES_BYTES: usize = CODE_BYTES + B8;

/// Request payload: session kind + target.
pub fn encode_is_online_req(kind: session::Kind, target: i64) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(IS_ONLINE_REQ_BYTES);
    writer.write_u8(kind as u8);
    writer.write_i64(ByteOrder::Big, target);
    buf
}

/// Frame: size + header + route + seq + [trace] + session kind + target.
pub fn decode_is_online_req(data: &[u8]) -> Result<(u64, session::Kind, i64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + IS_ONLINE_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(IS_ONLINE_REQ_BYTES)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let target = reader.read_i64(ByteOrder::Big)?;

    Ok((seq, kind, target))
}

/// Response payload: code + online flag.
pub fn encode_is_online_res(code: u16, is_online: bool) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(IS_ONLINE_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    writer.write_bool(is_online);
    buf
}

/// Frame: size + header + route + seq + [trace] + code + online flag.
pub fn decode_is_online_res(data: &[u8]) -> Result<(u16, bool)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + IS_ONLINE_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(IS_ONLINE_RES_BYTES)?;

    let code = reader.read_u16(ByteOrder::Big)?;
    let is_online = reader.read_bool()?;

    Ok((code, is_online))
}
