// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
};

const BIND_REQ_BYTES: usize = B64 + B64;
const BIND_RES_BYTES: usize = CODE_BYTES;

/// Request payload: cid + uid.
pub fn encode_bind_req(cid: i64, uid: i64) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(BIND_REQ_BYTES);
    writer.write_i64s(ByteOrder::Big, &[cid, uid]);
    buf
}

/// Frame: size + header + route + seq + [trace] + cid + uid.
pub fn decode_bind_req(data: &[u8]) -> Result<(u64, i64, i64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + BIND_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(BIND_REQ_BYTES)?;
    let cid = reader.read_i64(ByteOrder::Big)?;
    let uid = reader.read_i64(ByteOrder::Big)?;

    Ok((seq, cid, uid))
}

/// Response payload: code.
pub fn encode_bind_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(BIND_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_bind_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + BIND_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
