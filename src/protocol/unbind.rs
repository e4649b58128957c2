// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
};

const UNBIND_REQ_BYTES: usize = B64;
const UNBIND_RES_BYTES: usize = CODE_BYTES;

/// Request payload: uid.
pub fn encode_unbind_req(uid: i64) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(UNBIND_REQ_BYTES);
    writer.write_i64(ByteOrder::Big, uid);
    buf
}

/// Frame: size + header + route + seq + [trace] + uid.
pub fn decode_unbind_req(data: &[u8]) -> Result<(u64, i64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + UNBIND_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(UNBIND_REQ_BYTES)?;
    let uid = reader.read_i64(ByteOrder::Big)?;

    Ok((seq, uid))
}

/// Response payload: code.
pub fn encode_unbind_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(UNBIND_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_unbind_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + UNBIND_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
