// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index},
};

const BIND_GROUPS_REQ_BYTES: usize = B64;
const BIND_GROUPS_RES_BYTES: usize = CODE_BYTES;

/// Request payload: cid + groups (residual i64 list).
pub fn encode_bind_groups_req(cid: i64, groups: &[i64]) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(BIND_GROUPS_REQ_BYTES + groups.len() * B64);
    writer.write_i64(ByteOrder::Big, cid);
    writer.write_i64s(ByteOrder::Big, groups);
    buf
}

/// Frame: size + header + route + seq + [trace] + cid + groups.
pub fn decode_bind_groups_req(data: &[u8]) -> Result<(u64, i64, Vec<i64>)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + BIND_GROUPS_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let cid = reader.read_i64(ByteOrder::Big)?;
    let count = reader.remaining() / B64;
    let groups = reader.read_i64s(ByteOrder::Big, count)?;

    Ok((seq, cid, groups))
}

/// Response payload: code.
pub fn encode_bind_groups_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(BIND_GROUPS_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_bind_groups_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + BIND_GROUPS_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
