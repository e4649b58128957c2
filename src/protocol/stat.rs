// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    codes,
    errors::{Error, Result},
    protocol::frame::{
        B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    session,
};

const STAT_REQ_BYTES: usize = B8;
const STAT_RES_BYTES: usize = CODE_BYTES + B64;

/// Request payload: session kind.
pub fn encode_stat_req(kind: session::Kind) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(STAT_REQ_BYTES);
    writer.write_u8(kind as u8);
    buf
}

/// Frame: size + header + route + seq + [trace] + session kind.
pub fn decode_stat_req(data: &[u8]) -> Result<(u64, session::Kind)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + STAT_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(STAT_REQ_BYTES)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;

    Ok((seq, kind))
}

/// Response payload: code + [total]. The total is omitted when the code is
/// not OK or the count is zero.
pub fn encode_stat_res(code: u16, total: u64) -> NocopyBuffer {
    let mut size = STAT_RES_BYTES;
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
pub fn decode_stat_res(data: &[u8]) -> Result<(u16, u64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + STAT_RES_BYTES - B64 {
        return Err(Error::InvalidMessage);
    }

    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let code = reader.read_u16(ByteOrder::Big)?;

    let total = if code == codes::OK && data.len() == index + STAT_RES_BYTES {
        reader.read_u64(ByteOrder::Big)?
    } else {
        0
    };

    Ok((code, total))
}
