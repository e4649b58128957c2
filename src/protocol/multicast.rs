// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    codes,
    errors::{Error, Result},
    protocol::frame::{
        B8, B16, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    session,
};

const MULTICAST_REQ_BYTES: usize = B8 + B16;
const MULTICAST_RES_BYTES: usize = CODE_BYTES + B64;

/// Request payload: session kind + target count (u16, so at most 65535
/// targets per call) + targets + embedded message packet.
pub fn encode_multicast_req(
    kind: session::Kind,
    targets: &[i64],
    message: NocopyBuffer,
) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(MULTICAST_REQ_BYTES + targets.len() * B64);
    writer.write_u8(kind as u8);
    writer.write_u16(ByteOrder::Big, targets.len() as u16);
    writer.write_i64s(ByteOrder::Big, targets);
    buf.mount_buffer(message);
    buf
}

/// Frame: size + header + route + seq + [trace] + kind + count + targets + message.
pub fn decode_multicast_req(
    data: &Bytes,
) -> Result<(u64, session::Kind, Vec<i64>, Bytes)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + MULTICAST_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let count = reader.read_u16(ByteOrder::Big)? as usize;
    let targets = reader.read_i64s(ByteOrder::Big, count)?;

    let message = data.slice(index + MULTICAST_REQ_BYTES + count * B64..);

    Ok((seq, kind, targets, message))
}

/// Response payload: code + [total]. The total is omitted when the code is
/// not OK or the count is zero.
pub fn encode_multicast_res(code: u16, total: u64) -> NocopyBuffer {
    let mut size = MULTICAST_RES_BYTES;
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
pub fn decode_multicast_res(data: &[u8]) -> Result<(u16, u64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + MULTICAST_RES_BYTES - B64 {
        return Err(Error::InvalidMessage);
    }

    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let code = reader.read_u16(ByteOrder::Big)?;

    let total = if code == codes::OK && data.len() == index + MULTICAST_RES_BYTES {
        reader.read_u64(ByteOrder::Big)?
    } else {
        0
    };

    Ok((code, total))
}
