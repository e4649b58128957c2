// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{
        B8, B16, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    protocol::publish::MAX_CHANNEL_BYTES,
    session,
};

const SUBSCRIBE_REQ_BYTES: usize = B8 + B16;
const SUBSCRIBE_RES_BYTES: usize = CODE_BYTES;

/// Request payload: session kind + target count + targets + channel
/// (residual string). At most 65535 targets per call.
pub fn encode_subscribe_req(
    kind: session::Kind,
    targets: &[i64],
    channel: &str,
) -> Result<NocopyBuffer> {
    if channel.len() > MAX_CHANNEL_BYTES {
        return Err(Error::InvalidArgument);
    }

    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(SUBSCRIBE_REQ_BYTES + targets.len() * B64 + channel.len());
    writer.write_u8(kind as u8);
    writer.write_u16(ByteOrder::Big, targets.len() as u16);
    writer.write_i64s(ByteOrder::Big, targets);
    writer.write_str(channel);

    Ok(buf)
}

/// Frame: size + header + route + seq + [trace] + kind + count + targets + channel.
pub fn decode_subscribe_req(
    data: &[u8],
) -> Result<(u64, session::Kind, Vec<i64>, String)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + SUBSCRIBE_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let count = reader.read_u16(ByteOrder::Big)? as usize;
    let targets = reader.read_i64s(ByteOrder::Big, count)?;
    let channel = reader.read_str(reader.remaining())?.to_owned();

    Ok((seq, kind, targets, channel))
}

/// Response payload: code.
pub fn encode_subscribe_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(SUBSCRIBE_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_subscribe_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + SUBSCRIBE_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
