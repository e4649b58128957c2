// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    errors::{Error, Result},
    protocol::frame::{B8, B64, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index},
};

const PUBLISH_REQ_BYTES: usize = B8;
const PUBLISH_RES_BYTES: usize = B64;

/// Longest channel name the length-prefixed encoding can carry.
pub const MAX_CHANNEL_BYTES: usize = u8::MAX as usize;

/// Request payload: channel length (u8) + channel + embedded message
/// packet. Fails with `InvalidArgument` before any I/O when the channel
/// name does not fit the length prefix.
pub fn encode_publish_req(channel: &str, message: NocopyBuffer) -> Result<NocopyBuffer> {
    if channel.len() > MAX_CHANNEL_BYTES {
        return Err(Error::InvalidArgument);
    }

    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(PUBLISH_REQ_BYTES + channel.len());
    writer.write_u8(channel.len() as u8);
    writer.write_str(channel);
    buf.mount_buffer(message);

    Ok(buf)
}

/// Frame: size + header + route + seq + [trace] + channel len + channel + message.
pub fn decode_publish_req(data: &Bytes) -> Result<(u64, String, Bytes)> {
    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    if data.len() < index + PUBLISH_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let channel_bytes = reader.read_u8()? as usize;
    let channel = reader.read_str(channel_bytes)?.to_owned();

    let message = data.slice(index + PUBLISH_REQ_BYTES + channel_bytes..);

    Ok((seq, channel, message))
}

/// Response payload: delivered total.
pub fn encode_publish_res(total: u64) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(PUBLISH_RES_BYTES);
    writer.write_u64(ByteOrder::Big, total);
    buf
}

/// Frame: size + header + route + seq + [trace] + total.
pub fn decode_publish_res(data: &[u8]) -> Result<u64> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + PUBLISH_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(PUBLISH_RES_BYTES)?;
    reader.read_u64(ByteOrder::Big)
}
