// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    cluster::Event,
    errors::{Error, Result},
    protocol::frame::{
        B8, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
};

const TRIGGER_REQ_BYTES: usize = B8 + B64 + B64;
const TRIGGER_RES_BYTES: usize = CODE_BYTES;

/// Request payload: event + cid + [uid]. The uid is omitted when zero;
/// decoders detect its presence by residual length.
pub fn encode_trigger_req(event: Event, cid: i64, uid: i64) -> NocopyBuffer {
    let mut size = TRIGGER_REQ_BYTES;
    if uid == 0 {
        size -= B64;
    }

    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(size);
    writer.write_u8(event as u8);
    writer.write_i64(ByteOrder::Big, cid);

    if uid != 0 {
        writer.write_i64(ByteOrder::Big, uid);
    }

    buf
}

/// Frame: size + header + route + seq + [trace] + event + cid + [uid].
pub fn decode_trigger_req(data: &[u8]) -> Result<(u64, Event, i64, i64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + TRIGGER_REQ_BYTES - B64 {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;
    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let event =
        Event::try_from(reader.read_u8()?).map_err(|_| Error::InvalidMessage)?;
    let cid = reader.read_i64(ByteOrder::Big)?;

    let uid = if data.len() == index + TRIGGER_REQ_BYTES {
        reader.read_i64(ByteOrder::Big)?
    } else {
        0
    };

    Ok((seq, event, cid, uid))
}

/// Response payload: code.
pub fn encode_trigger_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(TRIGGER_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_trigger_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + TRIGGER_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
