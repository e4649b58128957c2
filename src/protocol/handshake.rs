// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    cluster::Kind,
    errors::{Error, Result},
    protocol::frame::{B8, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
};

const HANDSHAKE_REQ_BYTES: usize = B8;
const HANDSHAKE_RES_BYTES: usize = CODE_BYTES;

/// Request payload: instance kind + instance id. Handshake frames never
/// carry a trace block; they are the very first bytes on a fresh link.
pub fn encode_handshake_req(ins_kind: Kind, ins_id: &str) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(HANDSHAKE_REQ_BYTES + ins_id.len());
    writer.write_u8(ins_kind as u8);
    writer.write_str(ins_id);
    buf
}

/// Frame: size + header + route + seq + ins kind + ins id.
pub fn decode_handshake_req(data: &[u8]) -> Result<(u64, Kind, String)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + HANDSHAKE_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(SIZE_HEAD_ROUTE_SEQ_BYTES)?;

    let ins_kind =
        Kind::try_from(reader.read_u8()?).map_err(|_| Error::InvalidMessage)?;
    let ins_id = reader
        .read_str(data.len() - SIZE_HEAD_ROUTE_SEQ_BYTES - HANDSHAKE_REQ_BYTES)?
        .to_owned();

    Ok((seq, ins_kind, ins_id))
}

/// Response payload: code.
pub fn encode_handshake_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(HANDSHAKE_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + code.
pub fn decode_handshake_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + HANDSHAKE_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
