// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::Ipv4Addr;

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    codes,
    errors::{Error, Result},
    protocol::frame::{
        B8, B32, B64, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq, payload_index,
    },
    session,
};

const GET_IP_REQ_BYTES: usize = B8 + B64;
const GET_IP_RES_BYTES: usize = CODE_BYTES + B32;

/// Request payload: session kind + target.
pub fn encode_get_ip_req(kind: session::Kind, target: i64) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(GET_IP_REQ_BYTES);
    writer.write_u8(kind as u8);
    writer.write_i64(ByteOrder::Big, target);
    buf
}

/// Frame: size + header + route + seq + [trace] + session kind + target.
pub fn decode_get_ip_req(data: &[u8]) -> Result<(u64, session::Kind, i64)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + GET_IP_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(GET_IP_REQ_BYTES)?;

    let kind = session::Kind::try_from(reader.read_u8()?)
        .map_err(|_| Error::InvalidMessage)?;
    let target = reader.read_i64(ByteOrder::Big)?;

    Ok((seq, kind, target))
}

/// Response payload: code + ip. The address is packed as a 32-bit
/// network-order integer and present only when the code is OK.
pub fn encode_get_ip_res(code: u16, ip: Option<Ipv4Addr>) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(GET_IP_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);

    if code == codes::OK {
        if let Some(ip) = ip {
            writer.write_u32(ByteOrder::Big, u32::from(ip));
        }
    }

    buf
}

/// Frame: size + header + route + seq + [trace] + code + [ip].
pub fn decode_get_ip_res(data: &[u8]) -> Result<(u16, Option<Ipv4Addr>)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + CODE_BYTES {
        return Err(Error::InvalidMessage);
    }

    let index = payload_index(data)?;

    let mut reader = Reader::new(data);
    reader.seek_start(index)?;

    let code = reader.read_u16(ByteOrder::Big)?;

    let ip = if code == codes::OK && data.len() == index + GET_IP_RES_BYTES {
        Some(Ipv4Addr::from(reader.read_u32(ByteOrder::Big)?))
    } else {
        None
    };

    Ok((code, ip))
}
