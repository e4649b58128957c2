// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::{ByteOrder, NocopyBuffer, Reader},
    cluster::State,
    errors::{Error, Result},
    protocol::frame::{B8, CODE_BYTES, SIZE_HEAD_ROUTE_SEQ_BYTES, decode_seq},
};

const GET_STATE_RES_BYTES: usize = CODE_BYTES + B8;
const SET_STATE_REQ_BYTES: usize = B8;
const SET_STATE_RES_BYTES: usize = CODE_BYTES;

/// GetState requests have no payload; only the seq matters.
pub fn decode_get_state_req(data: &[u8]) -> Result<u64> {
    decode_seq(data)
}

/// Response payload: code + cluster state.
pub fn encode_get_state_res(code: u16, state: State) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(GET_STATE_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    writer.write_u8(state as u8);
    buf
}

/// Frame: size + header + route + seq + [trace] + code + cluster state.
pub fn decode_get_state_res(data: &[u8]) -> Result<(u16, State)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + GET_STATE_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(GET_STATE_RES_BYTES)?;

    let code = reader.read_u16(ByteOrder::Big)?;
    let state =
        State::try_from(reader.read_u8()?).map_err(|_| Error::InvalidMessage)?;

    Ok((code, state))
}

/// Request payload: cluster state.
pub fn encode_set_state_req(state: State) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(SET_STATE_REQ_BYTES);
    writer.write_u8(state as u8);
    buf
}

/// Frame: size + header + route + seq + [trace] + cluster state.
pub fn decode_set_state_req(data: &[u8]) -> Result<(u64, State)> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + SET_STATE_REQ_BYTES {
        return Err(Error::InvalidMessage);
    }

    let seq = decode_seq(data)?;

    let mut reader = Reader::new(data);
    reader.seek_end(SET_STATE_REQ_BYTES)?;
    let state =
        State::try_from(reader.read_u8()?).map_err(|_| Error::InvalidMessage)?;

    Ok((seq, state))
}

/// Response payload: code.
pub fn encode_set_state_res(code: u16) -> NocopyBuffer {
    let mut buf = NocopyBuffer::new();
    let writer = buf.malloc(SET_STATE_RES_BYTES);
    writer.write_u16(ByteOrder::Big, code);
    buf
}

/// Frame: size + header + route + seq + [trace] + code.
pub fn decode_set_state_res(data: &[u8]) -> Result<u16> {
    if data.len() < SIZE_HEAD_ROUTE_SEQ_BYTES + SET_STATE_RES_BYTES {
        return Err(Error::InvalidMessage);
    }

    let mut reader = Reader::new(data);
    reader.seek_end(CODE_BYTES)?;
    reader.read_u16(ByteOrder::Big)
}
