// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Response codes carried in the `code` field of RPC responses.
//!
//! The numeric values are part of the wire contract and must stay stable.

use crate::errors::Error;

pub const OK: u16 = 0;
pub const INTERNAL_ERROR: u16 = 1;
pub const INVALID_ARGUMENT: u16 = 2;
pub const NOT_FOUND_SESSION: u16 = 3;
pub const ILLEGAL_REQUEST: u16 = 4;
pub const ILLEGAL_OPERATION: u16 = 5;
pub const NOT_FOUND_USER_LOCATION: u16 = 6;
pub const DEADLINE_EXCEEDED: u16 = 7;

/// Maps a handler outcome to the code written on the wire.
pub fn error_to_code(err: Option<&Error>) -> u16 {
    match err {
        None => OK,
        Some(Error::InvalidArgument) => INVALID_ARGUMENT,
        Some(Error::InvalidSessionKind) => INVALID_ARGUMENT,
        Some(Error::NotFoundSession) => NOT_FOUND_SESSION,
        Some(Error::NotFoundUserLocation) => NOT_FOUND_USER_LOCATION,
        Some(Error::IllegalRequest) => ILLEGAL_REQUEST,
        Some(Error::IllegalOperation) => ILLEGAL_OPERATION,
        Some(Error::DeadlineExceeded) => DEADLINE_EXCEEDED,
        Some(_) => INTERNAL_ERROR,
    }
}

/// Maps a received code back to a typed error, `Ok(())` for [`OK`].
pub fn code_to_error(code: u16) -> crate::errors::Result<()> {
    match code {
        OK => Ok(()),
        INVALID_ARGUMENT => Err(Error::InvalidArgument),
        NOT_FOUND_SESSION => Err(Error::NotFoundSession),
        NOT_FOUND_USER_LOCATION => Err(Error::NotFoundUserLocation),
        ILLEGAL_REQUEST => Err(Error::IllegalRequest),
        ILLEGAL_OPERATION => Err(Error::IllegalOperation),
        DEADLINE_EXCEEDED => Err(Error::DeadlineExceeded),
        _ => Err(Error::InternalError),
    }
}

/// Convenience wrapper for handlers that already hold a `Result`.
pub fn result_to_code<T>(res: &crate::errors::Result<T>) -> u16 {
    error_to_code(res.as_ref().err())
}
