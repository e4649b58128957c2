// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Errors surfaced by the cluster transport core.
///
/// The variants mirror the response codes that travel on the wire, plus the
/// purely local failure modes (I/O, missing transporter). RPC servers map
/// them to [`crate::codes::Code`] before replying; clients map codes back.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("invalid message")]
    InvalidMessage,

    #[error("invalid session kind")]
    InvalidSessionKind,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("session not found")]
    NotFoundSession,

    #[error("user location not found")]
    NotFoundUserLocation,

    #[error("illegal operation")]
    IllegalOperation,

    #[error("illegal request")]
    IllegalRequest,

    #[error("internal error")]
    InternalError,

    #[error("transporter is not injected")]
    MissTransporter,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is an expected outcome of a disconnect race rather
    /// than a fault worth logging.
    pub fn is_expected_miss(&self) -> bool {
        matches!(self, Error::NotFoundSession | Error::NotFoundUserLocation)
    }
}
