// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Zero-copy composable buffer underpinning all cluster framing.
//!
//! Packet assembly concatenates a framing header, an optional trace block, a
//! route header and an application payload that may itself be a packed
//! buffer from upstream. [`NocopyBuffer`] splices those parts in O(1)
//! instead of copying at every layer; [`Writer`] blocks come from a
//! process-wide size-classed pool and return to it on release.

pub mod nocopy;
pub mod reader;
pub mod writer;

pub use nocopy::{NocopyBuffer, Whence};
pub use reader::Reader;
pub use writer::{ByteOrder, Writer, WriterPool};
