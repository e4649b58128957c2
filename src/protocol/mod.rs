// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The cluster wire protocol: frame assembly/parsing plus one codec pair
//! per route.
//!
//! Decoder discipline: every decoder is position-independent. Fixed-size
//! trailing payloads seek from the frame end; variable-length payloads seek
//! to the offset implied by the trace bit. Short input always fails with
//! [`crate::errors::Error::InvalidMessage`] before any field is read.

pub mod frame;
pub mod route;

mod bind;
mod bindgroup;
mod broadcast;
mod deliver;
mod disconnect;
mod getip;
mod handshake;
mod isonline;
mod multicast;
mod publish;
mod push;
mod stat;
mod state;
mod subscribe;
mod trigger;
mod unbind;
mod unbindgroup;
mod unsubscribe;

pub use bind::*;
pub use bindgroup::*;
pub use broadcast::*;
pub use deliver::*;
pub use disconnect::*;
pub use frame::*;
pub use getip::*;
pub use handshake::*;
pub use isonline::*;
pub use multicast::*;
pub use publish::*;
pub use push::*;
pub use route::Route;
pub use stat::*;
pub use state::*;
pub use subscribe::*;
pub use trigger::*;
pub use unbind::*;
pub use unbindgroup::*;
pub use unsubscribe::*;
