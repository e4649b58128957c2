// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Error;

/// One-byte RPC operation identifiers. The numeric values are part of the
/// wire contract and must stay stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Handshake = 0,
    Bind = 1,
    Unbind = 2,
    BindGroups = 3,
    UnbindGroups = 4,
    GetIp = 5,
    Stat = 6,
    IsOnline = 7,
    Disconnect = 8,
    Push = 9,
    Multicast = 10,
    Broadcast = 11,
    Publish = 12,
    Subscribe = 13,
    Unsubscribe = 14,
    Trigger = 15,
    Deliver = 16,
    GetState = 17,
    SetState = 18,
}

impl Route {
    /// Stable lowercase name used for span and log labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Handshake => "handshake",
            Route::Bind => "bind",
            Route::Unbind => "unbind",
            Route::BindGroups => "bind-groups",
            Route::UnbindGroups => "unbind-groups",
            Route::GetIp => "get-ip",
            Route::Stat => "stat",
            Route::IsOnline => "is-online",
            Route::Disconnect => "disconnect",
            Route::Push => "push",
            Route::Multicast => "multicast",
            Route::Broadcast => "broadcast",
            Route::Publish => "publish",
            Route::Subscribe => "subscribe",
            Route::Unsubscribe => "unsubscribe",
            Route::Trigger => "trigger",
            Route::Deliver => "deliver",
            Route::GetState => "get-state",
            Route::SetState => "set-state",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Route {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        Ok(match v {
            0 => Route::Handshake,
            1 => Route::Bind,
            2 => Route::Unbind,
            3 => Route::BindGroups,
            4 => Route::UnbindGroups,
            5 => Route::GetIp,
            6 => Route::Stat,
            7 => Route::IsOnline,
            8 => Route::Disconnect,
            9 => Route::Push,
            10 => Route::Multicast,
            11 => Route::Broadcast,
            12 => Route::Publish,
            13 => Route::Subscribe,
            14 => Route::Unsubscribe,
            15 => Route::Trigger,
            16 => Route::Deliver,
            17 => Route::GetState,
            18 => Route::SetState,
            _ => return Err(Error::InvalidMessage),
        })
    }
}
