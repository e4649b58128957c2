// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cluster-wide enumerations shared between the wire protocol and the
//! gate/node components. All of them are single bytes on the wire.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub mod gate;
pub mod node;

/// The kind of a cluster instance, announced during the handshake.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Terminates end-user connections and routes messages to logic nodes.
    Gate = 1,
    /// Runs application-defined message handlers.
    Node = 2,
    /// Exposes auxiliary services to the cluster.
    Mesh = 3,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Gate => "gate",
            Kind::Node => "node",
            Kind::Mesh => "mesh",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            1 => Ok(Kind::Gate),
            2 => Ok(Kind::Node),
            3 => Ok(Kind::Mesh),
            _ => Err(Error::InvalidMessage),
        }
    }
}

/// Lifecycle state of a clustered component.
///
/// Transitions: `Shut → Work` on start, `Work|Busy → Hang` on close,
/// `Hang → Shut` on destroy. The state string is advertised through the
/// service registry so dispatch strategies can skip hung instances.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum State {
    #[default]
    Shut = 0,
    Work = 1,
    Busy = 2,
    Hang = 3,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Shut => "shut",
            State::Work => "work",
            State::Busy => "busy",
            State::Hang => "hang",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for State {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(State::Shut),
            1 => Ok(State::Work),
            2 => Ok(State::Busy),
            3 => Ok(State::Hang),
            _ => Err(Error::InvalidMessage),
        }
    }
}

/// Connection events a gate reports to logic nodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Connect = 1,
    Reconnect = 2,
    Disconnect = 3,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Connect => "connect",
            Event::Reconnect => "reconnect",
            Event::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Event {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        match v {
            1 => Ok(Event::Connect),
            2 => Ok(Event::Reconnect),
            3 => Ok(Event::Disconnect),
            _ => Err(Error::InvalidMessage),
        }
    }
}

/// Policy for choosing among equivalent logic-node instances.
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    #[default]
    #[serde(rename = "random", alias = "Random")]
    Random,
    #[serde(rename = "round-robin", alias = "RoundRobin", alias = "rr")]
    RoundRobin,
    #[serde(rename = "weight-random", alias = "WeightRandom")]
    WeightRandom,
}

/// Lifecycle phases that accept hook handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Init,
    Start,
    Close,
    Destroy,
}
