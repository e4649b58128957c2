// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! User-location port.
//!
//! Session membership is gate-local; the locator is the external authority
//! for which gate currently owns a user. Gates announce ownership on bind,
//! retract it on unbind (or when a push discovers a stale mapping), and
//! logic nodes resolve users through it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{cluster, errors::Result};

/// A change in user → gate ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateEventKind {
    Bind,
    Unbind,
}

#[derive(Debug, Clone)]
pub struct LocateEvent {
    pub uid: i64,
    pub gid: String,
    pub kind: LocateEventKind,
}

pub type Watcher = mpsc::Receiver<LocateEvent>;

#[async_trait]
pub trait Locator: Send + Sync {
    /// Announces that `uid` is now owned by gate `gid`.
    async fn bind_gate(&self, uid: i64, gid: &str) -> Result<()>;

    /// Retracts a `uid → gid` association. Retracting a mapping that moved
    /// on is a no-op.
    async fn unbind_gate(&self, uid: i64, gid: &str) -> Result<()>;

    /// Resolves the gate currently owning `uid`.
    async fn locate_gate(&self, uid: i64) -> Result<String>;

    /// Watches ownership changes for the given instance kinds.
    async fn watch(&self, kinds: &[cluster::Kind]) -> Result<Watcher>;
}
