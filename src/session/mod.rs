// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Gate-local session registry.
//!
//! Three axes over the same set of connections: by connection id, by bound
//! user id, and by group membership. One RW mutex guards all of them so
//! that every cross-axis update (bind, unbind, removal) is atomic; fan-out
//! reads hold the shared lock across the whole multicast, which is safe
//! because [`crate::network::NetConn::push`] only enqueues.

use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, SocketAddr},
    sync::{Arc, RwLock},
};

use crate::{
    errors::{Error, Result},
    network::NetConn,
};

/// Addressing axis of a session operation. Single byte on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Conn = 1,
    User = 2,
    /// Multicast/broadcast only.
    Group = 3,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Conn => "conn",
            Kind::User => "user",
            Kind::Group => "group",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(Kind::Conn),
            2 => Ok(Kind::User),
            3 => Ok(Kind::Group),
            _ => Err(Error::InvalidSessionKind),
        }
    }
}

type Conn = Arc<dyn NetConn>;

#[derive(Default)]
struct Indexes {
    /// cid -> conn
    conns: HashMap<i64, Conn>,
    /// uid -> conn
    users: HashMap<i64, Conn>,
    /// cid -> conn, for connections that are in at least one group
    groups: HashMap<i64, Conn>,
    /// gid -> cid -> conn
    group_conns: HashMap<i64, HashMap<i64, Conn>>,
}

impl Indexes {
    fn lookup(&self, kind: Kind, target: i64) -> Result<&Conn> {
        let conn = match kind {
            Kind::Conn => self.conns.get(&target),
            Kind::User => self.users.get(&target),
            Kind::Group => return Err(Error::InvalidSessionKind),
        };
        conn.ok_or(Error::NotFoundSession)
    }
}

#[derive(Default)]
pub struct Session {
    inner: RwLock<Indexes>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Indexes> {
        // A poisoned registry lock means a panic mid-update; propagating the
        // guard keeps readers consistent with whatever state survived.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Indexes> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Enters the connection into every axis it belongs to.
    pub fn add_conn(&self, conn: Conn) {
        let mut ix = self.write();

        let (cid, uid, groups) = (conn.id(), conn.uid(), conn.groups());

        ix.conns.insert(cid, Arc::clone(&conn));

        if uid != 0 {
            ix.users.insert(uid, Arc::clone(&conn));
        }

        for gid in groups {
            ix.group_conns
                .entry(gid)
                .or_default()
                .insert(cid, Arc::clone(&conn));
            ix.groups.insert(cid, Arc::clone(&conn));
        }
    }

    /// Removes the connection from every axis, normalizing empty groups.
    pub fn rem_conn(&self, conn: &Conn) {
        let mut ix = self.write();

        let (cid, uid, groups) = (conn.id(), conn.uid(), conn.groups());

        ix.conns.remove(&cid);

        if uid != 0 {
            ix.users.remove(&uid);
        }

        for gid in groups {
            if let Some(members) = ix.group_conns.get_mut(&gid) {
                members.remove(&cid);
                if members.is_empty() {
                    ix.group_conns.remove(&gid);
                }
            }
        }

        ix.groups.remove(&cid);
    }

    pub fn has(&self, kind: Kind, target: i64) -> Result<bool> {
        let ix = self.read();

        Ok(match kind {
            Kind::Conn => ix.conns.contains_key(&target),
            Kind::User => ix.users.contains_key(&target),
            Kind::Group => ix.group_conns.contains_key(&target),
        })
    }

    /// Binds `uid` to the connection `cid`. An existing holder of the uid is
    /// unbound first and reported back so the caller can force-close it.
    pub fn bind(&self, cid: i64, uid: i64) -> Result<Option<Conn>> {
        let mut ix = self.write();

        let conn = Arc::clone(ix.lookup(Kind::Conn, cid)?);

        let old_uid = conn.uid();
        if old_uid != 0 {
            if old_uid == uid {
                return Ok(None);
            }
            ix.users.remove(&old_uid);
        }

        let displaced = ix.users.remove(&uid);
        if let Some(prior) = &displaced {
            prior.unbind();
        }

        conn.bind(uid);
        ix.users.insert(uid, conn);

        Ok(displaced)
    }

    /// Unbinds the user, returning the connection id it was bound to.
    pub fn unbind(&self, uid: i64) -> Result<i64> {
        let mut ix = self.write();

        let conn = Arc::clone(ix.lookup(Kind::User, uid)?);

        conn.unbind();
        ix.users.remove(&uid);

        Ok(conn.id())
    }

    pub fn bind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        let mut ix = self.write();

        let conn = Arc::clone(ix.lookup(Kind::Conn, cid)?);

        let current: HashSet<i64> = conn.groups().into_iter().collect();
        for gid in groups {
            if current.contains(gid) {
                continue;
            }
            ix.group_conns
                .entry(*gid)
                .or_default()
                .insert(cid, Arc::clone(&conn));
            ix.groups.insert(cid, Arc::clone(&conn));
            conn.bind_group(*gid);
        }

        Ok(())
    }

    /// Unbinds the listed groups; an empty list unbinds every group the
    /// connection is in.
    pub fn unbind_groups(&self, cid: i64, groups: &[i64]) -> Result<()> {
        let mut ix = self.write();

        let conn = Arc::clone(ix.lookup(Kind::Conn, cid)?);

        let member_of: HashSet<i64> = conn.groups().into_iter().collect();
        let targets: Vec<i64> = if groups.is_empty() {
            member_of.iter().copied().collect()
        } else {
            groups.to_vec()
        };

        for gid in targets {
            if !member_of.contains(&gid) {
                continue;
            }
            if let Some(members) = ix.group_conns.get_mut(&gid) {
                members.remove(&cid);
                if members.is_empty() {
                    ix.group_conns.remove(&gid);
                }
            }
            conn.unbind_group(gid);
            if conn.groups().is_empty() {
                ix.groups.remove(&cid);
            }
        }

        Ok(())
    }

    /// Resolves the connection id behind a `Conn`/`User` target.
    pub fn conn_id(&self, kind: Kind, target: i64) -> Result<i64> {
        Ok(self.read().lookup(kind, target)?.id())
    }

    pub fn local_ip(&self, kind: Kind, target: i64) -> Result<IpAddr> {
        self.read().lookup(kind, target)?.local_ip()
    }

    pub fn local_addr(&self, kind: Kind, target: i64) -> Result<SocketAddr> {
        self.read().lookup(kind, target)?.local_addr()
    }

    pub fn remote_ip(&self, kind: Kind, target: i64) -> Result<IpAddr> {
        self.read().lookup(kind, target)?.remote_ip()
    }

    pub fn remote_addr(&self, kind: Kind, target: i64) -> Result<SocketAddr> {
        self.read().lookup(kind, target)?.remote_addr()
    }

    /// Closes the session's underlying connection. The close callback will
    /// eventually call [`Self::rem_conn`]; the lock is dropped first so the
    /// callback cannot deadlock against the registry.
    pub fn close(&self, kind: Kind, target: i64, force: bool) -> Result<()> {
        let conn = {
            let ix = self.read();
            Arc::clone(ix.lookup(kind, target)?)
        };

        conn.close(force)
    }

    /// Synchronous send; for `Group`, writes to every member.
    pub fn send(&self, kind: Kind, target: i64, msg: &[u8]) -> Result<()> {
        let ix = self.read();

        match kind {
            Kind::Conn | Kind::User => ix.lookup(kind, target)?.send(msg),
            Kind::Group => {
                let members = ix.group_conns.get(&target).ok_or(Error::NotFoundSession)?;
                for conn in members.values() {
                    let _ = conn.send(msg);
                }
                Ok(())
            },
        }
    }

    /// Asynchronous push; for `Group`, enqueues on every member.
    pub fn push(&self, kind: Kind, target: i64, msg: &[u8]) -> Result<()> {
        let ix = self.read();

        match kind {
            Kind::Conn | Kind::User => ix.lookup(kind, target)?.push(msg),
            Kind::Group => {
                let members = ix.group_conns.get(&target).ok_or(Error::NotFoundSession)?;
                for conn in members.values() {
                    let _ = conn.push(msg);
                }
                Ok(())
            },
        }
    }

    /// Pushes to every listed target, deduplicating connections across
    /// groups. Missing targets are skipped silently; the returned count is
    /// the number of successful enqueues.
    pub fn multicast(&self, kind: Kind, targets: &[i64], msg: &[u8]) -> Result<i64> {
        if targets.is_empty() {
            return Ok(0);
        }

        let ix = self.read();
        let mut n = 0;

        if kind == Kind::Group {
            let mut seen: HashSet<i64> = HashSet::new();
            for gid in targets {
                let Some(members) = ix.group_conns.get(gid) else {
                    continue;
                };
                for (cid, conn) in members {
                    if seen.insert(*cid) && conn.push(msg).is_ok() {
                        n += 1;
                    }
                }
            }
            return Ok(n);
        }

        let conns = match kind {
            Kind::Conn => &ix.conns,
            Kind::User => &ix.users,
            Kind::Group => unreachable!(),
        };

        for target in targets {
            let Some(conn) = conns.get(target) else {
                continue;
            };
            if conn.push(msg).is_ok() {
                n += 1;
            }
        }

        Ok(n)
    }

    /// Pushes to the whole index of the given kind.
    pub fn broadcast(&self, kind: Kind, msg: &[u8]) -> Result<i64> {
        let ix = self.read();

        let conns = match kind {
            Kind::Conn => &ix.conns,
            Kind::User => &ix.users,
            Kind::Group => &ix.groups,
        };

        let mut n = 0;
        for conn in conns.values() {
            if conn.push(msg).is_ok() {
                n += 1;
            }
        }

        Ok(n)
    }

    pub fn stat(&self, kind: Kind) -> Result<i64> {
        let ix = self.read();

        Ok(match kind {
            Kind::Conn => ix.conns.len() as i64,
            Kind::User => ix.users.len() as i64,
            Kind::Group => ix.groups.len() as i64,
        })
    }
}
