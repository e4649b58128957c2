// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, collections::VecDeque, sync::atomic::{AtomicI32, Ordering}};

use bytes::Bytes;

use crate::buffer::writer::{Writer, WriterPool};

/// Which end of the buffer a mount or malloc lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Whence {
    Head,
    #[default]
    Tail,
}

enum Node {
    /// A byte slice adopted without copy.
    Block(Bytes),
    /// A pooled block filled through [`Writer`].
    Writer(Writer),
    /// A nested buffer spliced in whole.
    Buffer(NocopyBuffer),
}

impl Node {
    fn len(&self) -> usize {
        match self {
            Node::Block(b) => b.len(),
            Node::Writer(w) => w.len(),
            Node::Buffer(b) => b.len(),
        }
    }
}

/// Segmented byte graph: a deque of blocks, pooled writers and nested
/// buffers. Concatenation is pointer splicing; the wire image is the
/// depth-first, head-to-tail traversal.
///
/// The buffer is a linear value: whoever holds it mutates it, and handing
/// it to a connection's `send` transfers ownership together with the duty
/// to release. Pooled writers return to their pool on release (or on drop,
/// so an abandoned buffer cannot leak pool blocks). [`Self::delay`] arms a
/// countdown for call sites that release once per planned use.
pub struct NocopyBuffer {
    nodes: VecDeque<Node>,
    len: Cell<i64>,
    delay: AtomicI32,
}

impl Default for NocopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl NocopyBuffer {
    pub fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
            len: Cell::new(-1),
            delay: AtomicI32::new(0),
        }
    }

    /// Total byte length, recomputed lazily after mutation.
    pub fn len(&self) -> usize {
        let cached = self.len.get();
        if cached >= 0 {
            return cached as usize;
        }

        let size: usize = self.nodes.iter().map(Node::len).sum();
        self.len.set(size as i64);
        size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adopts a byte slice without copying.
    pub fn mount(&mut self, block: impl Into<Bytes>) {
        self.mount_at(block, Whence::Tail);
    }

    pub fn mount_at(&mut self, block: impl Into<Bytes>, whence: Whence) {
        self.push(Node::Block(block.into()), whence);
    }

    /// Splices a whole buffer in as one node.
    pub fn mount_buffer(&mut self, buf: NocopyBuffer) {
        self.mount_buffer_at(buf, Whence::Tail);
    }

    pub fn mount_buffer_at(&mut self, buf: NocopyBuffer, whence: Whence) {
        self.push(Node::Buffer(buf), whence);
    }

    /// Allocates a pooled writer sized to the next class above `cap` and
    /// splices it in. The returned reference stays valid until the next
    /// mutation of the buffer.
    pub fn malloc(&mut self, cap: usize) -> &mut Writer {
        self.malloc_at(cap, Whence::Tail)
    }

    pub fn malloc_at(&mut self, cap: usize, whence: Whence) -> &mut Writer {
        let writer = WriterPool::global().get(cap);
        self.push(Node::Writer(writer), whence);

        let node = match whence {
            Whence::Head => self.nodes.front_mut(),
            Whence::Tail => self.nodes.back_mut(),
        };
        match node {
            Some(Node::Writer(w)) => w,
            _ => unreachable!("writer node was just pushed"),
        }
    }

    /// Depth-first, head-to-tail traversal over every leaf slice. Stops
    /// early when `f` returns false; the emitted byte stream is exactly the
    /// wire image.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a [u8]) -> bool) -> bool {
        for node in &self.nodes {
            let keep_going = match node {
                Node::Block(b) => f(b),
                Node::Writer(w) => f(w.bytes()),
                Node::Buffer(b) => b.visit(f),
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    /// Flattens the graph. A single adopted block is returned without copy.
    pub fn bytes(&self) -> Bytes {
        match self.nodes.len() {
            0 => Bytes::new(),
            1 => match &self.nodes[0] {
                Node::Block(b) => b.clone(),
                Node::Writer(w) => Bytes::copy_from_slice(w.bytes()),
                Node::Buffer(b) => b.bytes(),
            },
            _ => {
                let mut out = Vec::with_capacity(self.len());
                self.visit(&mut |chunk| {
                    out.extend_from_slice(chunk);
                    true
                });
                Bytes::from(out)
            },
        }
    }

    /// Arms a release countdown: the next `n - 1` calls to [`Self::release`]
    /// only decrement, the n-th frees.
    pub fn delay(&self, n: i32) {
        self.delay.store(n, Ordering::Release);
    }

    /// Counted release. Frees the graph once the delay countdown reaches
    /// zero; releasing an already-freed buffer is a no-op.
    pub fn release(&mut self) {
        if self.delay.fetch_sub(1, Ordering::AcqRel) - 1 <= 0 {
            self.free();
        }
    }

    /// Unconditional release regardless of the delay countdown.
    pub fn release_force(&mut self) {
        self.free();
    }

    fn free(&mut self) {
        // Dropping the nodes returns every pooled writer to its pool and
        // recursively frees nested buffers.
        self.nodes.clear();
        self.len.set(-1);
        self.delay.store(0, Ordering::Release);
    }

    fn push(&mut self, node: Node, whence: Whence) {
        self.len.set(-1);
        match whence {
            Whence::Head => self.nodes.push_front(node),
            Whence::Tail => self.nodes.push_back(node),
        }
    }
}

impl std::fmt::Debug for NocopyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NocopyBuffer")
            .field("nodes", &self.nodes.len())
            .field("len", &self.len())
            .finish()
    }
}
