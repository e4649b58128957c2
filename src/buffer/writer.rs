// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{mem, sync::Mutex};

use once_cell::sync::Lazy;

/// Size classes for pooled writers. `malloc` rounds the requested capacity
/// up to the next class; requests beyond the largest class get an unpooled
/// allocation.
pub(crate) const POOL_CLASSES: [usize; 9] =
    [32, 64, 128, 256, 512, 1024, 2048, 4096, 10240];

static DEFAULT_WRITER_POOL: Lazy<WriterPool> = Lazy::new(WriterPool::new);

/// Endianness selector for multi-byte writes and reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Process-wide pool of byte blocks, one bucket per size class.
pub struct WriterPool {
    buckets: Vec<Mutex<Vec<Vec<u8>>>>,
}

impl WriterPool {
    fn new() -> Self {
        Self {
            buckets: POOL_CLASSES.iter().map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    pub fn global() -> &'static WriterPool {
        &DEFAULT_WRITER_POOL
    }

    /// Takes a writer sized to the next class at or above `cap`.
    pub fn get(&'static self, cap: usize) -> Writer {
        for (i, class) in POOL_CLASSES.iter().enumerate() {
            if cap <= *class {
                let recycled = self
                    .buckets[i]
                    .lock()
                    .ok()
                    .and_then(|mut bucket| bucket.pop());
                let buf = recycled.unwrap_or_else(|| Vec::with_capacity(*class));
                return Writer { buf, pool: Some(self) };
            }
        }

        // Oversized blocks never come back to the pool.
        Writer { buf: Vec::with_capacity(cap), pool: None }
    }

    fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        for (i, class) in POOL_CLASSES.iter().enumerate() {
            if buf.capacity() == *class {
                if let Ok(mut bucket) = self.buckets[i].lock() {
                    bucket.push(buf);
                }
                return;
            }
        }
        // Grown past its class: dropped, reuse is sacrificed.
    }

    #[cfg(test)]
    pub(crate) fn idle(&self, class: usize) -> usize {
        POOL_CLASSES
            .iter()
            .position(|c| *c == class)
            .and_then(|i| self.buckets[i].lock().ok().map(|b| b.len()))
            .unwrap_or(0)
    }
}

/// An append-only block of bytes obtained from [`WriterPool`].
///
/// All write methods are total: writing past the pooled capacity grows the
/// block (and forfeits pool reuse on release), it never truncates or fails.
/// The block returns to its pool when the writer is dropped.
pub struct Writer {
    buf: Vec<u8>,
    pool: Option<&'static WriterPool>,
}

impl Writer {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, order: ByteOrder, v: u16) {
        match order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn write_u32(&mut self, order: ByteOrder, v: u32) {
        match order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn write_u64(&mut self, order: ByteOrder, v: u64) {
        match order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn write_i64(&mut self, order: ByteOrder, v: i64) {
        match order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn write_i64s(&mut self, order: ByteOrder, vals: &[i64]) {
        for v in vals {
            self.write_i64(order, *v);
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool {
            pool.put(mem::take(&mut self.buf));
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("len", &self.buf.len())
            .field("cap", &self.buf.capacity())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}
