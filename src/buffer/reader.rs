// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    buffer::writer::ByteOrder,
    errors::{Error, Result},
};

/// Position-tracking view over a decoded frame slab.
///
/// Route decoders seek to a known offset (from the frame start for
/// variable payloads, from the frame end for fixed trailing fields) and
/// read fixed-width values from there. Every failure is
/// [`Error::InvalidMessage`]; a decoder never panics on short input.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn seek_start(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::InvalidMessage);
        }
        self.pos = offset;
        Ok(())
    }

    /// Seeks to `back` bytes before the end of the slab.
    pub fn seek_end(&mut self, back: usize) -> Result<()> {
        if back > self.data.len() {
            return Err(Error::InvalidMessage);
        }
        self.pos = self.data.len() - back;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::InvalidMessage);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self, order: ByteOrder) -> Result<u16> {
        let raw: [u8; 2] = self.take(2)?.try_into().map_err(|_| Error::InvalidMessage)?;
        Ok(match order {
            ByteOrder::Big => u16::from_be_bytes(raw),
            ByteOrder::Little => u16::from_le_bytes(raw),
        })
    }

    pub fn read_u32(&mut self, order: ByteOrder) -> Result<u32> {
        let raw: [u8; 4] = self.take(4)?.try_into().map_err(|_| Error::InvalidMessage)?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }

    pub fn read_u64(&mut self, order: ByteOrder) -> Result<u64> {
        let raw: [u8; 8] = self.take(8)?.try_into().map_err(|_| Error::InvalidMessage)?;
        Ok(match order {
            ByteOrder::Big => u64::from_be_bytes(raw),
            ByteOrder::Little => u64::from_le_bytes(raw),
        })
    }

    pub fn read_i64(&mut self, order: ByteOrder) -> Result<i64> {
        Ok(self.read_u64(order)? as i64)
    }

    pub fn read_i64s(&mut self, order: ByteOrder, count: usize) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_i64(order)?);
        }
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn read_str(&mut self, len: usize) -> Result<&'a str> {
        std::str::from_utf8(self.take(len)?).map_err(|_| Error::InvalidMessage)
    }
}
