// Licensed under the Apache-2.0 license

//! Fixed-capacity byte buffers shared between foreground and interrupt
//! context.
//!
//! A [`TransferBuffer`] is either [`BufferState::Idle`] and owned by the
//! foreground, or [`BufferState::InFlight`] and owned by the interrupt
//! dispatcher until the transfer completes. `committed_size > 0` is the
//! in-flight marker.

use crate::i2c::common::Error;
use heapless::Vec;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    InFlight,
}

pub struct TransferBuffer<const N: usize> {
    data: [u8; N],
    write_index: usize,
    committed_size: usize,
}

impl<const N: usize> Default for TransferBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TransferBuffer<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            write_index: 0,
            committed_size: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    #[must_use]
    pub fn committed_size(&self) -> usize {
        self.committed_size
    }

    #[must_use]
    pub fn state(&self) -> BufferState {
        if self.committed_size > 0 {
            BufferState::InFlight
        } else {
            BufferState::Idle
        }
    }

    /// Append at the write index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] when the buffer is full.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        let slot = self
            .data
            .get_mut(self.write_index)
            .ok_or(Error::CapacityExceeded)?;
        *slot = byte;
        self.write_index += 1;
        Ok(())
    }

    #[must_use]
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Bytes written so far.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        self.data.get(..self.write_index).unwrap_or(&[])
    }

    /// Hand the staged bytes to a master transmit.
    ///
    /// Freezes the size and consumes the first byte, which goes out with
    /// the start condition. The remaining bytes are counted down by
    /// [`next_countdown`](Self::next_countdown).
    pub fn commit_countdown(&mut self) -> Option<u8> {
        if self.write_index == 0 {
            return None;
        }
        let first = self.byte_at(0)?;
        self.committed_size = self.write_index;
        self.write_index -= 1;
        Some(first)
    }

    /// Next byte of a master transmit, or `None` once exhausted.
    pub fn next_countdown(&mut self) -> Option<u8> {
        if self.write_index == 0 {
            return None;
        }
        let byte = self.byte_at(self.committed_size.checked_sub(self.write_index)?)?;
        self.write_index -= 1;
        Some(byte)
    }

    /// Freeze a slave response for replay from its first byte.
    pub fn commit_replay(&mut self) {
        self.committed_size = self.write_index;
        self.write_index = 0;
    }

    /// Next byte of a slave response, or `None` once exhausted.
    pub fn next_replay(&mut self) -> Option<u8> {
        if self.write_index >= self.committed_size {
            return None;
        }
        let byte = self.byte_at(self.write_index)?;
        self.write_index += 1;
        Some(byte)
    }

    /// Expect `size` incoming bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `size` does not fit.
    pub fn arm(&mut self, size: usize) -> Result<(), Error> {
        if size > N {
            return Err(Error::CapacityExceeded);
        }
        self.committed_size = size;
        self.write_index = 0;
        Ok(())
    }

    /// Back to idle. Contents are left in place.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.committed_size = 0;
    }

    pub fn writer(&mut self) -> ResponseWriter<'_> {
        ResponseWriter::new(&mut self.data, &mut self.write_index)
    }
}

/// Append-only view handed to a [`Requester`](crate::i2c::Requester).
pub struct ResponseWriter<'a> {
    data: &'a mut [u8],
    len: &'a mut usize,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(data: &'a mut [u8], len: &'a mut usize) -> Self {
        Self { data, len }
    }

    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] when the response buffer is full.
    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        let slot = self.data.get_mut(*self.len).ok_or(Error::CapacityExceeded)?;
        *slot = byte;
        *self.len += 1;
        Ok(())
    }

    /// Writes all of `bytes` or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `bytes` does not fit.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > self.remaining() {
            return Err(Error::CapacityExceeded);
        }
        bytes.iter().try_for_each(|&byte| self.write(byte))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        *self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self.len == 0
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(*self.len)
    }
}

/// Consumer-side copy of the last delivered message.
///
/// Single-shot: once the last byte is popped the cursor is empty until the
/// next delivery refills it.
pub struct ReadCursor<const N: usize> {
    data: Vec<u8, N>,
    read_index: usize,
}

impl<const N: usize> Default for ReadCursor<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadCursor<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            read_index: 0,
        }
    }

    /// Replace the contents with `bytes`, truncated to capacity.
    pub fn fill(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.read_index = 0;
        for &byte in bytes {
            if self.data.push(byte).is_err() {
                break;
            }
        }
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.data.get(self.read_index).copied()?;
        self.read_index += 1;
        if self.read_index == self.data.len() {
            self.clear();
        }
        Some(byte)
    }

    #[must_use]
    pub fn has_unread(&self) -> bool {
        self.read_index < self.data.len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_index)
    }

    /// Length of the delivered message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_index = 0;
    }
}
