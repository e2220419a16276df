use super::{DEFAULT_CAPACITY, grown_capacity, reallocate};
use crate::error::{Error, Result};

/// Growable byte arena with a read cursor and a write cursor.
///
/// Bytes in `[read_pos, write_pos)` are unread. A single producer appends
/// at `write_pos` while a single consumer drains from `read_pos`; the owner
/// serializes the two with a lock.
///
/// Invariant: `0 <= read_pos <= write_pos <= capacity`.
pub struct InputBuffer {
    bytes: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// The unread bytes, without consuming them.
    pub fn unread_bytes(&self) -> &[u8] {
        &self.bytes[self.read_pos..self.write_pos]
    }

    /// Appends `data` after the last unread byte.
    ///
    /// Space is found in this order: the free tail, the space reclaimed by
    /// compacting, then a larger arena.
    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        if data.len() > self.capacity() - self.write_pos {
            let needed = self.available() + data.len();

            if needed <= self.capacity() {
                self.compact();
            } else {
                let capacity = grown_capacity(self.capacity(), needed);
                self.bytes = reallocate(self.unread_bytes(), capacity);
                self.write_pos = self.available();
                self.read_pos = 0;
            }
        }

        self.bytes[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }

    /// Consumes one byte, or returns `None` when nothing is unread.
    pub fn take(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        let byte = self.bytes[self.read_pos];
        self.read_pos += 1;
        Some(byte)
    }

    /// Un-consumes the last byte read. Returns `false` at offset zero.
    pub fn unread_byte(&mut self) -> bool {
        if self.read_pos == 0 {
            return false;
        }

        self.read_pos -= 1;
        true
    }

    /// Places `data` in front of the current read position.
    ///
    /// When there is not enough room behind `read_pos`, the unread tail is
    /// shifted forward to make some.
    ///
    /// # Errors
    ///
    /// [`Error::Overflow`] when `data` plus the unread tail exceeds the
    /// capacity. Pushback never grows the arena.
    pub fn unread(&mut self, data: &[u8]) -> Result<()> {
        if data.len() <= self.read_pos {
            let start = self.read_pos - data.len();
            self.bytes[start..self.read_pos].copy_from_slice(data);
            self.read_pos = start;
            return Ok(());
        }

        let unread = self.available();
        if data.len() + unread > self.capacity() {
            return Err(Error::Overflow {
                pushed: data.len(),
                unread,
                capacity: self.capacity(),
            });
        }

        self.bytes
            .copy_within(self.read_pos..self.write_pos, data.len());
        self.bytes[..data.len()].copy_from_slice(data);
        self.read_pos = 0;
        self.write_pos = data.len() + unread;

        Ok(())
    }

    /// Moves the unread bytes to offset zero.
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }

        self.bytes.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
