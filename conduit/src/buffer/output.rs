use super::{DEFAULT_CAPACITY, grown_capacity, reallocate};

/// Growable byte arena of bytes waiting for transmission.
///
/// Bytes in `[0, limit)` are pending. After a socket accepted only part of
/// them, [`retain`](Self::retain) keeps the unsent tail at the front so the
/// next write resumes exactly where the previous one stopped.
pub struct OutputBuffer {
    bytes: Box<[u8]>,
    limit: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            limit: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Number of pending bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn pending(&self) -> &[u8] {
        &self.bytes[..self.limit]
    }

    /// Appends `data` to the pending bytes, growing the arena if needed.
    pub fn write(&mut self, data: &[u8]) {
        let needed = self.limit + data.len();

        if needed > self.capacity() {
            let capacity = grown_capacity(self.capacity(), needed);
            self.bytes = reallocate(self.pending(), capacity);
        }

        self.bytes[self.limit..needed].copy_from_slice(data);
        self.limit = needed;
    }

    /// Keeps the last `remaining` pending bytes and drops the sent prefix.
    ///
    /// # Panics
    ///
    /// Panics if `remaining` is larger than the pending byte count.
    pub fn retain(&mut self, remaining: usize) {
        assert!(
            remaining <= self.limit,
            "cannot retain {remaining} bytes out of {} pending",
            self.limit
        );

        self.bytes.copy_within(self.limit - remaining..self.limit, 0);
        self.limit = remaining;
    }

    pub fn clear(&mut self) {
        self.limit = 0;
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_grows_past_capacity() {
        let mut buffer = OutputBuffer::with_capacity(2);
        buffer.write(b"hello");
        buffer.write(b" world");

        assert_eq!(buffer.pending(), b"hello world");
        assert!(buffer.capacity() >= 11);
    }

    #[test]
    fn retain_keeps_unsent_tail() {
        let mut buffer = OutputBuffer::with_capacity(16);
        buffer.write(b"abcdef");

        buffer.retain(2);

        assert_eq!(buffer.limit(), 2);
        assert_eq!(buffer.pending(), b"ef");
    }

    #[test]
    fn retain_zero_empties() {
        let mut buffer = OutputBuffer::new();
        buffer.write(b"abc");
        buffer.retain(0);
        assert!(buffer.is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot retain")]
    fn retain_more_than_pending_panics() {
        let mut buffer = OutputBuffer::new();
        buffer.write(b"abc");
        buffer.retain(4);
    }
}
