//! Owned byte arenas backing every connection.
//!
//! - [`InputBuffer`] holds bytes delivered by a backend until the
//!   application drains them, and supports pushing consumed bytes back.
//! - [`OutputBuffer`] accumulates bytes to send and keeps the unsent tail
//!   after a partial socket write.
//!
//! Both grow by allocating a larger arena, copying the live bytes and
//! replacing the old one. They never shrink.

mod input;
mod output;

pub use input::InputBuffer;
pub use output::OutputBuffer;

/// Initial capacity of freshly created buffers.
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Allocates a zeroed arena of `capacity` bytes and copies `live` to its front.
fn reallocate(live: &[u8], capacity: usize) -> Box<[u8]> {
    debug_assert!(live.len() <= capacity);

    let mut grown = vec![0u8; capacity].into_boxed_slice();
    grown[..live.len()].copy_from_slice(live);
    grown
}

/// Next capacity able to hold `needed` bytes, doubling from `current`.
fn grown_capacity(current: usize, needed: usize) -> usize {
    let mut capacity = current.max(64);
    while capacity < needed {
        capacity *= 2;
    }
    capacity
}
