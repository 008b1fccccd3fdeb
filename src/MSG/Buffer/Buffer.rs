// This is the byte ring shared by an endpoint's send and receive queues

use crate::Core::alloc::Allocator;

use std::sync::Arc;

/// A single-producer/single-consumer circular byte store with a contiguous
/// reservation contract.
///
/// The buffer owns one allocation obtained from an injected [`Allocator`].
/// Every reservation (`reserve_write(n)` / `reserve_read(n)`) yields `n`
/// physically contiguous bytes or fails; a record never straddles the end of
/// the arena. When the tail of the arena is too short, the writer retries from
/// offset 0 and remembers where it left off (the wrap mark) so the reader can
/// follow.
///
/// ### Cursor Design:
/// - **Writer**: `tail` is the tentative write cursor, `write_head` the last
///   committed one. Bytes in `[write_head, tail)` are invisible to readers until
///   `update_write`; `revert_write` discards them.
/// - **Reader**: `head` is the tentative read cursor, `read_head` the last
///   committed one. `revert_read` lets a reader peek at a record and put it
///   back.
/// - The writer never lets `tail` reach `read_head` from behind, so one byte
///   always separates the two and `head == write_head` unambiguously means
///   "nothing to read".
/// - Once drained with no transaction open, every cursor returns to 0, so an
///   empty buffer always offers its whole capacity as one region.
pub struct RingBuffer {
    /// Backing allocation. `None` for a null (default or moved-from) buffer.
    pub(crate) storage: Option<Box<[u8]>>,

    /// Capability the storage came from and goes back to on drop.
    pub(crate) allocator: Option<Arc<dyn Allocator>>,

    /// Tentative read cursor.
    pub(crate) head: usize,

    /// Tentative write cursor.
    pub(crate) tail: usize,

    /// Read cursor as of the last `update_read`.
    pub(crate) read_head: usize,

    /// Write cursor as of the last `update_write`.
    pub(crate) write_head: usize,

    /// Offset at which committed data stops before continuing at offset 0.
    /// Equal to the capacity when the writer has never wrapped.
    pub(crate) wrap_mark: usize,

    /// Wrap offset recorded by the write transaction in progress.
    pub(crate) pending_mark: Option<usize>,
}

impl Default for RingBuffer {
    /// The null buffer: no storage, every non-empty reservation fails.
    fn default() -> Self {
        Self {
            storage: None,
            allocator: None,
            head: 0,
            tail: 0,
            read_head: 0,
            write_head: 0,
            wrap_mark: 0,
            pending_mark: None,
        }
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        if let (Some(storage), Some(allocator)) = (self.storage.take(), self.allocator.take()) {
            allocator.free(storage);
        }
    }
}
