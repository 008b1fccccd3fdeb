use std::sync::Arc;

use super::Buffer::RingBuffer;
use crate::Core::alloc::{Allocator, HeapAllocator};
use crate::MSG::MsgError;

impl RingBuffer {
    /// Create a ring buffer of `size` bytes backed by `allocator`.
    pub fn new(size: usize, allocator: Arc<dyn Allocator>) -> Result<Self, MsgError> {
        if size == 0 {
            return Err(MsgError::ZeroCapacity);
        }

        let storage = allocator
            .allocate(size)
            .ok_or(MsgError::AllocationFailed { size })?;

        // an allocator handing back a short block would break every offset below
        if storage.len() != size {
            allocator.free(storage);
            return Err(MsgError::AllocationFailed { size });
        }

        Ok(Self {
            storage: Some(storage),
            allocator: Some(allocator),
            head: 0,
            tail: 0,
            read_head: 0,
            write_head: 0,
            wrap_mark: size,
            pending_mark: None,
        })
    }

    /// Create a ring buffer backed by the process heap.
    pub fn with_heap(size: usize) -> Result<Self, MsgError> {
        Self::new(size, Arc::new(HeapAllocator))
    }

    /// Total capacity of the arena in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.len())
    }

    /// True for a buffer without storage (default-constructed or moved-from).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.storage.is_none()
    }

    /// Committed bytes not yet read, counting both sides of a wrap.
    pub fn read_size(&self) -> usize {
        if self.write_head >= self.head {
            self.write_head - self.head
        } else {
            self.wrap_mark.saturating_sub(self.head) + self.write_head
        }
    }

    /// Whether an `n`-byte contiguous read would currently succeed.
    pub fn read_size_contiguous(&self, n: usize) -> bool {
        !self.is_null() && self.locate_read(n).is_some()
    }

    /// Free bytes, counting both sides of a wrap. Not all of them are
    /// necessarily reachable by a single contiguous reservation.
    pub fn write_size(&self) -> usize {
        if self.read_head > self.tail {
            self.read_head - self.tail - 1
        } else {
            (self.size() - self.tail) + self.read_head.saturating_sub(1)
        }
    }

    /// Whether an `n`-byte contiguous write would currently succeed.
    pub fn write_size_contiguous(&self, n: usize) -> bool {
        !self.is_null() && self.locate_write(n).is_some()
    }

    /// Reserve `n` contiguous bytes for writing.
    ///
    /// Returns `None` if no contiguous region of `n` bytes exists without
    /// touching unread data; the caller is expected to `revert_write` the
    /// transaction in that case. Reserved bytes stay invisible to readers until
    /// [`RingBuffer::update_write`].
    pub fn reserve_write(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.is_null() {
            return None;
        }
        if n == 0 {
            return Some(Default::default());
        }

        let (start, wrapped_at) = self.locate_write(n)?;
        if wrapped_at.is_some() {
            self.pending_mark = wrapped_at;
        }
        self.tail = start + n;

        self.storage.as_deref_mut()?.get_mut(start..start + n)
    }

    /// Commit every reservation made since the last commit or revert.
    pub fn update_write(&mut self) {
        self.write_head = self.tail;
        if let Some(mark) = self.pending_mark.take() {
            self.wrap_mark = mark;
        }
    }

    /// Abandon every reservation made since the last commit or revert.
    pub fn revert_write(&mut self) {
        self.tail = self.write_head;
        self.pending_mark = None;
        self.rewind_if_drained();
    }

    /// Reserve the next `n` committed bytes for reading.
    ///
    /// Readers must consume records with the same reservation sizes the writer
    /// produced them with; a request that would cross the wrap mark fails.
    pub fn reserve_read(&mut self, n: usize) -> Option<&[u8]> {
        if self.is_null() {
            return None;
        }
        if n == 0 {
            return Some(Default::default());
        }

        let start = self.locate_read(n)?;
        self.head = start + n;

        self.storage.as_deref()?.get(start..start + n)
    }

    /// Release every byte read since the last commit or revert.
    pub fn update_read(&mut self) {
        self.read_head = self.head;
        self.rewind_if_drained();
    }

    /// Put back every byte read since the last commit or revert.
    pub fn revert_read(&mut self) {
        self.head = self.read_head;
        self.rewind_if_drained();
    }

    /// Tentative read cursor, to return to with [`RingBuffer::rewind_read`].
    pub(crate) fn read_cursor(&self) -> usize {
        self.head
    }

    /// Move the tentative read cursor back to a position obtained from
    /// [`RingBuffer::read_cursor`] within the current read transaction.
    pub(crate) fn rewind_read(&mut self, to: usize) {
        self.head = to;
    }

    /// Rewind all cursors to the start of the arena, dropping any content.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.read_head = 0;
        self.write_head = 0;
        self.wrap_mark = self.size();
        self.pending_mark = None;
    }

    /// Snapshot of `(head, tail, read_head, write_head)` for diagnostics.
    pub fn cursors(&self) -> (usize, usize, usize, usize) {
        (self.head, self.tail, self.read_head, self.write_head)
    }

    /// Move every cursor back to offset 0 once nothing is stored and no
    /// transaction is open, so the whole arena is one contiguous free region
    /// again.
    fn rewind_if_drained(&mut self) {
        let idle = self.head == self.read_head && self.tail == self.write_head;
        if idle && self.read_head == self.write_head && self.write_head != 0 {
            self.reset();
        }
    }

    /// Where an `n`-byte write would land, plus the wrap offset it would record.
    fn locate_write(&self, n: usize) -> Option<(usize, Option<usize>)> {
        let capacity = self.size();
        let mut start = self.tail;
        let mut wrapped_at = None;

        if start >= self.read_head {
            // free space is [tail, capacity) followed by [0, read_head - 1)
            if capacity - start >= n {
                return Some((start, None));
            }
            if self.read_head == 0 {
                return None;
            }
            wrapped_at = Some(start);
            start = 0;
        }

        // tail may never reach read_head
        if self.read_head - start > n {
            Some((start, wrapped_at))
        } else {
            None
        }
    }

    /// Where an `n`-byte read would start.
    fn locate_read(&self, n: usize) -> Option<usize> {
        let mut start = self.head;

        if start > self.write_head {
            // readable data is [head, wrap_mark) followed by [0, write_head)
            if start < self.wrap_mark {
                return (self.wrap_mark - start >= n).then_some(start);
            }
            start = 0;
        }

        (self.write_head - start >= n).then_some(start)
    }
}
