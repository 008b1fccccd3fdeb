// Byte allocation capability consumed by every ring buffer.
//
// Buffers never reach for a global allocator table: the capability is handed
// to them at construction and the block goes back to the same capability on
// drop.

mod debug;
mod getters;

// Use parking_lot's Mutex for better performance
use parking_lot::Mutex;

/// A minimal allocate/free capability.
///
/// Implementations hand out plain byte blocks; no alignment beyond byte
/// alignment and no zeroing is required by the messaging core.
pub trait Allocator: Send + Sync {
    /// Allocate a block of exactly `size` bytes, or `None` if the request
    /// cannot be satisfied.
    fn allocate(&self, size: usize) -> Option<Box<[u8]>>;

    /// Return a block previously obtained from [`Allocator::allocate`].
    fn free(&self, block: Box<[u8]>);
}

/// Allocator backed by the process heap.
///
/// Uses `try_reserve_exact` so that exhaustion is reported as `None`
/// instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl HeapAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        let mut block = Vec::new();
        block.try_reserve_exact(size).ok()?;
        block.resize(size, 0u8);
        Some(block.into_boxed_slice())
    }

    fn free(&self, block: Box<[u8]>) {
        drop(block);
    }
}

/// Snapshot of the accounting kept by a [`TrackingAllocator`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Bytes currently handed out.
    pub live_bytes: usize,
    /// Blocks currently handed out.
    pub live_blocks: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
    /// Successful allocations over the allocator's lifetime.
    pub total_allocations: u64,
    /// Requests refused because of the budget or heap exhaustion.
    pub failed_allocations: u64,
}

/// Heap allocator that keeps byte/block accounting and can enforce a budget.
///
/// One instance is typically shared (behind an `Arc`) by every endpoint of a
/// messenger so tests and diagnostics can observe buffer lifetimes.
pub struct TrackingAllocator {
    heap: HeapAllocator,
    budget: Option<usize>,
    stats: Mutex<AllocStats>, // guards all accounting updates
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingAllocator {
    /// Create an unbounded tracking allocator.
    pub fn new() -> Self {
        Self {
            heap: HeapAllocator,
            budget: None,
            stats: Mutex::new(AllocStats::default()),
        }
    }

    /// Create a tracking allocator that refuses requests once `budget` bytes
    /// are live.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        let mut stats = self.stats.lock();

        if let Some(budget) = self.budget {
            if stats.live_bytes.saturating_add(size) > budget {
                stats.failed_allocations += 1;
                tracing::debug!(size, budget, live = stats.live_bytes, "allocation refused by budget");
                return None;
            }
        }

        match self.heap.allocate(size) {
            Some(block) => {
                stats.live_bytes += block.len();
                stats.live_blocks += 1;
                stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
                stats.total_allocations += 1;
                Some(block)
            }
            None => {
                stats.failed_allocations += 1;
                None
            }
        }
    }

    fn free(&self, block: Box<[u8]>) {
        {
            let mut stats = self.stats.lock();
            stats.live_bytes = stats.live_bytes.saturating_sub(block.len());
            stats.live_blocks = stats.live_blocks.saturating_sub(1);
        }
        self.heap.free(block);
    }
}
