use super::*;

/// Getter methods for TrackingAllocator
///
/// These methods expose the accounting kept under the stats mutex for
/// debugging, monitoring and tests.
impl TrackingAllocator {
    /// Copy of the current accounting.
    pub fn stats(&self) -> AllocStats {
        *self.stats.lock()
    }

    /// Bytes currently handed out to live buffers.
    pub fn live_bytes(&self) -> usize {
        self.stats.lock().live_bytes
    }

    /// Blocks currently handed out to live buffers.
    pub fn live_blocks(&self) -> usize {
        self.stats.lock().live_blocks
    }

    /// The configured byte budget, if any.
    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    /// Bytes that can still be allocated before the budget refuses requests.
    ///
    /// Returns `None` for an unbounded allocator.
    pub fn remaining_budget(&self) -> Option<usize> {
        let live = self.live_bytes();
        self.budget.map(|budget| budget.saturating_sub(live))
    }
}
