use std::fmt;

use crate::Core::alloc::TrackingAllocator;
use crate::MSG::Buffer::RingBuffer;
use crate::MSG::{Endpoint, Messenger};

/// Debug function for TrackingAllocator
///
/// Shows the budget and the accounting snapshot.
pub fn debug_tracking_allocator(allocator: &TrackingAllocator, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TrackingAllocator")
        .field("budget", &allocator.budget())
        .field("stats", &allocator.stats())
        .finish()
}

/// Debug function for RingBuffer
///
/// Shows capacity and cursors, never the buffered bytes.
pub fn debug_ring_buffer(buffer: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if buffer.is_null() {
        return f.write_str("RingBuffer(<null>)");
    }

    let (head, tail, read_head, write_head) = buffer.cursors();
    f.debug_struct("RingBuffer")
        .field("size", &buffer.size())
        .field("head", &head)
        .field("tail", &tail)
        .field("read_head", &read_head)
        .field("write_head", &write_head)
        .field("wrap_mark", &buffer.wrap_mark)
        .field("read_size", &buffer.read_size())
        .field("write_size", &buffer.write_size())
        .finish()
}

/// Debug function for Endpoint
pub fn debug_endpoint(endpoint: &Endpoint, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Endpoint")
        .field("send", endpoint.send_buffer())
        .field("recv", endpoint.recv_buffer())
        .field("seq_id", &endpoint.sequence_id())
        .finish()
}

/// Debug function for Messenger
///
/// Lists attached addresses in ascending order so output is stable.
pub fn debug_messenger(messenger: &Messenger, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut addresses: Vec<u32> = messenger.endpoints.keys().copied().collect();
    addresses.sort_unstable();

    f.debug_struct("Messenger")
        .field("endpoints", &addresses)
        .field("next_address", &messenger.next_address())
        .finish_non_exhaustive()
}
