use std::sync::Arc;

use super::{Endpoint, MsgError};
use crate::Core::alloc::{Allocator, HeapAllocator};
use crate::MSG::Structs::SequenceId;

/// Default size of each endpoint ring buffer in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Configures the buffers of a new [`Endpoint`].
#[derive(Clone)]
pub struct EndpointBuilder {
    send_size: usize,
    recv_size: usize,
    allocator: Option<Arc<dyn Allocator>>,
    initial_sequence_id: SequenceId,
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self {
            send_size: DEFAULT_BUFFER_SIZE,
            recv_size: DEFAULT_BUFFER_SIZE,
            allocator: None, // heap unless the messenger supplies one
            initial_sequence_id: 0,
        }
    }
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_size(mut self, size: usize) -> Self {
        self.send_size = size;
        self
    }

    pub fn with_recv_size(mut self, size: usize) -> Self {
        self.recv_size = size;
        self
    }

    /// Set both buffer sizes at once.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.send_size = size;
        self.recv_size = size;
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Seed the sequence counter; the first assigned id is the one after it.
    pub fn with_initial_sequence_id(mut self, seq_id: SequenceId) -> Self {
        self.initial_sequence_id = seq_id;
        self
    }

    pub fn send_size(&self) -> usize {
        self.send_size
    }

    pub fn recv_size(&self) -> usize {
        self.recv_size
    }

    pub(crate) fn has_allocator(&self) -> bool {
        self.allocator.is_some()
    }

    pub fn build(self) -> Result<Endpoint, MsgError> {
        let allocator = self
            .allocator
            .unwrap_or_else(|| Arc::new(HeapAllocator) as Arc<dyn Allocator>);
        Endpoint::new(
            self.send_size,
            self.recv_size,
            allocator,
            self.initial_sequence_id,
        )
    }
}
