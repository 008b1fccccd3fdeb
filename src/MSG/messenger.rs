use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use super::{Endpoint, EndpointBuilder, MsgError};
use crate::Core::alloc::{Allocator, HeapAllocator};
use crate::MSG::Buffer::layout::{
    MAGIC_SIZE, MESSAGE_PREFIX_SIZE, PACKET_MAGIC, PAYLOAD_HEADER_SIZE, SEND_HEADER_SIZE,
};
use crate::MSG::Buffer::RingBuffer;
use crate::MSG::Structs::{Address, Message, Payload, SequenceId, WireFlags};

/// A messenger shared by the client and server façades of one thread.
pub type SharedMessenger = Rc<RefCell<Messenger>>;

/// Outcome of one [`Messenger::transmit`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransmitStats {
    /// Packets copied into a receive buffer.
    pub delivered: usize,
    /// Packets addressed to an endpoint that is not attached.
    pub dropped: usize,
    /// Packets discarded because they could not be parsed.
    pub corrupted: usize,
    /// A packet is waiting for room in its receive buffer.
    pub held: bool,
}

/// Progress of a single packet through [`Messenger::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketState {
    StartPacket,
    MessageSize,
    Message,
    PayloadSize,
    Payload,
    Completed,
    Corrupted,
    OutOfRoom,
}

/// Registry of endpoints and router between their buffers.
///
/// The messenger is single-threaded and fully synchronous: `send` only queues
/// into the sender's send buffer and nothing moves until `transmit` is called
/// for that sender.
pub struct Messenger {
    pub(crate) endpoints: HashMap<u32, Endpoint>,
    pub(crate) next_address: u32,
    pub(crate) allocator: Arc<dyn Allocator>,
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

impl Messenger {
    /// A messenger whose endpoints allocate from the heap.
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(HeapAllocator))
    }

    /// A messenger whose endpoints allocate through `allocator` unless their
    /// builder names another one.
    pub fn with_allocator(allocator: Arc<dyn Allocator>) -> Self {
        Self {
            endpoints: HashMap::new(),
            next_address: 0,
            allocator,
        }
    }

    /// A heap-backed messenger ready to be handed to façades.
    pub fn new_shared() -> SharedMessenger {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn into_shared(self) -> SharedMessenger {
        Rc::new(RefCell::new(self))
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Register an endpoint under a fresh address.
    ///
    /// Returns [`Address::NULL`] only if every address is taken, in which
    /// case the endpoint is dropped.
    pub fn attach_endpoint(&mut self, endpoint: Endpoint) -> Address {
        let Some(id) = self.next_free_address() else {
            tracing::warn!(endpoints = self.endpoints.len(), "endpoint address space exhausted");
            return Address::NULL;
        };

        self.endpoints.insert(id, endpoint);
        let address = Address::new(id);
        tracing::debug!(%address, "endpoint attached");
        address
    }

    /// Build an endpoint and attach it.
    ///
    /// The messenger's allocator is used when the builder has none.
    pub fn create_endpoint(&mut self, builder: EndpointBuilder) -> Result<Address, MsgError> {
        if self.endpoints.len() >= u32::MAX as usize {
            return Err(MsgError::AddressSpaceExhausted);
        }

        let builder = if builder.has_allocator() {
            builder
        } else {
            builder.with_allocator(Arc::clone(&self.allocator))
        };
        let endpoint = builder.build()?;

        match self.attach_endpoint(endpoint) {
            address if address.is_null() => Err(MsgError::AddressSpaceExhausted),
            address => Ok(address),
        }
    }

    /// Unregister an endpoint and hand it back with whatever it still holds.
    pub fn detach_endpoint(&mut self, address: Address) -> Option<Endpoint> {
        let endpoint = self.endpoints.remove(&address.id())?;
        tracing::debug!(%address, "endpoint detached");
        Some(endpoint)
    }

    /// Detach an endpoint and release its buffers. Returns false for an
    /// address that is not attached.
    pub fn destroy_endpoint(&mut self, address: Address) -> bool {
        match self.detach_endpoint(address) {
            Some(mut endpoint) => {
                endpoint.reset();
                true
            }
            None => false,
        }
    }

    pub fn endpoint(&self, address: Address) -> Option<&Endpoint> {
        self.endpoints.get(&address.id())
    }

    pub fn endpoint_mut(&mut self, address: Address) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(&address.id())
    }

    pub fn contains(&self, address: Address) -> bool {
        self.endpoints.contains_key(&address.id())
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Queue `msg` in its sender's send buffer.
    ///
    /// Returns the sequence id carried by the packet, or `None` if the sender
    /// is not attached or its send buffer is full.
    pub fn send(
        &mut self,
        msg: Message,
        receiver: Address,
        payload: &Payload<'_>,
        seq_id: SequenceId,
    ) -> Option<SequenceId> {
        let sender = msg.sender();
        match self.endpoints.get_mut(&sender.id()) {
            Some(endpoint) => endpoint.send(msg, receiver, payload, seq_id),
            None => {
                tracing::trace!(%sender, %receiver, "send from unattached endpoint");
                None
            }
        }
    }

    /// Move queued packets from `sender`'s send buffer into their receivers.
    ///
    /// Packets are moved strictly in order. The pass stops at the first packet
    /// whose receiver has no room; that packet is retried by the next call.
    pub fn transmit(&mut self, sender: Address) -> TransmitStats {
        let mut stats = TransmitStats::default();

        // take the send buffer out so a packet addressed to the sender itself
        // can be written into its receive buffer
        let mut send = match self.endpoints.get_mut(&sender.id()) {
            Some(endpoint) => std::mem::take(&mut endpoint.send_buffer),
            None => return stats,
        };

        while send.read_size_contiguous(SEND_HEADER_SIZE) {
            let Some((magic_ok, destination)) = send
                .reserve_read(SEND_HEADER_SIZE)
                .map(|header| (header[..MAGIC_SIZE] == PACKET_MAGIC, read_address(&header[MAGIC_SIZE..])))
            else {
                break;
            };

            let mut recv = self
                .endpoints
                .get_mut(&destination.id())
                .map(|endpoint| &mut endpoint.recv_buffer);
            let state = pump_packet(&mut send, &mut recv, magic_ok);

            match state {
                PacketState::OutOfRoom => {
                    if let Some(recv) = recv {
                        recv.revert_write();
                    }
                    send.revert_read();
                    stats.held = true;
                    tracing::trace!(%sender, %destination, "receive buffer full, holding packet");
                    break;
                }
                PacketState::Completed => {
                    send.update_read();
                    match recv {
                        Some(recv) => {
                            recv.update_write();
                            stats.delivered += 1;
                        }
                        None => {
                            stats.dropped += 1;
                            tracing::debug!(%sender, %destination, "packet dropped, no such endpoint");
                        }
                    }
                }
                _ => {
                    debug_assert_eq!(state, PacketState::Corrupted);
                    if let Some(recv) = recv {
                        recv.revert_write();
                    }
                    send.update_read();
                    stats.corrupted += 1;
                    tracing::warn!(%sender, %destination, "corrupted packet skipped");
                }
            }
        }

        if let Some(endpoint) = self.endpoints.get_mut(&sender.id()) {
            endpoint.send_buffer = send;
        }
        stats
    }

    /// Tentatively read the next packet waiting for `receiver`.
    pub fn poll_receive(&mut self, receiver: Address) -> Option<(Message, Payload<'_>)> {
        self.endpoints.get_mut(&receiver.id())?.receive()
    }

    /// Commit (`consume`) or roll back everything `poll_receive` read.
    pub fn poll_end(&mut self, receiver: Address, consume: bool) {
        if let Some(endpoint) = self.endpoints.get_mut(&receiver.id()) {
            endpoint.receive_end(consume);
        }
    }

    pub(crate) fn next_address(&self) -> u32 {
        self.next_address
    }

    fn next_free_address(&mut self) -> Option<u32> {
        if self.endpoints.len() >= u32::MAX as usize {
            return None;
        }
        loop {
            self.next_address = self.next_address.wrapping_add(1);
            if self.next_address != 0 && !self.endpoints.contains_key(&self.next_address) {
                return Some(self.next_address);
            }
        }
    }
}

/// Borrow a shared messenger for a façade call.
///
/// Fails, with a warning, when a delegate tries to re-enter the messenger that
/// is dispatching to it.
pub(crate) fn borrow_shared(messenger: &SharedMessenger) -> Option<RefMut<'_, Messenger>> {
    match messenger.try_borrow_mut() {
        Ok(messenger) => Some(messenger),
        Err(_) => {
            tracing::warn!("messenger already borrowed, re-entrant call ignored");
            None
        }
    }
}

fn read_address(bytes: &[u8]) -> Address {
    let mut id = [0u8; 4];
    id.copy_from_slice(&bytes[..4]);
    Address::new(u32::from_be_bytes(id))
}

/// Copy `n` bytes from `send` to `recv` and let `inspect` look at them.
///
/// Without a receive buffer the bytes are only read, which is how packets for
/// detached endpoints are drained.
fn copy_chunk<T>(
    send: &mut RingBuffer,
    recv: &mut Option<&mut RingBuffer>,
    n: usize,
    inspect: impl FnOnce(&[u8]) -> T,
) -> Result<T, PacketState> {
    let input = send.reserve_read(n).ok_or(PacketState::Corrupted)?;
    if let Some(recv) = recv.as_deref_mut() {
        let output = recv.reserve_write(n).ok_or(PacketState::OutOfRoom)?;
        output.copy_from_slice(input);
    }
    Ok(inspect(input))
}

/// Run one packet (its 8-byte send header already read) through the state
/// machine, leaving both buffers uncommitted.
fn pump_packet(
    send: &mut RingBuffer,
    recv: &mut Option<&mut RingBuffer>,
    magic_ok: bool,
) -> PacketState {
    let mut state = PacketState::StartPacket;
    let mut body_size = 0usize;
    let mut wire_flags = WireFlags::empty();
    let mut payload_size = 0usize;

    loop {
        state = match state {
            PacketState::StartPacket if !magic_ok => PacketState::Corrupted,
            PacketState::StartPacket => match recv.as_deref_mut() {
                Some(recv) => match recv.reserve_write(MAGIC_SIZE) {
                    Some(out) => {
                        out.copy_from_slice(&PACKET_MAGIC);
                        PacketState::MessageSize
                    }
                    None => PacketState::OutOfRoom,
                },
                None => PacketState::MessageSize,
            },
            PacketState::MessageSize => {
                match copy_chunk(send, recv, MESSAGE_PREFIX_SIZE, Message::decode_prefix) {
                    Ok(Ok((size, flags))) => {
                        body_size = size as usize;
                        wire_flags = flags;
                        PacketState::Message
                    }
                    Ok(Err(_)) => PacketState::Corrupted,
                    Err(state) => state,
                }
            }
            PacketState::Message => match copy_chunk(send, recv, body_size, |_| ()) {
                Ok(()) if wire_flags.contains(WireFlags::HAS_PAYLOAD) => PacketState::PayloadSize,
                Ok(()) => PacketState::Completed,
                Err(state) => state,
            },
            PacketState::PayloadSize => {
                match copy_chunk(send, recv, PAYLOAD_HEADER_SIZE, Payload::decode_header) {
                    Ok(Ok((size, _, _))) => {
                        payload_size = size as usize;
                        PacketState::Payload
                    }
                    Ok(Err(_)) => PacketState::Corrupted,
                    Err(state) => state,
                }
            }
            PacketState::Payload => match copy_chunk(send, recv, payload_size, |_| ()) {
                Ok(()) => PacketState::Completed,
                Err(state) => state,
            },
            PacketState::Completed | PacketState::Corrupted | PacketState::OutOfRoom => {
                return state
            }
        };
    }
}
