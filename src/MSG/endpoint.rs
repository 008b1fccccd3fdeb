use std::sync::Arc;

use super::MsgError;
use crate::Core::alloc::Allocator;
use crate::MSG::Buffer::layout::{
    ADDRESS_SIZE, MAGIC_SIZE, MESSAGE_BODY_SIZE, MESSAGE_PREFIX_SIZE, PACKET_MAGIC,
    PAYLOAD_HEADER_SIZE, SEND_HEADER_SIZE,
};
use crate::MSG::Buffer::RingBuffer;
use crate::MSG::Structs::{
    Address, Message, Payload, SequenceId, WireError, WireFlags, ASSIGN_SEQUENCE_ID, NULL_SEQUENCE_ID,
};

/// A mailbox: one send buffer, one receive buffer and a sequence counter.
///
/// Endpoints are owned by a [`super::Messenger`] once attached. Outgoing
/// packets wait in the send buffer until the messenger transmits them into the
/// destination's receive buffer.
#[derive(Default)]
pub struct Endpoint {
    pub(crate) send_buffer: RingBuffer,
    pub(crate) recv_buffer: RingBuffer,
    pub(crate) seq_id: SequenceId,
}

/// Receive half of a split endpoint.
pub struct Inbox<'a> {
    recv: &'a mut RingBuffer,
}

/// Send half of a split endpoint.
pub struct Outbox<'a> {
    send: &'a mut RingBuffer,
    seq_id: &'a mut SequenceId,
}

impl Endpoint {
    pub fn new(
        send_size: usize,
        recv_size: usize,
        allocator: Arc<dyn Allocator>,
        initial_sequence_id: SequenceId,
    ) -> Result<Self, MsgError> {
        let send_buffer = RingBuffer::new(send_size, Arc::clone(&allocator))?;
        let recv_buffer = RingBuffer::new(recv_size, allocator)?;
        Ok(Self {
            send_buffer,
            recv_buffer,
            seq_id: initial_sequence_id,
        })
    }

    /// Queue a packet for `receiver`.
    ///
    /// `seq_id` is [`ASSIGN_SEQUENCE_ID`] for a request (the endpoint picks the
    /// next id), [`NULL_SEQUENCE_ID`] for a notification, or the id of the
    /// request being answered. Returns `None` when the packet does not fit or
    /// the payload is longer than the 32-bit size field allows; the send
    /// buffer is left untouched in that case.
    pub fn send(
        &mut self,
        msg: Message,
        receiver: Address,
        payload: &Payload<'_>,
        seq_id: SequenceId,
    ) -> Option<SequenceId> {
        self.outbox().send(msg, receiver, payload, seq_id)
    }

    /// Tentatively read the next packet.
    ///
    /// The bytes stay reserved until [`Endpoint::receive_end`].
    pub fn receive(&mut self) -> Option<(Message, Payload<'_>)> {
        read_packet(&mut self.recv_buffer)
    }

    /// Finish a receive: `consume` releases what was read, otherwise it is put
    /// back for the next poll.
    pub fn receive_end(&mut self, consume: bool) {
        finish_read(&mut self.recv_buffer, consume);
    }

    /// Borrow both halves at once so a handler can reply while it still holds
    /// a received payload.
    pub fn split(&mut self) -> (Inbox<'_>, Outbox<'_>) {
        (
            Inbox {
                recv: &mut self.recv_buffer,
            },
            Outbox {
                send: &mut self.send_buffer,
                seq_id: &mut self.seq_id,
            },
        )
    }

    pub fn outbox(&mut self) -> Outbox<'_> {
        Outbox {
            send: &mut self.send_buffer,
            seq_id: &mut self.seq_id,
        }
    }

    /// Last sequence id handed out.
    pub fn sequence_id(&self) -> SequenceId {
        self.seq_id
    }

    pub fn send_buffer(&self) -> &RingBuffer {
        &self.send_buffer
    }

    pub fn recv_buffer(&self) -> &RingBuffer {
        &self.recv_buffer
    }

    /// Raw access to the outgoing queue, for tooling and fault injection.
    pub fn send_buffer_mut(&mut self) -> &mut RingBuffer {
        &mut self.send_buffer
    }

    /// Raw access to the incoming queue, for tooling and fault injection.
    pub fn recv_buffer_mut(&mut self) -> &mut RingBuffer {
        &mut self.recv_buffer
    }

    /// Drop everything queued in both directions.
    pub fn reset(&mut self) {
        self.send_buffer.reset();
        self.recv_buffer.reset();
    }
}

impl Inbox<'_> {
    pub fn receive(&mut self) -> Option<(Message, Payload<'_>)> {
        read_packet(self.recv)
    }

    pub fn receive_end(&mut self, consume: bool) {
        finish_read(self.recv, consume);
    }
}

impl Outbox<'_> {
    /// See [`Endpoint::send`].
    pub fn send(
        &mut self,
        mut msg: Message,
        receiver: Address,
        payload: &Payload<'_>,
        seq_id: SequenceId,
    ) -> Option<SequenceId> {
        if let Err(err) = Payload::wire_size(payload.data().len()) {
            tracing::warn!(%err, sender = %msg.sender(), %receiver, "payload refused");
            return None;
        }

        let assigned = seq_id == ASSIGN_SEQUENCE_ID;
        let seq_id = if assigned {
            next_sequence_id(*self.seq_id)
        } else {
            if seq_id != NULL_SEQUENCE_ID {
                msg.set_wire_flags(WireFlags::IS_REPLY);
            }
            seq_id
        };
        msg.set_seq_id(seq_id);

        msg.clear_wire_flags(WireFlags::HAS_PAYLOAD);
        if !payload.is_empty() {
            msg.set_wire_flags(WireFlags::HAS_PAYLOAD);
        }

        if write_packet(self.send, &msg, receiver, payload).is_none() {
            self.send.revert_write();
            tracing::trace!(
                sender = %msg.sender(),
                %receiver,
                class_id = msg.class_id(),
                payload = payload.size(),
                "send buffer full"
            );
            return None;
        }
        self.send.update_write();

        // the counter only moves once the frame is committed
        if assigned {
            *self.seq_id = seq_id;
        }
        Some(seq_id)
    }
}

/// The id following `current`, skipping the two reserved values.
pub(crate) fn next_sequence_id(current: SequenceId) -> SequenceId {
    match current.wrapping_add(1) {
        NULL_SEQUENCE_ID | ASSIGN_SEQUENCE_ID => 1,
        next => next,
    }
}

/// Reserve `n` bytes of `buffer` and fill them.
fn write_chunk(
    buffer: &mut RingBuffer,
    n: usize,
    fill: impl FnOnce(&mut [u8]) -> Result<(), WireError>,
) -> Option<()> {
    let out = buffer.reserve_write(n)?;
    fill(out).ok()
}

/// Frame one packet as a series of reservations. Nothing is committed here.
fn write_packet(
    send: &mut RingBuffer,
    msg: &Message,
    receiver: Address,
    payload: &Payload<'_>,
) -> Option<()> {
    write_chunk(send, SEND_HEADER_SIZE, |out| {
        out[..MAGIC_SIZE].copy_from_slice(&PACKET_MAGIC);
        out[MAGIC_SIZE..MAGIC_SIZE + ADDRESS_SIZE].copy_from_slice(&receiver.id().to_be_bytes());
        Ok(())
    })?;
    write_chunk(send, MESSAGE_PREFIX_SIZE, |out| msg.encode_prefix(out))?;
    write_chunk(send, MESSAGE_BODY_SIZE, |out| msg.encode(out))?;

    if !payload.is_empty() {
        write_chunk(send, PAYLOAD_HEADER_SIZE, |out| payload.encode_header(out))?;
        write_chunk(send, payload.data().len(), |out| {
            out.copy_from_slice(payload.data());
            Ok(())
        })?;
    }
    Some(())
}

/// Reserve `n` bytes of `buffer` and decode them. When the bytes are not
/// there the read cursor goes back to `packet_start`, leaving packets read
/// earlier in the same poll untouched.
fn read_chunk<T>(
    buffer: &mut RingBuffer,
    packet_start: usize,
    n: usize,
    decode: impl FnOnce(&[u8]) -> T,
) -> Option<T> {
    match buffer.reserve_read(n) {
        Some(bytes) => Some(decode(bytes)),
        None => {
            buffer.rewind_read(packet_start);
            None
        }
    }
}

fn read_packet(recv: &mut RingBuffer) -> Option<(Message, Payload<'_>)> {
    if !recv.read_size_contiguous(MAGIC_SIZE) {
        return None;
    }
    let start = recv.read_cursor();

    let magic_ok = read_chunk(recv, start, MAGIC_SIZE, |bytes| bytes == PACKET_MAGIC)?;
    if !magic_ok {
        // leave the marker consumed so a consuming receive_end skips it
        tracing::warn!(cursors = ?recv.cursors(), "bad packet magic in receive buffer");
        return None;
    }

    let (body_size, wire_flags) =
        read_chunk(recv, start, MESSAGE_PREFIX_SIZE, Message::decode_prefix)?.ok()?;
    let decoded = read_chunk(recv, start, body_size as usize, |bytes| {
        Message::decode(bytes, wire_flags)
    })?;

    let payload = if wire_flags.contains(WireFlags::HAS_PAYLOAD) {
        let (size, encoding, format) =
            read_chunk(recv, start, PAYLOAD_HEADER_SIZE, Payload::decode_header)?.ok()?;
        let size = size as usize;
        if !recv.read_size_contiguous(size) {
            recv.rewind_read(start);
            return None;
        }
        Payload::with_encoding(recv.reserve_read(size)?, encoding, format)
    } else {
        Payload::empty()
    };

    match decoded {
        Ok(msg) => Some((msg, payload)),
        Err(err) => {
            // short body: the packet stays consumed and is skipped
            tracing::warn!(%err, "malformed message body in receive buffer");
            None
        }
    }
}

fn finish_read(recv: &mut RingBuffer, consume: bool) {
    if consume {
        recv.update_read();
    } else {
        recv.revert_read();
    }
}
