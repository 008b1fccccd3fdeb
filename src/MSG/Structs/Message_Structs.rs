use bitflags::bitflags;
use thiserror::Error;

use crate::MSG::Buffer::layout::{MESSAGE_BODY_SIZE, MESSAGE_PREFIX_SIZE, PAYLOAD_HEADER_SIZE};

/// Message class identifier. `0` is reserved for "no message".
pub type ClassId = u32;

/// Application tag used by client-side filtering. `0` means untagged.
pub type TagId = u32;

/// Request/reply correlation id.
pub type SequenceId = u32;

/// A notification: no reply is expected.
pub const NULL_SEQUENCE_ID: SequenceId = 0;

/// Ask the sending endpoint to allocate the next sequence id.
pub const ASSIGN_SEQUENCE_ID: SequenceId = 0xFFFF_FFFF;

/// Opaque endpoint handle issued by a messenger.
///
/// Unique among attached endpoints; an id may be reused once its endpoint is
/// detached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u32);

impl Address {
    /// The address no endpoint is ever given.
    pub const NULL: Address = Address(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Flags owned by the messaging layer and carried in the message prefix.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WireFlags: u16 {
        /// The message answers an earlier request.
        const IS_REPLY = 1 << 0;

        /// A payload header follows the body.
        const HAS_PAYLOAD = 1 << 1;

        /// Reserved for payloads split over several reservations. Never set
        /// by this crate.
        const LARGE_PAYLOAD = (1 << 2) | Self::HAS_PAYLOAD.bits();

        /// The reply reports a failed request.
        const ERROR = 1 << 15;
    }
}

/// Error raised when decoding wire structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated field: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("payload of {size} bytes does not fit the 32-bit size field")]
    PayloadTooLarge { size: usize },
}

/// Outcome carried by a server reply.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplyType {
    #[default]
    Success,
    /// Sets [`WireFlags::ERROR`] on the reply.
    Fail,
}

/// Key of a request the server has not answered yet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerRequestId {
    pub seq_id: SequenceId,
    pub class_id: ClassId,
}

impl ServerRequestId {
    pub const fn new(seq_id: SequenceId, class_id: ClassId) -> Self {
        Self { seq_id, class_id }
    }
}

/// Message header exchanged between endpoints.
///
/// A default-constructed message has `class_id == 0` and stands for "no
/// message". The wire flags are maintained by the messaging layer; only the
/// custom flags are for applications.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    sender: Address,
    class_id: ClassId,
    seq_id: SequenceId,
    tag_id: TagId,
    custom_flags: u16,
    wire_flags: WireFlags,
}

impl Message {
    /// A message of the given class from `sender`, every other field cleared.
    pub fn new(sender: Address, class_id: ClassId) -> Self {
        Self {
            sender,
            class_id,
            ..Self::default()
        }
    }

    /// A message of the given class carrying an application tag.
    pub fn with_tag(sender: Address, class_id: ClassId, tag_id: TagId) -> Self {
        Self {
            sender,
            class_id,
            tag_id,
            ..Self::default()
        }
    }

    // Getters

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn seq_id(&self) -> SequenceId {
        self.seq_id
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn custom_flags(&self) -> u16 {
        self.custom_flags
    }

    pub fn wire_flags(&self) -> WireFlags {
        self.wire_flags
    }

    /// False for the "no message" sentinel.
    pub fn is_valid(&self) -> bool {
        self.class_id != 0
    }

    pub fn is_reply(&self) -> bool {
        self.wire_flags.contains(WireFlags::IS_REPLY)
    }

    pub fn has_payload(&self) -> bool {
        self.wire_flags.contains(WireFlags::HAS_PAYLOAD)
    }

    pub fn is_error(&self) -> bool {
        self.wire_flags.contains(WireFlags::ERROR)
    }

    // Application flags

    pub fn set_custom_flags(&mut self, mask: u16) {
        self.custom_flags |= mask;
    }

    pub fn clear_custom_flags(&mut self, mask: u16) {
        self.custom_flags &= !mask;
    }

    /// True when any bit of `mask` is set.
    pub fn query_custom_flags(&self, mask: u16) -> bool {
        self.custom_flags & mask != 0
    }

    pub fn set_tag_id(&mut self, tag_id: TagId) {
        self.tag_id = tag_id;
    }

    pub fn set_class_id(&mut self, class_id: ClassId) {
        self.class_id = class_id;
    }

    // Crate-owned fields

    pub(crate) fn set_seq_id(&mut self, seq_id: SequenceId) {
        self.seq_id = seq_id;
    }

    pub(crate) fn set_wire_flags(&mut self, flags: WireFlags) {
        self.wire_flags |= flags;
    }

    pub(crate) fn clear_wire_flags(&mut self, flags: WireFlags) {
        self.wire_flags &= !flags;
    }

    /// Write the 4-byte prefix: body size then wire flags.
    pub fn encode_prefix(&self, out: &mut [u8]) -> Result<(), WireError> {
        check_len(out.len(), MESSAGE_PREFIX_SIZE)?;
        out[0..2].copy_from_slice(&(MESSAGE_BODY_SIZE as u16).to_be_bytes());
        out[2..4].copy_from_slice(&self.wire_flags.bits().to_be_bytes());
        Ok(())
    }

    /// Read a prefix, returning `(body_size, wire_flags)`.
    ///
    /// Unknown flag bits are kept so that they survive forwarding.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(u16, WireFlags), WireError> {
        check_len(bytes.len(), MESSAGE_PREFIX_SIZE)?;
        let body_size = u16::from_be_bytes([bytes[0], bytes[1]]);
        let flags = WireFlags::from_bits_retain(u16::from_be_bytes([bytes[2], bytes[3]]));
        Ok((body_size, flags))
    }

    /// Write the 18-byte body.
    pub fn encode(&self, out: &mut [u8]) -> Result<(), WireError> {
        check_len(out.len(), MESSAGE_BODY_SIZE)?;
        out[0..4].copy_from_slice(&self.sender.id().to_be_bytes());
        out[4..8].copy_from_slice(&self.class_id.to_be_bytes());
        out[8..12].copy_from_slice(&self.seq_id.to_be_bytes());
        out[12..16].copy_from_slice(&self.tag_id.to_be_bytes());
        out[16..18].copy_from_slice(&self.custom_flags.to_be_bytes());
        Ok(())
    }

    /// Read a body, attaching the wire flags taken from the prefix.
    ///
    /// Stops at the first field that does not fit.
    pub fn decode(bytes: &[u8], wire_flags: WireFlags) -> Result<Self, WireError> {
        let mut reader = FieldReader::new(bytes);
        let sender = Address::new(reader.u32()?);
        let class_id = reader.u32()?;
        let seq_id = reader.u32()?;
        let tag_id = reader.u32()?;
        let custom_flags = reader.u16()?;

        Ok(Self {
            sender,
            class_id,
            seq_id,
            tag_id,
            custom_flags,
            wire_flags,
        })
    }
}

/// Borrowed payload bytes plus two application-defined descriptors.
///
/// The view is only valid until the next consuming read of the buffer it
/// points into.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Payload<'a> {
    data: &'a [u8],
    encoding: i16,
    format: i16,
}

impl<'a> Payload<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            encoding: 0,
            format: 0,
        }
    }

    pub fn with_encoding(data: &'a [u8], encoding: i16, format: i16) -> Self {
        Self {
            data,
            encoding,
            format,
        }
    }

    /// The empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Byte length as carried on the wire, saturating at `u32::MAX`.
    /// Payloads that long are refused by [`Payload::wire_size`].
    pub fn size(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }

    /// The size field for a payload of `len` bytes.
    pub fn wire_size(len: usize) -> Result<u32, WireError> {
        u32::try_from(len).map_err(|_| WireError::PayloadTooLarge { size: len })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn encoding(&self) -> i16 {
        self.encoding
    }

    pub fn format(&self) -> i16 {
        self.format
    }

    /// Write the 8-byte payload header.
    pub fn encode_header(&self, out: &mut [u8]) -> Result<(), WireError> {
        check_len(out.len(), PAYLOAD_HEADER_SIZE)?;
        let size = Self::wire_size(self.data.len())?;
        out[0..4].copy_from_slice(&size.to_be_bytes());
        out[4..6].copy_from_slice(&self.encoding.to_be_bytes());
        out[6..8].copy_from_slice(&self.format.to_be_bytes());
        Ok(())
    }

    /// Read a payload header, returning `(size, encoding, format)`.
    pub fn decode_header(bytes: &[u8]) -> Result<(u32, i16, i16), WireError> {
        let mut reader = FieldReader::new(bytes);
        Ok((reader.u32()?, reader.i16()?, reader.i16()?))
    }
}

#[inline]
fn check_len(available: usize, needed: usize) -> Result<(), WireError> {
    if available < needed {
        Err(WireError::Truncated { needed, available })
    } else {
        Ok(())
    }
}

/// Sequential big-endian field reader over a byte slice.
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let end = self.pos + N;
        let field = self
            .bytes
            .get(self.pos..end)
            .ok_or(WireError::Truncated {
                needed: end,
                available: self.bytes.len(),
            })?;
        self.pos = end;

        let mut out = [0u8; N];
        out.copy_from_slice(field);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn i16(&mut self) -> Result<i16, WireError> {
        self.take::<2>().map(i16::from_be_bytes)
    }
}
