//! Byte layout of the packets carried by endpoint ring buffers.
//!
//! Every integer on the wire is big-endian. A packet is written as a sequence
//! of separate contiguous reservations, one per chunk below, and must be read
//! back with the same chunk sizes.
//!
//! ```text
//! send buffer:    "mesg" dest:u32 | body_size:u16 wire_flags:u16 | body (18) | [size:u32 enc:i16 fmt:i16 | bytes]
//! receive buffer: "mesg"          | body_size:u16 wire_flags:u16 | body (18) | [size:u32 enc:i16 fmt:i16 | bytes]
//! ```

/// Marker opening every packet.
pub const PACKET_MAGIC: [u8; 4] = *b"mesg";

/// Size of [`PACKET_MAGIC`].
pub const MAGIC_SIZE: usize = 4;

/// Size of an encoded address.
pub const ADDRESS_SIZE: usize = 4;

/// Magic followed by the destination address; only present in send buffers.
pub const SEND_HEADER_SIZE: usize = MAGIC_SIZE + ADDRESS_SIZE;

/// Body size and wire flags, two `u16`s.
pub const MESSAGE_PREFIX_SIZE: usize = 4;

/// sender, class, sequence and tag (`u32` each) plus the custom flags (`u16`).
pub const MESSAGE_BODY_SIZE: usize = 18;

/// Payload size (`u32`), encoding (`i16`) and format (`i16`).
pub const PAYLOAD_HEADER_SIZE: usize = 8;

/// Bytes a packet occupies in a send buffer, excluding ring slack.
#[inline]
pub const fn send_packet_size(payload_len: usize) -> usize {
    SEND_HEADER_SIZE + recv_packet_size(payload_len) - MAGIC_SIZE
}

/// Bytes a packet occupies in a receive buffer, excluding ring slack.
#[inline]
pub const fn recv_packet_size(payload_len: usize) -> usize {
    let payload = if payload_len == 0 {
        0
    } else {
        PAYLOAD_HEADER_SIZE + payload_len
    };
    MAGIC_SIZE + MESSAGE_PREFIX_SIZE + MESSAGE_BODY_SIZE + payload
}

// Compile-time checks that the chunk sizes add up
const _: () = assert!(SEND_HEADER_SIZE == 8);
const _: () = assert!(recv_packet_size(0) == 26);
const _: () = assert!(send_packet_size(0) == 30);
const _: () = assert!(send_packet_size(4) == 42);
