use dmxp_msg::MSG::Buffer::layout::{
    recv_packet_size, send_packet_size, MESSAGE_BODY_SIZE, MESSAGE_PREFIX_SIZE, PACKET_MAGIC,
    PAYLOAD_HEADER_SIZE, SEND_HEADER_SIZE,
};
use dmxp_msg::MSG::Structs::{Address, Message, Payload, WireError, WireFlags};

#[test]
fn chunk_sizes() {
    assert_eq!(&PACKET_MAGIC, b"mesg");
    assert_eq!(SEND_HEADER_SIZE, 8);
    assert_eq!(MESSAGE_PREFIX_SIZE, 4);
    assert_eq!(MESSAGE_BODY_SIZE, 18);
    assert_eq!(PAYLOAD_HEADER_SIZE, 8);

    assert_eq!(send_packet_size(0), 30);
    assert_eq!(recv_packet_size(0), 26);
    assert_eq!(send_packet_size(100), 30 + 8 + 100);
    assert_eq!(recv_packet_size(100), 26 + 8 + 100);
}

#[test]
fn wire_flag_bits() {
    assert_eq!(WireFlags::IS_REPLY.bits(), 0x0001);
    assert_eq!(WireFlags::HAS_PAYLOAD.bits(), 0x0002);
    assert_eq!(WireFlags::LARGE_PAYLOAD.bits(), 0x0006);
    assert_eq!(WireFlags::ERROR.bits(), 0x8000);
    assert!(WireFlags::LARGE_PAYLOAD.contains(WireFlags::HAS_PAYLOAD));
}

#[test]
fn body_is_big_endian() {
    let mut msg = Message::with_tag(Address::new(0x0102_0304), 0x1112_1314, 0x3132_3334);
    msg.set_custom_flags(0x4142);

    let mut out = [0u8; MESSAGE_BODY_SIZE];
    msg.encode(&mut out).unwrap();

    assert_eq!(
        out,
        [
            0x01, 0x02, 0x03, 0x04, // sender
            0x11, 0x12, 0x13, 0x14, // class
            0x00, 0x00, 0x00, 0x00, // sequence
            0x31, 0x32, 0x33, 0x34, // tag
            0x41, 0x42, // custom flags
        ]
    );

    let decoded = Message::decode(&out, WireFlags::IS_REPLY).unwrap();
    assert_eq!(decoded.sender(), Address::new(0x0102_0304));
    assert_eq!(decoded.class_id(), 0x1112_1314);
    assert_eq!(decoded.tag_id(), 0x3132_3334);
    assert_eq!(decoded.custom_flags(), 0x4142);
    assert!(decoded.is_reply());
}

#[test]
fn prefix_carries_body_size_and_flags() {
    let msg = Message::new(Address::new(1), 9);
    let mut out = [0u8; MESSAGE_PREFIX_SIZE];
    msg.encode_prefix(&mut out).unwrap();
    assert_eq!(out, [0x00, 18, 0x00, 0x00]);

    let (size, flags) = Message::decode_prefix(&[0x00, 18, 0x80, 0x03]).unwrap();
    assert_eq!(size, 18);
    assert_eq!(flags, WireFlags::ERROR | WireFlags::IS_REPLY | WireFlags::HAS_PAYLOAD);
}

#[test]
fn unknown_flag_bits_survive_decoding() {
    let (_, flags) = Message::decode_prefix(&[0x00, 18, 0x01, 0x00]).unwrap();
    assert_eq!(flags.bits(), 0x0100);
}

#[test]
fn payload_header_layout() {
    let data = [0u8; 300];
    let payload = Payload::with_encoding(&data, -2, 7);

    let mut out = [0u8; PAYLOAD_HEADER_SIZE];
    payload.encode_header(&mut out).unwrap();
    assert_eq!(out, [0x00, 0x00, 0x01, 0x2C, 0xFF, 0xFE, 0x00, 0x07]);

    assert_eq!(Payload::decode_header(&out).unwrap(), (300, -2, 7));
}

#[test]
fn truncated_body_reports_first_missing_field() {
    let bytes = [0u8; 10];
    let err = Message::decode(&bytes, WireFlags::empty()).unwrap_err();
    // sender and class fit, the sequence id does not
    assert_eq!(
        err,
        WireError::Truncated {
            needed: 12,
            available: 10
        }
    );
}

#[test]
fn encoding_into_a_short_slice_fails() {
    let msg = Message::new(Address::new(1), 1);
    let mut out = [0u8; 17];
    assert!(matches!(
        msg.encode(&mut out),
        Err(WireError::Truncated {
            needed: 18,
            available: 17
        })
    ));
}

#[test]
fn custom_flags() {
    let mut msg = Message::new(Address::new(3), 4);
    msg.set_custom_flags(0b1010);
    assert!(msg.query_custom_flags(0b1000));
    assert!(msg.query_custom_flags(0b1010));
    assert!(!msg.query_custom_flags(0b0001));
    assert!(msg.query_custom_flags(0b0011));

    msg.clear_custom_flags(0b0010);
    assert_eq!(msg.custom_flags(), 0b1000);
    assert!(msg.wire_flags().is_empty());
}

#[test]
fn default_message_is_the_no_message_sentinel() {
    let msg = Message::default();
    assert!(!msg.is_valid());
    assert_eq!(msg.class_id(), 0);
    assert!(msg.sender().is_null());
}

#[test]
fn payload_size_field_is_32_bits() {
    assert_eq!(Payload::wire_size(0), Ok(0));
    assert_eq!(Payload::wire_size(u32::MAX as usize), Ok(u32::MAX));
    assert_eq!(Payload::new(b"four").size(), 4);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_payload_is_refused() {
    let too_long = u32::MAX as usize + 1;
    assert_eq!(
        Payload::wire_size(too_long),
        Err(WireError::PayloadTooLarge { size: too_long })
    );
    assert!(WireError::PayloadTooLarge { size: too_long }
        .to_string()
        .contains("32-bit"));
}
