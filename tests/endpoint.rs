use dmxp_msg::MSG::Buffer::layout::{MESSAGE_BODY_SIZE, PAYLOAD_HEADER_SIZE};
use dmxp_msg::MSG::Buffer::RingBuffer;
use dmxp_msg::MSG::Structs::{
    Address, Message, Payload, WireFlags, ASSIGN_SEQUENCE_ID, NULL_SEQUENCE_ID,
};
use dmxp_msg::MSG::{Endpoint, EndpointBuilder};

fn push_chunk(rb: &mut RingBuffer, bytes: &[u8]) {
    rb.reserve_write(bytes.len()).unwrap().copy_from_slice(bytes);
}

/// Write a receive-side packet the way the messenger lays it out.
fn push_packet(rb: &mut RingBuffer, msg: &Message, flags: u16, payload: &[u8]) {
    push_chunk(rb, b"mesg");
    push_chunk(rb, &[0, MESSAGE_BODY_SIZE as u8, (flags >> 8) as u8, flags as u8]);
    let mut body = [0u8; MESSAGE_BODY_SIZE];
    msg.encode(&mut body).unwrap();
    push_chunk(rb, &body);
    if !payload.is_empty() {
        let mut header = [0u8; PAYLOAD_HEADER_SIZE];
        Payload::new(payload).encode_header(&mut header).unwrap();
        push_chunk(rb, &header);
        push_chunk(rb, payload);
    }
    rb.update_write();
}

fn endpoint() -> Endpoint {
    EndpointBuilder::new().build().unwrap()
}

#[test]
fn send_frames_one_packet() {
    let mut ep = endpoint();
    let msg = Message::with_tag(Address::new(5), 42, 3);
    let seq = ep.send(msg, Address::new(9), &Payload::new(b"abc"), ASSIGN_SEQUENCE_ID);
    assert_eq!(seq, Some(1));
    assert_eq!(ep.sequence_id(), 1);

    let send = ep.send_buffer_mut();
    assert_eq!(send.read_size(), 30 + 8 + 3);
    assert_eq!(send.reserve_read(8).unwrap(), b"mesg\x00\x00\x00\x09");
    assert_eq!(send.reserve_read(4).unwrap(), &[0, 18, 0, 2]);

    let body = send.reserve_read(MESSAGE_BODY_SIZE).unwrap();
    let decoded = Message::decode(body, WireFlags::HAS_PAYLOAD).unwrap();
    assert_eq!(decoded.sender(), Address::new(5));
    assert_eq!(decoded.class_id(), 42);
    assert_eq!(decoded.seq_id(), 1);
    assert_eq!(decoded.tag_id(), 3);

    assert_eq!(send.reserve_read(8).unwrap(), &[0, 0, 0, 3, 0, 0, 0, 0]);
    assert_eq!(send.reserve_read(3).unwrap(), b"abc");
    assert_eq!(send.reserve_read(1), None);
}

#[test]
fn notification_and_reply_flags() {
    let mut ep = endpoint();
    let from = Address::new(1);

    assert_eq!(
        ep.send(Message::new(from, 1), Address::new(2), &Payload::empty(), NULL_SEQUENCE_ID),
        Some(0)
    );
    assert_eq!(
        ep.send(Message::new(from, 1), Address::new(2), &Payload::empty(), 77),
        Some(77)
    );
    // neither moved the counter
    assert_eq!(ep.sequence_id(), 0);

    let send = ep.send_buffer_mut();
    send.reserve_read(8).unwrap();
    assert_eq!(send.reserve_read(4).unwrap(), &[0, 18, 0, 0]);
    send.reserve_read(MESSAGE_BODY_SIZE).unwrap();

    send.reserve_read(8).unwrap();
    assert_eq!(send.reserve_read(4).unwrap(), &[0, 18, 0, 1]);
}

#[test]
fn sequence_ids_skip_reserved_values() {
    let mut ep = EndpointBuilder::new()
        .with_initial_sequence_id(0xFFFF_FFFD)
        .build()
        .unwrap();
    let mut next = || {
        let seq = ep.send(
            Message::new(Address::new(1), 1),
            Address::new(2),
            &Payload::empty(),
            ASSIGN_SEQUENCE_ID,
        );
        ep.send_buffer_mut().reset();
        seq
    };

    assert_eq!(next(), Some(0xFFFF_FFFE));
    assert_eq!(next(), Some(1));
    assert_eq!(next(), Some(2));
}

#[test]
fn failed_send_leaves_no_trace() {
    let mut ep = EndpointBuilder::new().with_send_size(40).build().unwrap();
    let from = Address::new(1);

    // header and body fit, the payload does not
    let big = [0u8; 16];
    assert_eq!(
        ep.send(Message::new(from, 1), Address::new(2), &Payload::new(&big), ASSIGN_SEQUENCE_ID),
        None
    );
    assert_eq!(ep.sequence_id(), 0);
    assert_eq!(ep.send_buffer().read_size(), 0);
    assert_eq!(ep.send_buffer().cursors(), (0, 0, 0, 0));

    // a packet that fits still gets the first id
    assert_eq!(
        ep.send(Message::new(from, 1), Address::new(2), &Payload::empty(), ASSIGN_SEQUENCE_ID),
        Some(1)
    );
}

#[test]
fn receive_peek_then_consume() {
    let mut ep = endpoint();
    let msg = Message::with_tag(Address::new(4), 11, 6);
    push_packet(ep.recv_buffer_mut(), &msg, WireFlags::HAS_PAYLOAD.bits(), b"payload");

    {
        let (got, payload) = ep.receive().unwrap();
        assert_eq!(got.class_id(), 11);
        assert_eq!(got.tag_id(), 6);
        assert!(got.has_payload());
        assert_eq!(payload.data(), b"payload");
    }
    ep.receive_end(false);

    let (got, _) = ep.receive().unwrap();
    assert_eq!(got.sender(), Address::new(4));
    ep.receive_end(true);

    assert!(ep.receive().is_none());
    assert_eq!(ep.recv_buffer().read_size(), 0);
}

#[test]
fn several_receives_in_one_poll() {
    let mut ep = endpoint();
    for class in 1..=3 {
        push_packet(ep.recv_buffer_mut(), &Message::new(Address::new(8), class), 0, &[]);
    }

    let mut classes = Vec::new();
    while let Some((msg, payload)) = ep.receive() {
        assert!(payload.is_empty());
        classes.push(msg.class_id());
    }
    ep.receive_end(true);

    assert_eq!(classes, vec![1, 2, 3]);
    assert_eq!(ep.recv_buffer().read_size(), 0);
}

#[test]
fn bad_magic_is_skipped_on_consume() {
    let mut ep = endpoint();
    let recv = ep.recv_buffer_mut();
    push_chunk(recv, b"junk");
    recv.update_write();
    push_packet(recv, &Message::new(Address::new(2), 5), 0, &[]);

    assert!(ep.receive().is_none());
    ep.receive_end(true);

    let (msg, _) = ep.receive().unwrap();
    assert_eq!(msg.class_id(), 5);
}

#[test]
fn short_body_is_dropped_with_its_payload() {
    let mut ep = endpoint();
    let recv = ep.recv_buffer_mut();
    push_chunk(recv, b"mesg");
    push_chunk(recv, &[0, 6, 0, WireFlags::HAS_PAYLOAD.bits() as u8]);
    push_chunk(recv, &[0u8; 6]);
    push_chunk(recv, &[0, 0, 0, 2, 0, 0, 0, 0]);
    push_chunk(recv, &[1, 2]);
    recv.update_write();
    push_packet(recv, &Message::new(Address::new(2), 12), 0, &[]);

    assert!(ep.receive().is_none());
    ep.receive_end(true);

    let (msg, _) = ep.receive().unwrap();
    assert_eq!(msg.class_id(), 12);
}

#[test]
fn incomplete_packet_is_left_for_later() {
    let mut ep = endpoint();
    push_packet(ep.recv_buffer_mut(), &Message::new(Address::new(2), 1), 0, &[]);
    let recv = ep.recv_buffer_mut();
    push_chunk(recv, b"mesg");
    push_chunk(recv, &[0, 18, 0, 0]);
    recv.update_write();

    assert_eq!(ep.receive().map(|(msg, _)| msg.class_id()), Some(1));
    // the second packet has no body yet; the first stays read
    assert!(ep.receive().is_none());
    ep.receive_end(true);
    assert_eq!(ep.recv_buffer().read_size(), 8);
}

#[test]
fn split_receives_and_sends_together() {
    let mut ep = endpoint();
    push_packet(
        ep.recv_buffer_mut(),
        &Message::new(Address::new(3), 20),
        WireFlags::HAS_PAYLOAD.bits(),
        b"ping",
    );

    let (mut inbox, mut outbox) = ep.split();
    let (msg, payload) = inbox.receive().unwrap();
    let echoed = outbox.send(Message::new(Address::new(1), 21), msg.sender(), &payload, msg.seq_id());
    assert_eq!(echoed, Some(0));
    inbox.receive_end(true);

    assert_eq!(ep.recv_buffer().read_size(), 0);
    assert_eq!(ep.send_buffer().read_size(), 30 + 8 + 4);
}
