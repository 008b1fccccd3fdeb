// In demos/hash_service.rs
//
// A server hashes every request payload with SHA-256 and replies with the
// digest; the client checks each reply against a precomputed hash.
//
// RUST_LOG=dmxp_msg=trace cargo run --example hash_service -- 10000
use dmxp_msg::MSG::Structs::{Message, Payload, ReplyType, ServerRequestId};
use dmxp_msg::MSG::{Client, EndpointBuilder, Messenger, Replier, Server};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::env;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

const HASH_CLASS: u32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages>", args[0]);
        std::process::exit(1);
    }
    let num_messages: usize = args[1].parse().expect("Invalid number of messages");

    println!("HashService: Precomputing {} hashes...", num_messages);
    let start_precompute = std::time::Instant::now();
    let requests: Vec<(String, [u8; 32])> = (0..num_messages)
        .map(|i| {
            let message = format!("message_{}", i);
            let digest: [u8; 32] = Sha256::digest(message.as_bytes()).into();
            (message, digest)
        })
        .collect();
    println!(
        "HashService: Precomputed {} hashes in {:.2?}",
        num_messages,
        start_precompute.elapsed()
    );

    let messenger = Messenger::new_shared();
    let mut server: Server =
        Server::new(&messenger, EndpointBuilder::new().with_buffer_size(64 * 1024))
            .expect("Failed to create server");
    let mut client: Client = Client::new(
        &messenger,
        EndpointBuilder::new()
            .with_send_size(16 * 1024)
            .with_recv_size(64 * 1024),
    )
    .expect("Failed to create client");

    server.on(
        HASH_CLASS,
        Box::new(
            |replier: &mut Replier<'_>, request: ServerRequestId, payload: &Payload<'_>| {
                let digest = Sha256::digest(payload.data());
                if !replier.reply(request, ReplyType::Success, &Payload::new(&digest)) {
                    eprintln!("Reply to request {} did not fit", request.seq_id);
                }
            },
        ),
    );
    println!(
        "HashService: Server at {}, client at {}",
        server.address(),
        client.address()
    );

    let verified = Rc::new(Cell::new(0usize));
    let mismatched = Rc::new(Cell::new(0usize));

    let start = std::time::Instant::now();
    let mut pending = requests.iter().peekable();
    while pending.peek().is_some() || client.pending_count() > 0 {
        // queue as many requests as the send buffer takes
        while let Some((message, expected)) = pending.peek() {
            let expected = *expected;
            let verified = Rc::clone(&verified);
            let mismatched = Rc::clone(&mismatched);
            let seq = client.send(
                server.address(),
                HASH_CLASS,
                0,
                &Payload::new(message.as_bytes()),
                Some(Box::new(move |_msg: &Message, payload: &Payload<'_>| {
                    if payload.data() == &expected[..] {
                        verified.set(verified.get() + 1);
                    } else {
                        mismatched.set(mismatched.get() + 1);
                    }
                })),
            );
            if seq == 0 {
                break;
            }
            pending.next();
        }

        client.transmit();
        server.receive();
        server.transmit();
        let before = verified.get();
        client.receive(0);
        if verified.get() / 1000 > before / 1000 {
            println!("Verified {} replies", verified.get());
        }
    }

    let elapsed = start.elapsed();
    println!("\n=== Hash Service Summary ===");
    println!("Requests: {}", num_messages);
    println!("Verified: {}", verified.get());
    println!("Mismatched: {}", mismatched.get());
    println!("Round trip time: {:.2?}", elapsed);
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "Throughput: {:.0} requests/sec",
            num_messages as f64 / elapsed.as_secs_f64()
        );
    }
}
