// In demos/ticker.rs
//
// A server streams tick notifications to a client whose receive buffer only
// holds a few packets, so every transmit runs into backpressure. The client
// drains slower than the server publishes.
//
// cargo run --example ticker -- [max_ticks]
use dmxp_msg::MSG::Structs::{Message, Payload};
use dmxp_msg::MSG::{Client, EndpointBuilder, Messenger, Server};
use std::cell::Cell;
use std::env;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TICK_CLASS: u32 = 9;

fn main() {
    tracing_subscriber::fmt::init();

    let max_ticks: u64 = env::args()
        .nth(1)
        .map(|arg| arg.parse().expect("Invalid number of ticks"))
        .unwrap_or(u64::MAX);

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);

    // Handle Ctrl+C to stop the loop
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let messenger = Messenger::new_shared();
    let mut server: Server = Server::new(&messenger, EndpointBuilder::new().with_send_size(4096))
        .expect("Failed to create server");
    let mut client: Client = Client::new(&messenger, EndpointBuilder::new().with_recv_size(256))
        .expect("Failed to create client");
    println!(
        "Ticker: Server {} -> client {}",
        server.address(),
        client.address()
    );

    let last_tick = Rc::new(Cell::new(0u64));
    let tick_seen = Rc::clone(&last_tick);
    client.on(
        TICK_CLASS,
        Box::new(move |_msg: &Message, payload: &Payload<'_>| {
            let mut number = [0u8; 8];
            number.copy_from_slice(payload.data());
            let tick = u64::from_be_bytes(number);
            assert_eq!(tick, tick_seen.get() + 1, "ticks arrived out of order");
            tick_seen.set(tick);
        }),
    );

    let start = Instant::now();
    let mut sent = 0u64;
    let mut queue_full = 0u64;
    let mut delivered = 0usize;
    let mut held_passes = 0usize;

    while running.load(Ordering::SeqCst) && last_tick.get() < max_ticks {
        // a burst of ticks, each carrying its own number
        for _ in 0..8 {
            if sent >= max_ticks {
                break;
            }
            let tick = (sent + 1).to_be_bytes();
            if server.notify(client.address(), TICK_CLASS, &Payload::new(&tick)) {
                sent += 1;
            } else {
                queue_full += 1;
                break;
            }
        }

        let stats = server.transmit();
        delivered += stats.delivered;
        if stats.held {
            held_passes += 1;
        }

        // the client takes at most two ticks per pass
        let before = last_tick.get();
        for _ in 0..2 {
            if !client.receive_one(0) {
                break;
            }
        }

        if last_tick.get() / 10_000 > before / 10_000 {
            println!(
                "Received {} ticks ({} delivered, {} held passes)",
                last_tick.get(),
                delivered,
                held_passes
            );
        }
        if max_ticks == u64::MAX {
            std::thread::sleep(Duration::from_micros(10));
        }
    }

    println!("\n=== Ticker Summary ===");
    println!("Sent: {}", sent);
    println!("Send queue full: {}", queue_full);
    println!("Delivered: {}", delivered);
    println!("Held passes: {}", held_passes);
    println!("Received: {}", last_tick.get());
    println!("Elapsed: {:.2?}", start.elapsed());
}
