// Module naming follows project convention (MSG = message passing layer)
#[allow(non_snake_case)]
pub mod MSG {
    pub mod Buffer {
        pub mod Buffer;
        pub mod Buffer_impl;
        pub mod layout;
        pub use Buffer::RingBuffer; // re-export for stable path
    }
    pub mod Structs {
        pub mod Message_Structs;
        pub use Message_Structs::{
            Address, ClassId, Message, Payload, ReplyType, SequenceId, ServerRequestId, TagId,
            WireError, WireFlags, ASSIGN_SEQUENCE_ID, NULL_SEQUENCE_ID,
        }; // re-export for stable path
    }

    mod builder;
    mod client;
    mod endpoint;
    mod error;
    mod messenger;
    mod server;

    pub use builder::{EndpointBuilder, DEFAULT_BUFFER_SIZE};
    pub use client::{BoxedClientDelegate, Client, ClientDelegate};
    pub use endpoint::{Endpoint, Inbox, Outbox};
    pub use error::MsgError;
    pub use messenger::{Messenger, SharedMessenger, TransmitStats};
    pub use server::{BoxedServerDelegate, Replier, Server, ServerDelegate};
}

#[allow(non_snake_case)]
pub mod Core {
    pub mod alloc;
    pub use alloc::{AllocStats, Allocator, HeapAllocator, TrackingAllocator};
}

#[allow(non_snake_case)]
pub(crate) mod Debug {
    pub mod StructDebug;
}
