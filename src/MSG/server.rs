use std::collections::HashMap;

use super::endpoint::Outbox;
use super::messenger::borrow_shared;
use super::{EndpointBuilder, MsgError, SharedMessenger, TransmitStats};
use crate::MSG::Structs::{
    Address, ClassId, Message, Payload, ReplyType, ServerRequestId, TagId, WireFlags,
    NULL_SEQUENCE_ID,
};

/// Callback run by a [`Server`] for each request of a registered class.
pub trait ServerDelegate {
    fn call(&mut self, replier: &mut Replier<'_>, request: ServerRequestId, payload: &Payload<'_>);
}

impl<F> ServerDelegate for F
where
    F: FnMut(&mut Replier<'_>, ServerRequestId, &Payload<'_>),
{
    fn call(&mut self, replier: &mut Replier<'_>, request: ServerRequestId, payload: &Payload<'_>) {
        self(replier, request, payload)
    }
}

/// Boxed delegate used when a server mixes several closures.
pub type BoxedServerDelegate = Box<dyn FnMut(&mut Replier<'_>, ServerRequestId, &Payload<'_>)>;

/// Who asked, and with which tag, for a request still waiting for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveRequest {
    pub(crate) sender: Address,
    pub(crate) tag: TagId,
}

/// Reply handle given to a server delegate.
///
/// Writes straight into the server's send buffer, so the delegate can answer
/// while it still holds the request payload.
pub struct Replier<'a> {
    address: Address,
    outbox: Outbox<'a>,
    active_requests: &'a mut HashMap<ServerRequestId, ActiveRequest>,
}

impl Replier<'_> {
    /// The server's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Answer an active request. See [`Server::reply`].
    pub fn reply(
        &mut self,
        request: ServerRequestId,
        reply_type: ReplyType,
        payload: &Payload<'_>,
    ) -> bool {
        send_reply(
            &mut self.outbox,
            self.address,
            self.active_requests,
            request,
            reply_type,
            payload,
        )
    }

    /// Send a one-way message. See [`Server::notify`].
    pub fn notify(&mut self, target: Address, class_id: ClassId, payload: &Payload<'_>) -> bool {
        self.outbox
            .send(Message::new(self.address, class_id), target, payload, NULL_SEQUENCE_ID)
            .is_some()
    }

    pub fn query_sender_address(&self, request: ServerRequestId) -> Address {
        self.active_requests
            .get(&request)
            .map_or(Address::NULL, |active| active.sender)
    }
}

/// Request handling façade over one messenger endpoint.
///
/// Requests of a registered class are remembered until answered with
/// [`Server::reply`] (or [`Replier::reply`] from inside the delegate), so a
/// reply may be sent long after the delegate returned.
pub struct Server<D = BoxedServerDelegate> {
    messenger: SharedMessenger,
    address: Address,
    class_delegates: Vec<(ClassId, D)>,
    active_requests: HashMap<ServerRequestId, ActiveRequest>,
}

impl<D: ServerDelegate> Server<D> {
    /// Create the server's endpoint on `messenger`.
    pub fn new(messenger: &SharedMessenger, builder: EndpointBuilder) -> Result<Self, MsgError> {
        let address = messenger
            .try_borrow_mut()
            .map_err(|_| MsgError::MessengerBusy)?
            .create_endpoint(builder)?;

        Ok(Self {
            messenger: SharedMessenger::clone(messenger),
            address,
            class_delegates: Vec::with_capacity(64),
            active_requests: HashMap::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Register the delegate for requests of `class_id`, replacing any
    /// previous one.
    pub fn on(&mut self, class_id: ClassId, delegate: D) {
        match self
            .class_delegates
            .binary_search_by_key(&class_id, |(id, _)| *id)
        {
            Ok(index) => self.class_delegates[index].1 = delegate,
            Err(index) => self.class_delegates.insert(index, (class_id, delegate)),
        }
    }

    /// Drop the delegate for `class_id`. Returns whether one was registered.
    pub fn remove(&mut self, class_id: ClassId) -> bool {
        match self
            .class_delegates
            .binary_search_by_key(&class_id, |(id, _)| *id)
        {
            Ok(index) => {
                self.class_delegates.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Answer an active request.
    ///
    /// The reply goes to the original sender, with its tag and sequence id.
    /// Returns false for an unknown request or a full send buffer; the request
    /// stays active in the latter case so the reply can be retried.
    pub fn reply(
        &mut self,
        request: ServerRequestId,
        reply_type: ReplyType,
        payload: &Payload<'_>,
    ) -> bool {
        let Some(mut messenger) = borrow_shared(&self.messenger) else {
            return false;
        };
        let Some(endpoint) = messenger.endpoint_mut(self.address) else {
            return false;
        };

        send_reply(
            &mut endpoint.outbox(),
            self.address,
            &mut self.active_requests,
            request,
            reply_type,
            payload,
        )
    }

    /// Send a one-way message that expects no reply.
    pub fn notify(&mut self, target: Address, class_id: ClassId, payload: &Payload<'_>) -> bool {
        let Some(mut messenger) = borrow_shared(&self.messenger) else {
            return false;
        };
        messenger
            .send(Message::new(self.address, class_id), target, payload, NULL_SEQUENCE_ID)
            .is_some()
    }

    /// Sender of an active request, or [`Address::NULL`].
    pub fn query_sender_address(&self, request: ServerRequestId) -> Address {
        self.active_requests
            .get(&request)
            .map_or(Address::NULL, |active| active.sender)
    }

    pub fn active_request_count(&self) -> usize {
        self.active_requests.len()
    }

    /// Push this server's queued packets towards their receivers.
    pub fn transmit(&mut self) -> TransmitStats {
        borrow_shared(&self.messenger)
            .map(|mut messenger| messenger.transmit(self.address))
            .unwrap_or_default()
    }

    /// Handle at most one incoming message. Returns whether a message was
    /// taken off the receive buffer.
    pub fn receive_one(&mut self) -> bool {
        let Some(mut messenger) = borrow_shared(&self.messenger) else {
            return false;
        };
        let Some(endpoint) = messenger.endpoint_mut(self.address) else {
            return false;
        };
        let (mut inbox, outbox) = endpoint.split();

        let received = match inbox.receive() {
            Some((msg, payload)) => {
                if let Ok(index) = self
                    .class_delegates
                    .binary_search_by_key(&msg.class_id(), |(id, _)| *id)
                {
                    let request = ServerRequestId::new(msg.seq_id(), msg.class_id());

                    // notifications and stray replies cannot be answered
                    if msg.seq_id() != NULL_SEQUENCE_ID && !msg.is_reply() {
                        let active = ActiveRequest {
                            sender: msg.sender(),
                            tag: msg.tag_id(),
                        };
                        if let Some(previous) = self.active_requests.insert(request, active) {
                            tracing::warn!(
                                seq_id = request.seq_id,
                                class_id = request.class_id,
                                previous = %previous.sender,
                                sender = %active.sender,
                                "active request overwritten"
                            );
                        }
                    }

                    let mut replier = Replier {
                        address: self.address,
                        outbox,
                        active_requests: &mut self.active_requests,
                    };
                    self.class_delegates[index]
                        .1
                        .call(&mut replier, request, &payload);
                }
                true
            }
            None => false,
        };

        inbox.receive_end(true);
        received
    }

    /// Handle every message currently waiting. Returns how many were taken.
    pub fn receive(&mut self) -> usize {
        let mut count = 0;
        while self.receive_one() {
            count += 1;
        }
        count
    }
}

impl<D> Drop for Server<D> {
    fn drop(&mut self) {
        match self.messenger.try_borrow_mut() {
            Ok(mut messenger) => {
                messenger.destroy_endpoint(self.address);
            }
            Err(_) => {
                tracing::warn!(address = %self.address, "messenger busy, server endpoint left attached");
            }
        }
    }
}

fn send_reply(
    outbox: &mut Outbox<'_>,
    address: Address,
    active_requests: &mut HashMap<ServerRequestId, ActiveRequest>,
    request: ServerRequestId,
    reply_type: ReplyType,
    payload: &Payload<'_>,
) -> bool {
    let Some(active) = active_requests.get(&request).copied() else {
        tracing::trace!(seq_id = request.seq_id, class_id = request.class_id, "reply to unknown request");
        return false;
    };

    let mut msg = Message::with_tag(address, request.class_id, active.tag);
    if reply_type == ReplyType::Fail {
        msg.set_wire_flags(WireFlags::ERROR);
    }

    match outbox.send(msg, active.sender, payload, request.seq_id) {
        Some(_) => {
            active_requests.remove(&request);
            true
        }
        None => false,
    }
}
