use super::messenger::borrow_shared;
use super::{EndpointBuilder, MsgError, SharedMessenger, TransmitStats};
use crate::MSG::Structs::{
    Address, ClassId, Message, Payload, SequenceId, TagId, ASSIGN_SEQUENCE_ID,
};

/// Callback run by a [`Client`] for a reply or a class notification.
pub trait ClientDelegate {
    fn call(&mut self, msg: &Message, payload: &Payload<'_>);
}

impl<F> ClientDelegate for F
where
    F: FnMut(&Message, &Payload<'_>),
{
    fn call(&mut self, msg: &Message, payload: &Payload<'_>) {
        self(msg, payload)
    }
}

/// Boxed delegate used when a client mixes several closures.
pub type BoxedClientDelegate = Box<dyn FnMut(&Message, &Payload<'_>)>;

/// Request/reply façade over one messenger endpoint.
///
/// Requests get a sequence id and a one-shot delegate that runs when the
/// matching reply arrives. Messages that are not replies go to the delegate
/// registered for their class. Delegates must not call back into the same
/// messenger; such calls are refused.
pub struct Client<D = BoxedClientDelegate> {
    messenger: SharedMessenger,
    address: Address,
    sequence_delegates: Vec<(SequenceId, D)>,
    class_delegates: Vec<(ClassId, D)>,
}

impl<D: ClientDelegate> Client<D> {
    /// Create the client's endpoint on `messenger`.
    pub fn new(messenger: &SharedMessenger, builder: EndpointBuilder) -> Result<Self, MsgError> {
        let address = messenger
            .try_borrow_mut()
            .map_err(|_| MsgError::MessengerBusy)?
            .create_endpoint(builder)?;

        Ok(Self {
            messenger: SharedMessenger::clone(messenger),
            address,
            sequence_delegates: Vec::with_capacity(64),
            class_delegates: Vec::with_capacity(64),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Send a request to `target`; `delegate` runs once when the reply
    /// arrives. Without a delegate nothing is tracked and the reply, if any,
    /// is ignored.
    ///
    /// Returns the request's sequence id, or 0 if it could not be queued.
    pub fn send(
        &mut self,
        target: Address,
        class_id: ClassId,
        tag: TagId,
        payload: &Payload<'_>,
        delegate: Option<D>,
    ) -> SequenceId {
        let Some(mut messenger) = borrow_shared(&self.messenger) else {
            return 0;
        };
        let msg = Message::with_tag(self.address, class_id, tag);
        let Some(seq_id) = messenger.send(msg, target, payload, ASSIGN_SEQUENCE_ID) else {
            return 0;
        };
        let Some(delegate) = delegate else {
            return seq_id;
        };

        match self
            .sequence_delegates
            .binary_search_by_key(&seq_id, |(id, _)| *id)
        {
            Ok(index) => {
                // only possible once the id space wrapped onto a request that
                // never got its reply
                debug_assert!(false, "sequence id {seq_id} is already pending");
                self.sequence_delegates[index].1 = delegate;
            }
            Err(index) => self.sequence_delegates.insert(index, (seq_id, delegate)),
        }
        seq_id
    }

    /// Register the delegate for messages of `class_id`, replacing any
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

    /// Forget a pending request; its reply will be ignored.
    pub fn cancel(&mut self, seq_id: SequenceId) -> bool {
        match self
            .sequence_delegates
            .binary_search_by_key(&seq_id, |(id, _)| *id)
        {
            Ok(index) => {
                self.sequence_delegates.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_pending(&self, seq_id: SequenceId) -> bool {
        self.sequence_delegates
            .binary_search_by_key(&seq_id, |(id, _)| *id)
            .is_ok()
    }

    pub fn pending_count(&self) -> usize {
        self.sequence_delegates.len()
    }

    /// Push this client's queued packets towards their receivers.
    pub fn transmit(&mut self) -> TransmitStats {
        borrow_shared(&self.messenger)
            .map(|mut messenger| messenger.transmit(self.address))
            .unwrap_or_default()
    }

    /// Handle at most one incoming message.
    ///
    /// A non-zero `tag` only lets messages carrying that same tag reach their
    /// delegate; a filtered reply still retires its request. Returns whether a
    /// message was taken off the receive buffer.
    pub fn receive_one(&mut self, tag: TagId) -> bool {
        let Some(mut messenger) = borrow_shared(&self.messenger) else {
            return false;
        };

        let received = match messenger.poll_receive(self.address) {
            Some((msg, payload)) => {
                let run_delegate = tag == 0 || (msg.tag_id() != 0 && msg.tag_id() == tag);
                if msg.is_reply() {
                    if let Ok(index) = self
                        .sequence_delegates
                        .binary_search_by_key(&msg.seq_id(), |(id, _)| *id)
                    {
                        let (_, mut delegate) = self.sequence_delegates.remove(index);
                        if run_delegate {
                            delegate.call(&msg, &payload);
                        }
                    }
                } else if let Ok(index) = self
                    .class_delegates
                    .binary_search_by_key(&msg.class_id(), |(id, _)| *id)
                {
                    if run_delegate {
                        self.class_delegates[index].1.call(&msg, &payload);
                    }
                }
                true
            }
            None => false,
        };

        messenger.poll_end(self.address, true);
        received
    }

    /// Handle every message currently waiting. Returns how many were taken.
    pub fn receive(&mut self, tag: TagId) -> usize {
        let mut count = 0;
        while self.receive_one(tag) {
            count += 1;
        }
        count
    }
}

impl<D> Drop for Client<D> {
    fn drop(&mut self) {
        match self.messenger.try_borrow_mut() {
            Ok(mut messenger) => {
                messenger.destroy_endpoint(self.address);
            }
            Err(_) => {
                tracing::warn!(address = %self.address, "messenger busy, client endpoint left attached");
            }
        }
    }
}
