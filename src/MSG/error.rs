use thiserror::Error;

/// Errors raised while setting up buffers, endpoints and façades.
///
/// Runtime conditions (full buffers, unknown addresses, corrupted packets) are
/// not errors: they surface as `None`, `false` or [`super::TransmitStats`]
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MsgError {
    #[error("ring buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("allocator refused a {size}-byte block")]
    AllocationFailed { size: usize },

    #[error("every endpoint address is in use")]
    AddressSpaceExhausted,

    #[error("messenger is already borrowed")]
    MessengerBusy,
}
