//! Outbound half of a server connection.

use thiserror::Error;

use crate::protocol::{Outgoing, ProtocolError};

/// Errors from handing a message to the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is gone.
    #[error("transport closed")]
    Closed,

    /// The message could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Sends framed requests to the server.
///
/// Replies travel the other way through a
/// [`ReplySender`](patchcord_core::ReplySender) owned by whatever reads the
/// connection, so a transport only needs to be able to send.
pub trait Transport {
    /// Queues `message` for delivery. Never blocks on the server.
    fn send(&self, message: Outgoing) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, message: Outgoing) -> Result<(), TransportError> {
        (**self).send(message)
    }
}
