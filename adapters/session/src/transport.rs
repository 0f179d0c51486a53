//! Transport contract and an in-process implementation.
//!
//! A transport moves whole actions between two endpoints. The session layer
//! never assumes anything about framing or reconnection; it only needs
//! ordered delivery per connection and a way to learn that the peer left.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use fog_sync_core::{decode, encode, Action, WireError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Failures surfaced by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed by either side.
    #[error("transport closed")]
    Closed,
    /// An outgoing action could not be serialised.
    #[error("failed to encode outgoing action")]
    Encode(#[source] WireError),
    /// An incoming message could not be decoded. The connection stays open.
    #[error("failed to decode incoming action")]
    Decode(#[source] WireError),
}

/// Bidirectional, ordered channel of actions.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queues an action for the peer.
    fn send(&self, action: &Action) -> Result<(), TransportError>;

    /// Blocks until the next action arrives or the connection ends.
    fn receive_next(&self) -> Result<Action, TransportError>;

    /// Reports whether the connection is still open.
    fn is_alive(&self) -> bool;

    /// Closes the connection for both endpoints. Idempotent.
    fn close(&self);
}

enum Frame {
    Envelope(Vec<u8>),
    Hangup,
}

/// In-process transport that still routes every action through the wire
/// codec.
pub struct ChannelTransport {
    peer: UnboundedSender<Frame>,
    own: UnboundedSender<Frame>,
    inbox: Mutex<UnboundedReceiver<Frame>>,
    alive: AtomicBool,
}

impl ChannelTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let left = Self {
            peer: right_tx.clone(),
            own: left_tx.clone(),
            inbox: Mutex::new(left_rx),
            alive: AtomicBool::new(true),
        };
        let right = Self {
            peer: left_tx,
            own: right_tx,
            inbox: Mutex::new(right_rx),
            alive: AtomicBool::new(true),
        };
        (left, right)
    }

    /// Sends raw bytes to the peer without encoding them first.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        self.peer
            .send(Frame::Envelope(bytes))
            .map_err(|_| TransportError::Closed)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, action: &Action) -> Result<(), TransportError> {
        let bytes = encode(action).map_err(TransportError::Encode)?;
        self.send_bytes(bytes)
    }

    fn receive_next(&self) -> Result<Action, TransportError> {
        let frame = {
            let mut inbox = self.inbox.lock().map_err(|_| TransportError::Closed)?;
            inbox.blocking_recv()
        };
        match frame {
            Some(Frame::Envelope(bytes)) => decode(&bytes).map_err(TransportError::Decode),
            Some(Frame::Hangup) | None => {
                self.alive.store(false, Ordering::SeqCst);
                Err(TransportError::Closed)
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let _ = self.peer.send(Frame::Hangup);
            let _ = self.own.send(Frame::Hangup);
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Feeds every decodable action to `deliver` until the connection closes or
/// `deliver` returns `false`. Undecodable messages are logged and skipped.
pub(crate) fn read_until_closed(
    transport: &dyn Transport,
    mut deliver: impl FnMut(Action) -> bool,
) {
    loop {
        match transport.receive_next() {
            Ok(action) => {
                if !deliver(action) {
                    break;
                }
            }
            Err(TransportError::Closed) => {
                debug!("transport closed");
                break;
            }
            Err(error) => warn!(%error, "dropping unreadable message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fog_sync_core::UnitId;

    #[test]
    fn actions_cross_in_order() {
        let (left, right) = ChannelTransport::pair();
        let first = Action::MoveStop(UnitId::random());
        let second = Action::MoveStop(UnitId::random());

        left.send(&first).unwrap();
        left.send(&second).unwrap();

        assert_eq!(right.receive_next().unwrap(), first);
        assert_eq!(right.receive_next().unwrap(), second);
    }

    #[test]
    fn undecodable_bytes_do_not_close_the_connection() {
        let (left, right) = ChannelTransport::pair();
        left.send_bytes(br#"{"type":"Teleport","payload":{}}"#.to_vec())
            .unwrap();
        let stop = Action::MoveStop(UnitId::random());
        left.send(&stop).unwrap();

        assert!(matches!(
            right.receive_next(),
            Err(TransportError::Decode(WireError::UnrecognizedActionKind(_)))
        ));
        assert!(right.is_alive());
        assert_eq!(right.receive_next().unwrap(), stop);
    }

    #[test]
    fn closing_ends_both_endpoints() {
        let (left, right) = ChannelTransport::pair();
        left.close();

        assert!(!left.is_alive());
        assert!(matches!(right.receive_next(), Err(TransportError::Closed)));
        assert!(!right.is_alive());
        assert!(matches!(left.receive_next(), Err(TransportError::Closed)));
        assert!(matches!(
            left.send(&Action::MoveStop(UnitId::random())),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn reader_skips_garbage_and_stops_on_close() {
        let (left, right) = ChannelTransport::pair();
        let stop = Action::MoveStop(UnitId::random());
        left.send_bytes(b"not json".to_vec()).unwrap();
        left.send(&stop).unwrap();
        left.close();

        let mut seen = Vec::new();
        read_until_closed(&right, |action| {
            seen.push(action);
            true
        });
        assert_eq!(seen, vec![stop]);
    }

    #[test]
    fn dropping_an_endpoint_hangs_up() {
        let (left, right) = ChannelTransport::pair();
        drop(left);
        assert!(matches!(right.receive_next(), Err(TransportError::Closed)));
    }
}
