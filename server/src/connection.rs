//! Handle used by the game layer to talk to one remote client
//!
//! The transport owns the socket; everything above it only sees a
//! [`ConnectionHandle`] that queues [`Outbound`] items onto the connection's
//! channel. Sending to a connection that has already gone away is a no-op, so
//! a broadcast racing with a disconnect can never fail the sender.

use log::trace;
use shared::{DisconnectReason, MessageWriter};
use std::net::{IpAddr, SocketAddr};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Data {
        bytes: Vec<u8>,
        reliable: bool,
    },
    Disconnect {
        reason: DisconnectReason,
        message: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { addr, tx }, rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn send(&self, bytes: Vec<u8>, reliable: bool) {
        if self.tx.send(Outbound::Data { bytes, reliable }).is_err() {
            trace!("Dropped message for closed connection {}", self.addr);
        }
    }

    pub fn send_reliable(&self, writer: MessageWriter) {
        self.send(writer.into_bytes(), true);
    }

    pub fn disconnect(&self, reason: DisconnectReason, message: Option<String>) {
        if self
            .tx
            .send(Outbound::Disconnect { reason, message })
            .is_err()
        {
            trace!("Connection {} already closed", self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:22023".parse().unwrap()
    }

    #[test]
    fn test_send_queues_data() {
        let (handle, mut rx) = ConnectionHandle::new(test_addr());
        handle.send(vec![1, 2, 3], true);

        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Data {
                bytes: vec![1, 2, 3],
                reliable: true
            }
        );
    }

    #[test]
    fn test_send_after_close_is_noop() {
        let (handle, rx) = ConnectionHandle::new(test_addr());
        drop(rx);

        assert!(handle.is_closed());
        handle.send(vec![1], false);
        handle.disconnect(DisconnectReason::Kicked, None);
    }

    #[test]
    fn test_disconnect_queues_reason() {
        let (handle, mut rx) = ConnectionHandle::new(test_addr());
        handle.disconnect(DisconnectReason::Custom, Some("bye".into()));

        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Disconnect {
                reason: DisconnectReason::Custom,
                message: Some("bye".into())
            }
        );
    }
}
