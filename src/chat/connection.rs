//! Live connection handles held by the session store.
//!
//! A handle is the sending half of a channel drained by the socket task that owns the
//! actual WebSocket. The store never touches sockets directly.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Instruction delivered to a socket task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionSignal {
    /// Send a text frame.
    Text(String),
    /// Close the socket.
    Close,
}

/// Sending side of a live client connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: u64,
    sender: mpsc::UnboundedSender<ConnectionSignal>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the socket task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConnectionSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, sender }, receiver)
    }

    /// Process-unique handle id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Queue a text frame. Returns `false` when the socket task has gone away.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.sender.send(ConnectionSignal::Text(text.into())).is_ok()
    }

    /// Ask the socket task to close the connection.
    pub fn close(&self) {
        let _ = self.sender.send(ConnectionSignal::Close);
    }

    /// Whether the socket task still listens.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}
