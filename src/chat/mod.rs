//! Conversation state: messages, live connections and the session store.

pub mod connection;
pub mod message;
pub mod session_store;

pub use connection::{ConnectionHandle, ConnectionSignal};
pub use message::{Message, PromptMessage, Role};
pub use session_store::{SessionExport, SessionStats, SessionStore};
