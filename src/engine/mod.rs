//! Chat orchestration module.

pub mod core;

pub use core::{APOLOGY_REPLY, ChatEngine, ChatReply};
