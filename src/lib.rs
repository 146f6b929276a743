//! Customer-support assistant for the BigBikeBlitz motorcycle store.
//!
//! Chat messages arrive over WebSocket or REST, relevant storefront and product
//! documents are retrieved from the corpus, and a locally served model answers with
//! the documents as context. When the model is unavailable, rule-based replies keep
//! the conversation going.

// Unsafe code and undocumented public items are not accepted
#![forbid(unsafe_code)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![deny(overflowing_literals)]
#![warn(unused_imports)]
#![warn(unused_variables)]
#![warn(dead_code)]

// Clippy
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::redundant_clone)]
#![allow(clippy::module_name_repetitions)]

/// Conversation state and live connections.
pub mod chat;
/// Configuration, errors and identifiers.
pub mod core;
/// Searchable document corpus.
pub mod corpus;
/// Per-message chat orchestration.
pub mod engine;
/// Corpus ingestion from the storefront and shop backend.
pub mod ingest;
/// Model client, response cache and fallback replies.
pub mod llm;
/// Prompt composition.
pub mod prompt;
/// HTTP server and API routes.
#[allow(clippy::missing_errors_doc, clippy::unused_async)]
pub mod server;
/// Entry helpers to start the assistant.
pub mod start_blitz_agent;
/// Conversation log, analytics and retention.
pub mod storage;
