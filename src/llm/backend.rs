//! Model backend abstraction used by the response generator.

use std::future::Future;
use std::pin::Pin;

use crate::chat::message::PromptMessage;
use crate::core::errors::AgentResult;

/// Boxed future type for backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat-completion service.
pub trait ChatBackend: Send + Sync {
    /// Whether the service is reachable and serves the configured model.
    fn is_available(&self) -> BackendFuture<'_, bool>;

    /// Generate a reply for a role-tagged message sequence.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status or malformed body.
    fn chat(&self, messages: Vec<PromptMessage>) -> BackendFuture<'_, AgentResult<String>>;

    /// Name of the model answering requests.
    fn model_name(&self) -> &str;
}
