//! Prompt composer for retrieval-augmented chat.

use crate::chat::message::PromptMessage;
use crate::core::config::ChatConfig;
use crate::corpus::document::{Document, DocumentKind};

/// Persona and instructions sent as the system message.
pub const SYSTEM_PROMPT: &str = "You are BigBikeBlitz AI Assistant for motorcycle e-commerce. \
Be concise, helpful, and accurate.

Focus on:
- Motorcycle specifications, prices, and features
- Product comparisons and recommendations
- BigBikeBlitz services (financing, warranty, delivery)
- Technical motorcycle information

Keep responses under 200 words unless detailed specs are requested.";

const CONTEXT_HEADER: &str = "\n\nRelevant product info:\n";
const ELLIPSIS: char = '…';

/// Limits applied while composing a prompt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PromptBudget {
    /// History messages carried into the prompt, most recent kept.
    pub history_window: usize,
    /// Characters of a document body rendered into the context section.
    pub max_document_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_document_chars: 1500,
        }
    }
}

impl From<&ChatConfig> for PromptBudget {
    fn from(config: &ChatConfig) -> Self {
        Self {
            history_window: config.prompt_history_messages,
            max_document_chars: config.max_document_chars,
        }
    }
}

/// Compose the message sequence sent to the model: system (persona plus context),
/// the most recent history in order, then the query verbatim.
#[must_use]
pub fn build_prompt(
    query: &str,
    context: &[Document],
    history: &[PromptMessage],
    budget: PromptBudget,
) -> Vec<PromptMessage> {
    let skip = history.len().saturating_sub(budget.history_window);
    let mut messages = Vec::with_capacity(history.len() - skip + 2);

    messages.push(PromptMessage::system(build_system_message(
        context,
        budget.max_document_chars,
    )));
    messages.extend(history.iter().skip(skip).cloned());
    messages.push(PromptMessage::user(query));
    messages
}

/// Persona followed by the rendered context section, if any document was retrieved.
#[must_use]
pub fn build_system_message(context: &[Document], max_document_chars: usize) -> String {
    let mut out = String::from(SYSTEM_PROMPT);
    if !context.is_empty() {
        out.push_str(CONTEXT_HEADER);
        out.push_str(&render_context(context, max_document_chars));
    }
    out
}

/// Render documents as short records separated by a blank line.
#[must_use]
pub fn render_context(documents: &[Document], max_document_chars: usize) -> String {
    documents
        .iter()
        .map(|doc| render_document(doc, max_document_chars))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_document(doc: &Document, max_chars: usize) -> String {
    let content = truncate_chars(doc.content.trim(), max_chars);
    if doc.kind == DocumentKind::Product {
        let attrs = &doc.attributes;
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        format!(
            "Product: {} {}\nPrice: {}\nEngine: {}\nHorsepower: {}\nDetails: {content}\n",
            field(&attrs.brand),
            field(&attrs.model),
            field(&attrs.price),
            field(&attrs.engine_size),
            field(&attrs.horsepower),
        )
    } else {
        format!("Title: {}\nURL: {}\nContent: {content}\n", doc.title, doc.url)
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut cut = text[..byte_idx].trim_end().to_string();
            cut.push(ELLIPSIS);
            cut
        }
        None => text.to_string(),
    }
}
