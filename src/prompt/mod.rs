//! Prompt composition.

pub mod builder;

pub use builder::{PromptBudget, SYSTEM_PROMPT, build_prompt, build_system_message, render_context};
