//! Enrichment of TODO matches into structured work items.
//!
//! Provides the text generation capability and its OpenAI-compatible client,
//! prompt assembly and answer parsing, and the bounded [`Dispatcher`] that
//! fans units out to the model and joins the failures.

pub mod dispatch;
pub mod llm;
pub mod prompt;

pub use dispatch::Dispatcher;
pub use llm::{
    ChatMessage, GenerateRequest, GenerateResponse, LlmClient, ResponseSchema, Role,
    TextGenerator, ToolCall, ToolSpec,
};
pub use prompt::{instructions, parse_todo_answer, render_unit, todo_schema};
