//! Core types, configuration, and error handling for todone.
//!
//! This crate provides the shared foundation used by all other todone crates:
//! - [`TodoneError`], [`EnrichmentError`], [`AggregateError`]: error types using `thiserror`
//! - [`TodoneConfig`]: configuration loaded from `todone.toml`
//! - [`CancelSignal`]: cancellation threaded through every external call
//! - Shared types: [`EnrichmentUnit`], [`TodoItem`], [`EnrichOutcome`], [`OutputFormat`]

mod cancel;
mod config;
mod error;
mod types;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{
    read_prompt_file, AgentConfig, EnrichConfig, LlmConfig, Repository, SearchConfig,
    TodoneConfig, API_KEY_ENV,
};
pub use error::{AggregateError, EnrichmentError, TodoneError};
pub use types::{EnrichOutcome, EnrichmentUnit, OutputFormat, TodoItem};

/// A convenience `Result` type for todone operations.
pub type Result<T> = std::result::Result<T, TodoneError>;
