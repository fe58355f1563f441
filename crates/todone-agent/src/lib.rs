//! Conversational front end for todone.
//!
//! The [`Agent`] lets a model decide when to run the aggregator and answers
//! questions about the collected TODOs.

pub mod agent;

pub use agent::{Agent, AGGREGATE_TOOL};
