//! Source registry and orchestration for todone.
//!
//! An [`Aggregator`] runs every registered [`Source`] in order: extract, then
//! enrich, then append. [`CodeSource`] is the TODO-comments-in-code source.

mod aggregator;
pub mod code;
pub mod source;

pub use aggregator::{Aggregation, AggregationStats, Aggregator};
pub use code::CodeSource;
pub use source::{RawSourceResult, Source};
