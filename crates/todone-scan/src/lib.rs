//! TODO extraction from source trees.
//!
//! Runs ripgrep (or a compatible tool) once per repository and turns its
//! `--context` output into [`todone_core::EnrichmentUnit`]s: one per match
//! line, each carrying the full block of surrounding lines.

pub mod parser;
pub mod scanner;

pub use scanner::Scanner;
