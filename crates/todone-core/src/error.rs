use std::fmt;
use std::path::PathBuf;

/// Errors that can occur across the todone pipeline.
///
/// Extraction and parse failures abort a run. Enrichment failures are
/// collected per unit into an [`AggregateError`] and reported next to the
/// items that did succeed.
///
/// # Examples
///
/// ```
/// use todone_core::TodoneError;
///
/// let err = TodoneError::Config("missing repos".into());
/// assert!(err.to_string().contains("missing repos"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TodoneError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(todone::config))]
    Config(String),

    /// The search tool could not be run or exited unexpectedly.
    #[error("extraction failed for repository `{repo}`: {detail}")]
    #[diagnostic(
        code(todone::extraction),
        help("check that ripgrep is installed and that [search] in todone.toml points at it")
    )]
    Extraction {
        /// Name of the repository being scanned.
        repo: String,
        /// What went wrong.
        detail: String,
    },

    /// The search tool printed a line of an unexpected shape.
    #[error("parse error: {0}")]
    #[diagnostic(
        code(todone::parse),
        help("the search tool output format changed; todone expects `rg --line-number --no-heading --context N`")
    )]
    Parse(String),

    /// Text generation API or transport error.
    #[error("LLM error: {0}")]
    #[diagnostic(code(todone::llm))]
    Llm(String),

    /// A generated answer did not satisfy the requested schema.
    #[error("schema violation: {0}")]
    Schema(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// One or more enrichment units failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Failure to enrich a single unit.
///
/// `location` identifies the unit as `repo/file:line`.
#[derive(Debug, thiserror::Error)]
#[error("{location}: {source}")]
pub struct EnrichmentError {
    /// Where the TODO that failed lives.
    pub location: String,
    /// The underlying cause.
    #[source]
    pub source: Box<TodoneError>,
}

impl EnrichmentError {
    /// Wrap `source` as the failure of the unit at `location`.
    pub fn new(location: impl Into<String>, source: TodoneError) -> Self {
        Self {
            location: location.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` if the unit failed because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.source, TodoneError::Cancelled)
    }
}

/// Join of every per-unit enrichment failure in a run.
///
/// An empty `AggregateError` means every unit succeeded. Nothing is ever
/// dropped: each failed unit contributes exactly one entry.
///
/// # Examples
///
/// ```
/// use todone_core::{AggregateError, EnrichmentError, TodoneError};
///
/// let mut errors = AggregateError::default();
/// assert!(errors.is_empty());
///
/// errors.push(EnrichmentError::new("api/main.go:3", TodoneError::Llm("timeout".into())));
/// assert_eq!(errors.len(), 1);
/// assert!(errors.to_string().contains("api/main.go:3"));
/// ```
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<EnrichmentError>,
}

impl AggregateError {
    /// Record one more failure.
    pub fn push(&mut self, error: EnrichmentError) {
        self.errors.push(error);
    }

    /// Absorb every failure from `other`, keeping order.
    pub fn extend(&mut self, other: AggregateError) {
        self.errors.extend(other.errors);
    }

    /// Number of failed units.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` when no unit failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the individual failures.
    pub fn iter(&self) -> std::slice::Iter<'_, EnrichmentError> {
        self.errors.iter()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<EnrichmentError>> for AggregateError {
    fn from(errors: Vec<EnrichmentError>) -> Self {
        Self { errors }
    }
}

impl IntoIterator for AggregateError {
    type Item = EnrichmentError;
    type IntoIter = std::vec::IntoIter<EnrichmentError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.errors.len();
        write!(
            f,
            "{n} enrichment failure{}",
            if n == 1 { "" } else { "s" }
        )?;
        for err in &self.errors {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TodoneError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = TodoneError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn extraction_error_names_repo() {
        let err = TodoneError::Extraction {
            repo: "api".into(),
            detail: "exit status 2".into(),
        };
        assert_eq!(
            err.to_string(),
            "extraction failed for repository `api`: exit status 2"
        );
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = TodoneError::FileNotFound(PathBuf::from("/tmp/prompt.md"));
        assert!(err.to_string().contains("/tmp/prompt.md"));
    }

    #[test]
    fn aggregate_keeps_every_cause() {
        let errors = AggregateError::from(vec![
            EnrichmentError::new("a/x.rs:1", TodoneError::Llm("503".into())),
            EnrichmentError::new("a/y.rs:9", TodoneError::Schema("missing title".into())),
            EnrichmentError::new("b/z.go:4", TodoneError::Cancelled),
        ]);
        assert_eq!(errors.len(), 3);

        let text = errors.to_string();
        assert!(text.starts_with("3 enrichment failures"));
        assert!(text.contains("a/x.rs:1: LLM error: 503"));
        assert!(text.contains("a/y.rs:9: schema violation: missing title"));
        assert!(text.contains("b/z.go:4: operation cancelled"));
    }

    #[test]
    fn aggregate_extend_preserves_order() {
        let mut first = AggregateError::from(vec![EnrichmentError::new(
            "one",
            TodoneError::Cancelled,
        )]);
        let second = AggregateError::from(vec![EnrichmentError::new(
            "two",
            TodoneError::Llm("x".into()),
        )]);
        first.extend(second);
        let locations: Vec<&str> = first.iter().map(|e| e.location.as_str()).collect();
        assert_eq!(locations, vec!["one", "two"]);
        assert!(first.iter().next().unwrap().is_cancelled());
    }

    #[test]
    fn empty_aggregate_is_ok() {
        assert!(AggregateError::default().into_result().is_ok());
    }

    #[test]
    fn aggregate_wraps_into_todone_error() {
        let errors = AggregateError::from(vec![EnrichmentError::new(
            "r/f:1",
            TodoneError::Llm("boom".into()),
        )]);
        let err: TodoneError = errors.into();
        assert!(err.to_string().contains("1 enrichment failure\n"));
    }
}
