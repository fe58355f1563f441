use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use todone_core::{AggregateError, CancelSignal, TodoItem, TodoneConfig, TodoneError};
use todone_enrich::TextGenerator;
use tracing::{debug, info, instrument};

use crate::code::CodeSource;
use crate::source::Source;

/// Everything one aggregation run produced.
///
/// `items` and `errors` may both be non-empty: failures never imply that
/// nothing was enriched.
///
/// # Examples
///
/// ```
/// use todone_aggregate::{Aggregation, AggregationStats};
/// use todone_core::AggregateError;
///
/// let result = Aggregation {
///     items: vec![],
///     errors: AggregateError::default(),
///     stats: AggregationStats { sources: vec!["code".into()], units: 0 },
/// };
/// assert!(result.is_complete());
/// assert!(result.to_string().contains("No TODOs found."));
/// ```
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Enriched items, grouped by source in registration order.
    pub items: Vec<TodoItem>,
    /// Every unit that could not be enriched.
    pub errors: AggregateError,
    /// Statistics about the run.
    pub stats: AggregationStats,
}

/// Statistics about an aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationStats {
    /// Names of the sources that ran, in order.
    pub sources: Vec<String>,
    /// Raw entries extracted across all sources.
    pub units: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    todos: &'a [TodoItem],
    failures: Vec<Failure>,
    stats: &'a AggregationStats,
}

#[derive(Serialize)]
struct Failure {
    location: String,
    error: String,
}

impl Aggregation {
    /// Returns `true` when every extracted entry was enriched.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(items)` when complete, otherwise the joined failures.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Aggregate`] when at least one unit failed; the
    /// items that did succeed are dropped, so use the fields directly to keep
    /// partial results.
    pub fn into_result(self) -> Result<Vec<TodoItem>, TodoneError> {
        self.errors.into_result()?;
        Ok(self.items)
    }

    /// Machine-readable report: `{todos, failures, stats}` with camelCase keys.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Serialization`] if the report cannot be
    /// converted to JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use todone_aggregate::Aggregation;
    ///
    /// let json = Aggregation::default().to_json().unwrap();
    /// assert!(json["todos"].as_array().unwrap().is_empty());
    /// assert!(json["failures"].as_array().unwrap().is_empty());
    /// ```
    pub fn to_json(&self) -> Result<serde_json::Value, TodoneError> {
        let report = Report {
            todos: &self.items,
            failures: self
                .errors
                .iter()
                .map(|e| Failure {
                    location: e.location.clone(),
                    error: e.source.to_string(),
                })
                .collect(),
            stats: &self.stats,
        };
        Ok(serde_json::to_value(report)?)
    }

    /// Render the aggregation as markdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use todone_aggregate::Aggregation;
    ///
    /// let md = Aggregation::default().to_markdown();
    /// assert!(md.starts_with("# TODOs"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# TODOs\n\n");
        out.push_str(&format!(
            "**Sources:** {} | **Found:** {} | **Enriched:** {} | **Failed:** {}\n\n",
            self.stats.sources.join(", "),
            self.stats.units,
            self.items.len(),
            self.errors.len(),
        ));

        if self.items.is_empty() {
            out.push_str("No TODOs found.\n");
        } else {
            for item in &self.items {
                out.push_str(&format!(
                    "## P{} {} (~{})\n\n",
                    item.priority,
                    item.title,
                    format_effort(item.effort_minutes),
                ));
                out.push_str(&format!("{}\n\n", item.description));
            }
        }

        if !self.errors.is_empty() {
            out.push_str("## Failures\n\n");
            for err in self.errors.iter() {
                out.push_str(&format!("- `{}`: {}\n", err.location, err.source));
            }
        }
        out
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TODOs")?;
        writeln!(f, "=====")?;
        writeln!(
            f,
            "Sources: {} | Found: {} | Enriched: {} | Failed: {}\n",
            self.stats.sources.join(", "),
            self.stats.units,
            self.items.len(),
            self.errors.len(),
        )?;

        if self.items.is_empty() {
            writeln!(f, "No TODOs found.")?;
        } else {
            for item in &self.items {
                writeln!(
                    f,
                    "[P{}] {} (~{})",
                    item.priority,
                    item.title,
                    format_effort(item.effort_minutes)
                )?;
                writeln!(f, "  {}", item.description)?;
                writeln!(f)?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(f, "Failures:")?;
            for err in self.errors.iter() {
                writeln!(f, "  - {err}")?;
            }
        }
        Ok(())
    }
}

/// `45` -> `45m`, `90` -> `1h 30m`, `120` -> `2h`.
fn format_effort(minutes: u32) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    match (h, m) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// Ordered registry of TODO sources.
///
/// Sources run one after another in registration order. Each source's
/// extraction must succeed or the whole run fails; enrichment failures are
/// collected and returned next to the items from every source.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
///
/// use todone_aggregate::Aggregator;
/// use todone_core::{CancelSignal, TodoneConfig};
/// use todone_enrich::LlmClient;
///
/// # async fn run() -> Result<(), todone_core::TodoneError> {
/// let config = TodoneConfig::from_file(Path::new("todone.toml"))?;
/// let client = Arc::new(LlmClient::new(&config.llm)?);
/// let aggregator = Aggregator::from_config(&config, client)?;
/// let result = aggregator.run(&CancelSignal::never()).await?;
/// println!("{result}");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Aggregator {
    sources: Vec<Box<dyn Source>>,
}

impl Aggregator {
    /// An aggregator with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry: the code source over the configured repositories.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured prompt file cannot be read.
    pub fn from_config(
        config: &TodoneConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, TodoneError> {
        let mut aggregator = Self::new();
        aggregator.register(CodeSource::from_config(config, generator)?);
        Ok(aggregator)
    }

    /// Append a source; it runs after every source registered before it.
    pub fn register(&mut self, source: impl Source + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Names of the registered sources, in run order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run every source and concatenate the results.
    ///
    /// # Errors
    ///
    /// Returns the first extraction error, or [`TodoneError::Cancelled`] if
    /// `cancel` fires before a source starts. Enrichment failures are not
    /// errors here; they are in [`Aggregation::errors`].
    #[instrument(skip_all, fields(sources = self.sources.len()))]
    pub async fn run(&self, cancel: &CancelSignal) -> Result<Aggregation, TodoneError> {
        let mut result = Aggregation::default();
        for source in &self.sources {
            if cancel.is_cancelled() {
                return Err(TodoneError::Cancelled);
            }
            let name = source.name();
            let raw = source.extract(cancel).await?;
            let extracted = raw.len();
            debug!(source = name, extracted, "source extracted");

            let outcome = source.enrich(raw, cancel).await;
            debug!(
                source = name,
                items = outcome.items.len(),
                failures = outcome.errors.len(),
                "source enriched"
            );

            result.stats.sources.push(name.to_string());
            result.stats.units += extracted;
            result.items.extend(outcome.items);
            result.errors.extend(outcome.errors);
        }
        info!(
            units = result.stats.units,
            items = result.items.len(),
            failures = result.errors.len(),
            "aggregation complete"
        );
        Ok(result)
    }
}
