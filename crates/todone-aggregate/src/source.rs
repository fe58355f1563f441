use async_trait::async_trait;
use todone_core::{CancelSignal, EnrichOutcome, EnrichmentUnit, TodoneError};

/// What a source extracted before enrichment.
///
/// One variant per kind of source; each source only ever receives back the
/// variant it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSourceResult {
    /// TODO matches found in source code.
    Code(Vec<EnrichmentUnit>),
}

impl RawSourceResult {
    /// Number of raw entries awaiting enrichment.
    pub fn len(&self) -> usize {
        match self {
            RawSourceResult::Code(units) => units.len(),
        }
    }

    /// Returns `true` if nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One extract-then-enrich pipeline feeding the [`Aggregator`](crate::Aggregator).
///
/// Adding a new kind of TODO source means implementing this trait and
/// registering it; the aggregator itself does not change.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Gather raw entries.
    ///
    /// # Errors
    ///
    /// Any error here aborts the whole aggregation run.
    async fn extract(&self, cancel: &CancelSignal) -> Result<RawSourceResult, TodoneError>;

    /// Turn raw entries into items, collecting per-entry failures.
    async fn enrich(&self, raw: RawSourceResult, cancel: &CancelSignal) -> EnrichOutcome;
}
