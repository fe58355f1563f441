use std::sync::Arc;

use async_trait::async_trait;
use todone_core::{CancelSignal, EnrichOutcome, Repository, TodoneConfig, TodoneError};
use todone_enrich::{instructions, Dispatcher, TextGenerator};
use todone_scan::Scanner;

use crate::source::{RawSourceResult, Source};

/// TODO comments in the configured repositories.
///
/// Extraction runs the search tool over each repository in order; enrichment
/// hands every match to the [`Dispatcher`].
pub struct CodeSource {
    repos: Vec<Repository>,
    scanner: Scanner,
    dispatcher: Dispatcher,
}

impl CodeSource {
    /// Assemble a code source from its parts.
    pub fn new(repos: Vec<Repository>, scanner: Scanner, dispatcher: Dispatcher) -> Self {
        Self {
            repos,
            scanner,
            dispatcher,
        }
    }

    /// Build a code source from configuration, reading any prompt files.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::FileNotFound`] or [`TodoneError::Io`] if a
    /// configured prompt file cannot be read.
    pub fn from_config(
        config: &TodoneConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, TodoneError> {
        let dispatcher = Dispatcher::new(
            generator,
            instructions(&config.enrich)?,
            config.enrich.concurrency,
        );
        Ok(Self::new(
            config.repos.clone(),
            Scanner::new(config.search.clone()),
            dispatcher,
        ))
    }

    /// Repositories this source scans, in scan order.
    pub fn repos(&self) -> &[Repository] {
        &self.repos
    }
}

#[async_trait]
impl Source for CodeSource {
    fn name(&self) -> &str {
        "code"
    }

    async fn extract(&self, cancel: &CancelSignal) -> Result<RawSourceResult, TodoneError> {
        let units = self.scanner.scan_all(&self.repos, cancel).await?;
        Ok(RawSourceResult::Code(units))
    }

    async fn enrich(&self, raw: RawSourceResult, cancel: &CancelSignal) -> EnrichOutcome {
        match raw {
            RawSourceResult::Code(units) => self.dispatcher.dispatch(units, cancel).await,
        }
    }
}
