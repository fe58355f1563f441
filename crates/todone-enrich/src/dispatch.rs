use std::collections::VecDeque;
use std::sync::Arc;

use todone_core::{
    CancelSignal, EnrichOutcome, EnrichmentError, EnrichmentUnit, TodoItem, TodoneError,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, GenerateRequest, TextGenerator};
use crate::prompt::{parse_todo_answer, render_unit, todo_schema};

type Queue = Arc<Mutex<VecDeque<(usize, EnrichmentUnit)>>>;

/// A finished unit on its way from a worker to the collector.
struct Finished {
    index: usize,
    location: String,
    result: Result<TodoItem, TodoneError>,
}

/// Fans enrichment units out to a bounded pool of workers.
///
/// At most `concurrency` generation calls are in flight. Workers pull units
/// from one shared queue and report back over a single channel; the caller's
/// task is the only place results are stored. Every unit ends up either as a
/// [`TodoItem`] or as one entry of the returned
/// [`AggregateError`](todone_core::AggregateError), and items
/// keep the order in which their units were submitted.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use todone_core::{CancelSignal, EnrichConfig, LlmConfig};
/// use todone_enrich::{instructions, Dispatcher, LlmClient};
///
/// # async fn run() -> Result<(), todone_core::TodoneError> {
/// let client = Arc::new(LlmClient::new(&LlmConfig::default())?);
/// let dispatcher = Dispatcher::new(client, instructions(&EnrichConfig::default())?, 8);
/// let outcome = dispatcher.dispatch(Vec::new(), &CancelSignal::never()).await;
/// assert!(outcome.items.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    generator: Arc<dyn TextGenerator>,
    instructions: Arc<str>,
    concurrency: usize,
}

impl Dispatcher {
    /// Create a dispatcher. A `concurrency` of zero is treated as one.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        instructions: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            generator,
            instructions: Arc::from(instructions.into()),
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum number of concurrent generation calls.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Enrich every unit and join the failures.
    ///
    /// Never fails as a whole: transport errors, malformed answers and
    /// cancellation are recorded per unit. Once `cancel` fires, units still
    /// queued or in flight are recorded as cancelled and the call returns.
    pub async fn dispatch(
        &self,
        units: Vec<EnrichmentUnit>,
        cancel: &CancelSignal,
    ) -> EnrichOutcome {
        let total = units.len();
        if total == 0 {
            return EnrichOutcome::default();
        }

        let locations: Vec<String> = units.iter().map(EnrichmentUnit::location).collect();
        let queue: Queue = Arc::new(Mutex::new(units.into_iter().enumerate().collect()));
        let workers = self.concurrency.min(total);
        let (tx, mut rx) = mpsc::channel::<Finished>(workers);
        debug!(units = total, workers, "dispatching enrichment");

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(worker(
                Arc::clone(&self.generator),
                Arc::clone(&self.instructions),
                Arc::clone(&queue),
                tx.clone(),
                cancel.clone(),
            ));
        }
        drop(tx);

        let mut slots: Vec<Option<Result<TodoItem, TodoneError>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        while let Some(done) = rx.recv().await {
            if let Err(e) = &done.result {
                warn!(location = %done.location, error = %e, "enrichment failed");
            }
            slots[done.index] = Some(done.result);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "enrichment worker stopped abnormally");
            }
        }

        let mut outcome = EnrichOutcome::default();
        for (slot, location) in slots.into_iter().zip(locations) {
            match slot {
                Some(Ok(item)) => outcome.items.push(item),
                Some(Err(e)) => outcome.errors.push(EnrichmentError::new(location, e)),
                None => outcome.errors.push(EnrichmentError::new(
                    location,
                    TodoneError::Llm("worker stopped before finishing this unit".into()),
                )),
            }
        }

        info!(
            units = total,
            items = outcome.items.len(),
            failures = outcome.errors.len(),
            "enrichment complete"
        );
        outcome
    }
}

async fn worker(
    generator: Arc<dyn TextGenerator>,
    instructions: Arc<str>,
    queue: Queue,
    tx: mpsc::Sender<Finished>,
    cancel: CancelSignal,
) {
    loop {
        let next = queue.lock().await.pop_front();
        let Some((index, unit)) = next else { break };
        let location = unit.location();

        let result = if cancel.is_cancelled() {
            Err(TodoneError::Cancelled)
        } else {
            debug!(%location, "enriching unit");
            enrich_unit(generator.as_ref(), &instructions, &unit, &cancel).await
        };

        let finished = Finished {
            index,
            location,
            result,
        };
        if tx.send(finished).await.is_err() {
            break;
        }
    }
}

/// Run one generation call for `unit` and parse its answer.
async fn enrich_unit(
    generator: &dyn TextGenerator,
    instructions: &str,
    unit: &EnrichmentUnit,
    cancel: &CancelSignal,
) -> Result<TodoItem, TodoneError> {
    let request = GenerateRequest {
        system_prompt: instructions.to_string(),
        history: vec![ChatMessage::user(render_unit(unit))],
        tools: Vec::new(),
        response_format: Some(todo_schema()),
    };
    let response = tokio::select! {
        res = generator.generate(&request, cancel) => res?,
        _ = cancel.cancelled() => return Err(TodoneError::Cancelled),
    };
    parse_todo_answer(&response.answer)
}
