use std::sync::Arc;

use serde_json::json;
use todone_aggregate::Aggregator;
use todone_core::{read_prompt_file, CancelSignal, TodoItem, TodoneConfig, TodoneError};
use todone_enrich::{ChatMessage, GenerateRequest, TextGenerator, ToolCall, ToolSpec};
use tracing::{debug, info, warn};

/// Name of the tool that runs a full aggregation.
pub const AGGREGATE_TOOL: &str = "aggregate_todos";

const SYSTEM_PROMPT: &str = "\
You are todone, an assistant that helps an engineer decide what to work on \
next across their repositories.

You can call the aggregate_todos tool to collect every TODO comment from the \
configured repositories as structured items with a title, a description, an \
effort estimate in minutes and a priority (0 = highest).

Guidelines:
- Call aggregate_todos when the user asks about their TODOs and you have not \
collected them yet in this conversation, or when they ask for a refresh
- Recommend work in priority order, then by effort when the user has limited time
- Mention failures reported by the tool instead of hiding them
- Be concise";

/// A tool-calling conversation over the TODO aggregator.
///
/// Each [`Agent::turn`] sends the conversation to the model. While the model
/// asks for tool calls, the agent runs them, appends both the calls and their
/// results to the history, and asks again. A plain answer ends the turn.
pub struct Agent {
    generator: Arc<dyn TextGenerator>,
    aggregator: Aggregator,
    system_prompt: String,
    max_tool_rounds: usize,
    history: Vec<ChatMessage>,
    todos: Vec<TodoItem>,
}

impl Agent {
    /// Create an agent with an explicit prompt and tool-round limit.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        aggregator: Aggregator,
        system_prompt: impl Into<String>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            generator,
            aggregator,
            system_prompt: system_prompt.into(),
            max_tool_rounds,
            history: Vec::new(),
            todos: Vec::new(),
        }
    }

    /// Build an agent from configuration, sharing `generator` with the
    /// aggregator's enrichment calls.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::FileNotFound`] or [`TodoneError::Io`] if a
    /// configured prompt file cannot be read.
    pub fn from_config(
        config: &TodoneConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, TodoneError> {
        let system_prompt = match &config.agent.system_prompt_file {
            Some(path) => read_prompt_file(path)?,
            None => SYSTEM_PROMPT.to_string(),
        };
        let aggregator = Aggregator::from_config(config, Arc::clone(&generator))?;
        Ok(Self::new(
            generator,
            aggregator,
            system_prompt,
            config.agent.max_tool_rounds,
        ))
    }

    /// The conversation so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Items from the most recent successful aggregation.
    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    /// Forget the conversation and the collected items.
    pub fn reset(&mut self) {
        self.history.clear();
        self.todos.clear();
    }

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec::without_arguments(
            AGGREGATE_TOOL,
            "Aggregate TODOs from the configured repositories into prioritized work items.",
        )]
    }

    /// Handle one user message and return the model's answer.
    ///
    /// Blank input is ignored and yields an empty answer.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Llm`] if the model cannot be reached or keeps
    /// requesting tools past the configured limit, and
    /// [`TodoneError::Cancelled`] if `cancel` fires.
    pub async fn turn(
        &mut self,
        input: &str,
        cancel: &CancelSignal,
    ) -> Result<String, TodoneError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(String::new());
        }
        self.history.push(ChatMessage::user(input));

        let mut rounds = 0;
        loop {
            let request = GenerateRequest {
                system_prompt: self.system_prompt.clone(),
                history: self.history.clone(),
                tools: Self::tools(),
                response_format: None,
            };
            let response = self.generator.generate(&request, cancel).await?;

            if response.tool_calls.is_empty() {
                self.history.push(ChatMessage::assistant(&response.answer));
                return Ok(response.answer);
            }

            rounds += 1;
            if rounds > self.max_tool_rounds {
                return Err(TodoneError::Llm(format!(
                    "model requested tools more than {} times in one turn",
                    self.max_tool_rounds
                )));
            }
            self.run_tool_calls(response.tool_calls, cancel).await?;
        }
    }

    async fn run_tool_calls(
        &mut self,
        calls: Vec<ToolCall>,
        cancel: &CancelSignal,
    ) -> Result<(), TodoneError> {
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            debug!(tool = %call.name, call_id = %call.call_id, "running tool");
            let output = match call.name.as_str() {
                AGGREGATE_TOOL => self.aggregate(cancel).await?,
                other => {
                    warn!(tool = other, "model requested an unknown tool");
                    "unknown tool".to_string()
                }
            };
            results.push(ChatMessage::tool_result(&call.call_id, output));
        }
        self.history.push(ChatMessage::tool_calls(calls));
        self.history.extend(results);
        Ok(())
    }

    /// Run the aggregator and describe the outcome for the model.
    ///
    /// Extraction failures are reported to the model rather than ending the
    /// conversation; cancellation is not.
    async fn aggregate(&mut self, cancel: &CancelSignal) -> Result<String, TodoneError> {
        match self.aggregator.run(cancel).await {
            Ok(result) => {
                info!(
                    items = result.items.len(),
                    failures = result.errors.len(),
                    "aggregated for chat"
                );
                let payload = result.to_json()?;
                self.todos = result.items;
                Ok(payload.to_string())
            }
            Err(TodoneError::Cancelled) => Err(TodoneError::Cancelled),
            Err(e) => {
                warn!(error = %e, "aggregation failed");
                Ok(json!({ "error": e.to_string() }).to_string())
            }
        }
    }
}
