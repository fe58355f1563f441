use serde::Deserialize;
use serde_json::{json, Number, Value};
use todone_core::{read_prompt_file, EnrichConfig, EnrichmentUnit, TodoItem, TodoneError};

use crate::llm::ResponseSchema;

const CODE_ENRICHMENT_PROMPT: &str = "\
You turn TODO comments found in source code into concrete work items.

You receive one TODO at a time: the repository, file and line it was found \
on, the matching line, and the code around it. Read the surrounding code to \
understand what the TODO is really asking for.

Rules:
- Write a short, imperative title (at most 10 words)
- The description explains what needs to change and why, in 1 to 3 sentences
- Mention the file when it helps someone find the work
- Do not invent requirements the code and comment do not support
- If the comment is vague, describe the most likely intent";

const TASK_DESCRIPTION: &str = "\
Respond with a JSON object with exactly these fields:
- title: string
- description: string
- effortMinutes: number, whole minutes a competent engineer would need
- priority: number, 0 = highest, 1 = normal, 2 = lowest

Use priority 0 for correctness, security or data loss problems, 1 for \
ordinary missing features and cleanups, and 2 for nice-to-haves.";

/// Assemble the system instructions used for every enrichment call.
///
/// The enrichment prompt and the task description are joined with a newline.
/// Each part comes from `prompt_file` / `task_file` when configured, and from
/// the built-in text otherwise.
///
/// # Errors
///
/// Returns [`TodoneError::FileNotFound`] or [`TodoneError::Io`] if a
/// configured prompt file cannot be read.
///
/// # Examples
///
/// ```
/// use todone_core::EnrichConfig;
/// use todone_enrich::prompt::instructions;
///
/// let text = instructions(&EnrichConfig::default()).unwrap();
/// assert!(text.contains("TODO"));
/// assert!(text.contains("effortMinutes"));
/// ```
pub fn instructions(config: &EnrichConfig) -> Result<String, TodoneError> {
    let prompt = match &config.prompt_file {
        Some(path) => read_prompt_file(path)?,
        None => CODE_ENRICHMENT_PROMPT.to_string(),
    };
    let task = match &config.task_file {
        Some(path) => read_prompt_file(path)?,
        None => TASK_DESCRIPTION.to_string(),
    };
    Ok(format!("{prompt}\n{task}"))
}

/// The strict schema every enrichment answer must follow.
///
/// # Examples
///
/// ```
/// use todone_enrich::prompt::todo_schema;
///
/// let schema = todo_schema();
/// assert_eq!(schema.name, "todo");
/// assert_eq!(schema.schema["additionalProperties"], false);
/// ```
pub fn todo_schema() -> ResponseSchema {
    ResponseSchema {
        name: "todo".into(),
        description: "Structured TODO output".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
                "effortMinutes": { "type": "number" },
                "priority": { "type": "number" },
            },
            "required": ["title", "description", "effortMinutes", "priority"],
            "additionalProperties": false,
        }),
    }
}

/// Render a unit as the user message of an enrichment call.
///
/// # Examples
///
/// ```
/// use todone_core::EnrichmentUnit;
/// use todone_enrich::prompt::render_unit;
///
/// let unit = EnrichmentUnit {
///     repo_name: "api".into(),
///     file: "main.go".into(),
///     line_number: 11,
///     match_text: "// TODO fix bug".into(),
///     context_lines: vec!["foo()".into(), "// TODO fix bug".into()],
/// };
/// let text = render_unit(&unit);
/// assert!(text.starts_with("Code TODO found:\nRepo: api\n"));
/// assert!(text.ends_with("Context:\nfoo()\n// TODO fix bug\n"));
/// ```
pub fn render_unit(unit: &EnrichmentUnit) -> String {
    let mut out = format!(
        "Code TODO found:\nRepo: {}\nFile: {}\nLine: {}\nMatch: {}\nContext:\n",
        unit.repo_name, unit.file, unit.line_number, unit.match_text
    );
    for line in &unit.context_lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct TodoAnswer {
    title: String,
    description: String,
    effort_minutes: Number,
    priority: Number,
}

/// Parse a model answer into a [`TodoItem`], rejecting anything off-schema.
///
/// Markdown code fences around the JSON are tolerated. Unknown or missing
/// fields, wrong types, and negative or fractional numbers are not.
///
/// # Errors
///
/// Returns [`TodoneError::Serialization`] if the answer is not JSON, or
/// [`TodoneError::Schema`] if it does not match the todo schema.
///
/// # Examples
///
/// ```
/// use todone_enrich::prompt::parse_todo_answer;
///
/// let item = parse_todo_answer(
///     r#"{"title":"fix bug","description":"d","effortMinutes":15,"priority":1}"#,
/// ).unwrap();
/// assert_eq!(item.title, "fix bug");
/// assert_eq!(item.effort_minutes, 15);
///
/// assert!(parse_todo_answer(r#"{"title":"x"}"#).is_err());
/// ```
pub fn parse_todo_answer(answer: &str) -> Result<TodoItem, TodoneError> {
    let value: Value = serde_json::from_str(strip_code_fences(answer))?;
    let parsed: TodoAnswer =
        serde_json::from_value(value).map_err(|e| TodoneError::Schema(e.to_string()))?;
    Ok(TodoItem {
        title: parsed.title,
        description: parsed.description,
        effort_minutes: whole_number(&parsed.effort_minutes, "effortMinutes")?,
        priority: whole_number(&parsed.priority, "priority")?,
    })
}

/// Accept `15` and `15.0`, reject `-1`, `1.5` and anything over `u32::MAX`.
fn whole_number(n: &Number, field: &str) -> Result<u32, TodoneError> {
    let invalid = || {
        TodoneError::Schema(format!(
            "{field} must be a non-negative whole number, got {n}"
        ))
    };
    if let Some(v) = n.as_u64() {
        return u32::try_from(v).map_err(|_| invalid());
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
        _ => Err(invalid()),
    }
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
