use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// One TODO occurrence together with the lines around it.
///
/// Produced by the scanner, one per match line. Units anchored in the same
/// output block share an identical `context_lines` list.
///
/// # Examples
///
/// ```
/// use todone_core::EnrichmentUnit;
///
/// let unit = EnrichmentUnit {
///     repo_name: "api".into(),
///     file: "src/main.rs".into(),
///     line_number: 12,
///     match_text: "// TODO handle errors".into(),
///     context_lines: vec!["fn main() {".into(), "// TODO handle errors".into()],
/// };
/// assert_eq!(unit.location(), "api/src/main.rs:12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentUnit {
    /// Name of the repository the match came from.
    pub repo_name: String,
    /// File path as printed by the search tool.
    pub file: String,
    /// 1-based line number of the match.
    pub line_number: u32,
    /// Text of the matching line.
    pub match_text: String,
    /// Every line of the surrounding block, in emission order.
    pub context_lines: Vec<String>,
}

impl EnrichmentUnit {
    /// `repo/file:line`, used to label failures.
    pub fn location(&self) -> String {
        format!("{}/{}:{}", self.repo_name, self.file, self.line_number)
    }
}

/// A structured, prioritized work item.
///
/// Priority 0 is the most urgent. Effort is a best-effort estimate in minutes.
///
/// # Examples
///
/// ```
/// use todone_core::TodoItem;
///
/// let item: TodoItem = serde_json::from_str(
///     r#"{"title":"fix bug","description":"d","effortMinutes":15,"priority":1}"#,
/// ).unwrap();
/// assert_eq!(item.effort_minutes, 15);
/// assert_eq!(item.priority, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Short imperative title.
    pub title: String,
    /// What needs doing and why.
    pub description: String,
    /// Estimated effort in minutes.
    pub effort_minutes: u32,
    /// 0 = highest.
    pub priority: u32,
}

/// Result of enriching a batch of units: what worked and what did not.
///
/// Both halves may be non-empty at the same time.
#[derive(Debug, Default)]
pub struct EnrichOutcome {
    /// Successfully enriched items.
    pub items: Vec<TodoItem>,
    /// One entry per unit that failed.
    pub errors: AggregateError,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use todone_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Markdown.to_string(), "markdown");
    }

    #[test]
    fn todo_item_serializes_camel_case() {
        let item = TodoItem {
            title: "Add healthz".into(),
            description: "Expose k8s probes".into(),
            effort_minutes: 30,
            priority: 1,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["effortMinutes"], 30);
        assert!(json.get("effort_minutes").is_none());
    }

    #[test]
    fn unit_serializes_camel_case() {
        let unit = EnrichmentUnit {
            repo_name: "r".into(),
            file: "f.go".into(),
            line_number: 3,
            match_text: "// TODO".into(),
            context_lines: vec!["// TODO".into()],
        };
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["lineNumber"], 3);
        assert_eq!(json["contextLines"][0], "// TODO");
    }

    #[test]
    fn location_joins_repo_file_line() {
        let unit = EnrichmentUnit {
            repo_name: "web".into(),
            file: "./app/index.ts".into(),
            line_number: 40,
            match_text: String::new(),
            context_lines: Vec::new(),
        };
        assert_eq!(unit.location(), "web/./app/index.ts:40");
    }
}
