use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TodoneError;

/// Environment variable consulted when `[llm] api_key` is not set.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration loaded from `todone.toml`.
///
/// Every section is optional; missing sections fall back to defaults.
///
/// # Examples
///
/// ```
/// use todone_core::TodoneConfig;
///
/// let config = TodoneConfig::default();
/// assert!(config.repos.is_empty());
/// assert_eq!(config.enrich.concurrency, 8);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoneConfig {
    /// Repositories to scan, in scan order.
    #[serde(default)]
    pub repos: Vec<Repository>,
    /// Text generation provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Search tool invocation settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Enrichment settings.
    #[serde(default)]
    pub enrich: EnrichConfig,
    /// Chat agent settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

impl TodoneConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// Relative prompt file paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::FileNotFound`] if the file does not exist,
    /// [`TodoneError::Io`] if it cannot be read, or [`TodoneError::Toml`] if
    /// the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use todone_core::TodoneConfig;
    /// use std::path::Path;
    ///
    /// let config = TodoneConfig::from_file(Path::new("todone.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, TodoneError> {
        if !path.exists() {
            return Err(TodoneError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    /// Make relative prompt file paths relative to `base` instead of the
    /// working directory. [`TodoneConfig::from_file`] does this with the
    /// config file's directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use todone_core::TodoneConfig;
    ///
    /// let mut config = TodoneConfig::from_toml("[enrich]\nprompt_file = \"p.md\"\n").unwrap();
    /// config.resolve_relative_paths(Path::new("conf"));
    /// assert_eq!(config.enrich.prompt_file.unwrap(), Path::new("conf/p.md"));
    /// ```
    pub fn resolve_relative_paths(&mut self, base: &Path) {
        let files = [
            &mut self.enrich.prompt_file,
            &mut self.enrich.task_file,
            &mut self.agent.system_prompt_file,
        ];
        for file in files.into_iter().flatten() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use todone_core::TodoneConfig;
    ///
    /// let toml = r#"
    /// [[repos]]
    /// name = "api"
    /// path = "../api"
    /// "#;
    /// let config = TodoneConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.repos[0].name, "api");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, TodoneError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Check the settings that would otherwise fail late in a run.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), TodoneError> {
        for (i, repo) in self.repos.iter().enumerate() {
            if repo.name.trim().is_empty() {
                return Err(TodoneError::Config(format!(
                    "repos[{i}] has an empty name"
                )));
            }
            if repo.path.as_os_str().is_empty() {
                return Err(TodoneError::Config(format!(
                    "repository `{}` has an empty path",
                    repo.name
                )));
            }
        }
        if self.enrich.concurrency == 0 {
            return Err(TodoneError::Config(
                "enrich.concurrency must be at least 1".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(TodoneError::Config(
                "llm.timeout_secs must be at least 1".into(),
            ));
        }
        if self.search.command.trim().is_empty() {
            return Err(TodoneError::Config("search.command is empty".into()));
        }
        if self.search.pattern.is_empty() {
            return Err(TodoneError::Config("search.pattern is empty".into()));
        }
        Ok(())
    }
}

/// A source tree to scan for TODO markers.
///
/// # Examples
///
/// ```
/// use todone_core::Repository;
///
/// let repo = Repository::new("api", "../api");
/// assert_eq!(repo.path.to_str(), Some("../api"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Display name used in prompts and reports.
    pub name: String,
    /// Root directory (or single file) handed to the search tool.
    pub path: PathBuf,
}

impl Repository {
    /// Create a repository entry.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Text generation provider configuration.
///
/// # Examples
///
/// ```
/// use todone_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4.1-mini");
/// assert_eq!(config.timeout_secs, 120);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are supported.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Return the configured API key, or the value of `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

/// How the external search tool is invoked.
///
/// # Examples
///
/// ```
/// use todone_core::SearchConfig;
///
/// let config = SearchConfig::default();
/// assert_eq!(config.command, "rg");
/// assert_eq!(config.no_match_exit_code, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Executable to run (default: `rg`). It must accept ripgrep's flags and
    /// print ripgrep's `--no-heading --line-number` output shape.
    #[serde(default = "default_search_command")]
    pub command: String,
    /// Extra arguments placed before the standard flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Literal pattern to search for (default: `TODO`), passed with
    /// `--fixed-strings` so regex metacharacters match themselves.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Lines of context requested around each match (default: 5).
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
    /// Exit status the tool uses for "no matches" (ripgrep: 1).
    #[serde(default = "default_no_match_exit_code")]
    pub no_match_exit_code: i32,
}

fn default_search_command() -> String {
    "rg".into()
}

fn default_pattern() -> String {
    "TODO".into()
}

fn default_context_lines() -> u32 {
    5
}

fn default_no_match_exit_code() -> i32 {
    1
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            command: default_search_command(),
            args: Vec::new(),
            pattern: default_pattern(),
            context_lines: default_context_lines(),
            no_match_exit_code: default_no_match_exit_code(),
        }
    }
}

/// Enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Maximum number of concurrent enrichment calls (default: 8).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Replace the built-in enrichment prompt with this file.
    pub prompt_file: Option<PathBuf>,
    /// Replace the built-in task description with this file.
    pub task_file: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    8
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            prompt_file: None,
            task_file: None,
        }
    }
}

/// Chat agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Replace the built-in agent system prompt with this file.
    pub system_prompt_file: Option<PathBuf>,
    /// Upper bound on tool-call round trips within one user turn (default: 8).
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_max_tool_rounds() -> usize {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt_file: None,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Read a prompt file, trimming surrounding whitespace.
///
/// # Errors
///
/// Returns [`TodoneError::FileNotFound`] if `path` does not exist, or
/// [`TodoneError::Io`] if it cannot be read.
pub fn read_prompt_file(path: &Path) -> Result<String, TodoneError> {
    if !path.exists() {
        return Err(TodoneError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = TodoneConfig::default();
        assert!(config.repos.is_empty());
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4.1-mini");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.search.command, "rg");
        assert!(config.search.args.is_empty());
        assert_eq!(config.search.pattern, "TODO");
        assert_eq!(config.search.context_lines, 5);
        assert_eq!(config.search.no_match_exit_code, 1);
        assert_eq!(config.enrich.concurrency, 8);
        assert!(config.enrich.prompt_file.is_none());
        assert_eq!(config.agent.max_tool_rounds, 8);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[[repos]]
name = "api"
path = "../api"

[[repos]]
name = "web"
path = "/src/web"

[llm]
model = "gpt-4o"
base_url = "http://localhost:11434"
timeout_secs = 30

[search]
command = "/usr/local/bin/rg"
args = ["--hidden"]
pattern = "FIXME"
context_lines = 2

[enrich]
concurrency = 4
prompt_file = "prompts/code.md"

[agent]
max_tool_rounds = 3
"#;
        let config = TodoneConfig::from_toml(toml).unwrap();
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0], Repository::new("api", "../api"));
        assert_eq!(config.repos[1].name, "web");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.search.args, vec!["--hidden"]);
        assert_eq!(config.search.pattern, "FIXME");
        assert_eq!(config.search.context_lines, 2);
        assert_eq!(config.search.no_match_exit_code, 1);
        assert_eq!(config.enrich.concurrency, 4);
        assert_eq!(
            config.enrich.prompt_file,
            Some(PathBuf::from("prompts/code.md"))
        );
        assert_eq!(config.agent.max_tool_rounds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = TodoneConfig::from_toml("").unwrap();
        assert!(config.repos.is_empty());
        assert_eq!(config.enrich.concurrency, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = TodoneConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(TodoneError::Toml(_))));
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let result = TodoneConfig::from_file(Path::new("/definitely/not/here/todone.toml"));
        assert!(matches!(result, Err(TodoneError::FileNotFound(_))));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todone.toml");
        std::fs::write(&path, "[enrich]\nconcurrency = 2\n").unwrap();
        let config = TodoneConfig::from_file(&path).unwrap();
        assert_eq!(config.enrich.concurrency, 2);
    }

    #[test]
    fn from_file_resolves_prompt_files_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("conf");
        std::fs::create_dir_all(conf_dir.join("prompts")).unwrap();
        std::fs::write(conf_dir.join("prompts/code.md"), "Enrich it.\n").unwrap();

        let absolute = dir.path().join("agent.md");
        let path = conf_dir.join("todone.toml");
        std::fs::write(
            &path,
            format!(
                "[enrich]\nprompt_file = \"prompts/code.md\"\n\n[agent]\nsystem_prompt_file = {:?}\n",
                absolute.to_string_lossy()
            ),
        )
        .unwrap();

        let config = TodoneConfig::from_file(&path).unwrap();
        let prompt = config.enrich.prompt_file.unwrap();
        assert_eq!(prompt, conf_dir.join("prompts/code.md"));
        assert_eq!(read_prompt_file(&prompt).unwrap(), "Enrich it.");
        assert!(config.enrich.task_file.is_none());
        assert_eq!(config.agent.system_prompt_file.unwrap(), absolute);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = TodoneConfig::default();
        config.enrich.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("enrich.concurrency"));
    }

    #[test]
    fn validate_rejects_unnamed_repo() {
        let mut config = TodoneConfig::default();
        config.repos.push(Repository::new("  ", "."));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("repos[0]"));
    }

    #[test]
    fn validate_rejects_empty_path() {
        let mut config = TodoneConfig::default();
        config.repos.push(Repository::new("api", ""));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("`api`"));
    }

    #[test]
    fn configured_api_key_wins() {
        let config = LlmConfig {
            api_key: Some("from-config".into()),
            ..LlmConfig::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn read_prompt_file_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "\n  Summarize the TODO.  \n\n").unwrap();
        assert_eq!(read_prompt_file(&path).unwrap(), "Summarize the TODO.");
    }

    #[test]
    fn read_prompt_file_missing() {
        let result = read_prompt_file(Path::new("/nope/prompt.md"));
        assert!(matches!(result, Err(TodoneError::FileNotFound(_))));
    }
}
