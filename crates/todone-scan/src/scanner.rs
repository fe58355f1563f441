use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use todone_core::{CancelSignal, EnrichmentUnit, Repository, SearchConfig, TodoneError};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::parser::parse_search_output;

/// Runs the external search tool over configured repositories.
///
/// Repositories are scanned one at a time, in the order given. Any failure
/// aborts the whole scan; there are no partial results.
///
/// # Examples
///
/// ```
/// use todone_core::{Repository, SearchConfig};
/// use todone_scan::scanner::Scanner;
///
/// let scanner = Scanner::new(SearchConfig::default());
/// let args = scanner.args(&Repository::new("api", "../api"));
/// assert!(args.iter().any(|a| a == "--no-heading"));
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    config: SearchConfig,
}

impl Scanner {
    /// Create a scanner using the given search settings.
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the search command for `repo`.
    ///
    /// The command must accept ripgrep's output flags. `--no-config`, which
    /// keeps a user's `RIPGREP_CONFIG_PATH` from changing the output shape,
    /// is only added when the command is ripgrep itself.
    pub fn args(&self, repo: &Repository) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.args.iter().map(OsString::from).collect();
        if self.is_ripgrep() {
            args.push("--no-config".into());
        }
        args.extend(
            [
                "--line-number",
                "--no-heading",
                "--with-filename",
                "--fixed-strings",
                "--context",
            ]
            .map(OsString::from),
        );
        args.push(self.config.context_lines.to_string().into());
        args.push("--regexp".into());
        args.push(self.config.pattern.clone().into());
        args.push("--".into());
        args.push(repo.path.clone().into_os_string());
        args
    }

    fn is_ripgrep(&self) -> bool {
        Path::new(&self.config.command)
            .file_stem()
            .is_some_and(|stem| stem == "rg")
    }

    /// Scan every repository in order and concatenate their units.
    ///
    /// # Errors
    ///
    /// Returns the first [`TodoneError::Extraction`] or [`TodoneError::Parse`]
    /// encountered, or [`TodoneError::Cancelled`] if `cancel` fires.
    #[instrument(skip_all, fields(repos = repos.len()))]
    pub async fn scan_all(
        &self,
        repos: &[Repository],
        cancel: &CancelSignal,
    ) -> Result<Vec<EnrichmentUnit>, TodoneError> {
        let mut units = Vec::new();
        for repo in repos {
            if cancel.is_cancelled() {
                return Err(TodoneError::Cancelled);
            }
            units.extend(self.scan_repo(repo, cancel).await?);
        }
        info!(units = units.len(), "scan complete");
        Ok(units)
    }

    /// Scan a single repository.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Extraction`] if the command cannot be started or
    /// exits with a status other than 0 or the configured "no matches" code,
    /// [`TodoneError::Parse`] if its output is malformed, or
    /// [`TodoneError::Cancelled`] if `cancel` fires while it runs.
    #[instrument(skip_all, fields(repo = %repo.name))]
    pub async fn scan_repo(
        &self,
        repo: &Repository,
        cancel: &CancelSignal,
    ) -> Result<Vec<EnrichmentUnit>, TodoneError> {
        let command = &self.config.command;
        debug!(%command, path = %repo.path.display(), "running search");

        let child = Command::new(command)
            .args(self.args(repo))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TodoneError::Extraction {
                repo: repo.name.clone(),
                detail: format!("failed to run `{command}`: {e}"),
            })?;

        let output = tokio::select! {
            res = child.wait_with_output() => res.map_err(|e| TodoneError::Extraction {
                repo: repo.name.clone(),
                detail: format!("failed to wait for `{command}`: {e}"),
            })?,
            _ = cancel.cancelled() => return Err(TodoneError::Cancelled),
        };

        let units = interpret_output(
            repo,
            command,
            output.status.code(),
            &output.stdout,
            &output.stderr,
            self.config.no_match_exit_code,
        )?;
        debug!(units = units.len(), "repository scanned");
        Ok(units)
    }
}

/// Map the tool's exit status and output to units, following its conventions.
///
/// The "no matches" code yields nothing regardless of what was printed.
fn interpret_output(
    repo: &Repository,
    command: &str,
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
    no_match_exit_code: i32,
) -> Result<Vec<EnrichmentUnit>, TodoneError> {
    match code {
        Some(0) => parse_search_output(&repo.name, &String::from_utf8_lossy(stdout)),
        Some(c) if c == no_match_exit_code => Ok(Vec::new()),
        Some(c) => {
            let stderr = String::from_utf8_lossy(stderr);
            let stderr = stderr.trim();
            let detail = if stderr.is_empty() {
                format!("`{command}` exited with status {c}")
            } else {
                format!("`{command}` exited with status {c}: {stderr}")
            };
            Err(TodoneError::Extraction {
                repo: repo.name.clone(),
                detail,
            })
        }
        None => Err(TodoneError::Extraction {
            repo: repo.name.clone(),
            detail: format!("`{command}` was terminated by a signal"),
        }),
    }
}
