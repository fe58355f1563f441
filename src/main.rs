use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use todone_aggregate::Aggregator;
use todone_agent::Agent;
use todone_core::{
    cancel_pair, CancelSignal, EnrichmentUnit, OutputFormat, TodoneConfig, TodoneError,
    API_KEY_ENV,
};
use todone_enrich::LlmClient;
use todone_scan::Scanner;

const DEFAULT_CONFIG_PATH: &str = "todone.toml";

#[derive(Parser)]
#[command(
    name = "todone",
    version,
    about = "Turn TODO comments into a prioritized work list",
    long_about = "todone finds the TODO comments scattered across your repositories with ripgrep\n\
                   and turns each one into a structured work item (title, description, effort,\n\
                   priority) using an OpenAI-compatible model.\n\n\
                   Examples:\n  \
                     todone init                       Create a todone.toml config file\n  \
                     todone scan                       List raw TODO matches (no model needed)\n  \
                     todone aggregate --format md      Enrich every TODO into a work item\n  \
                     todone chat                       Ask what to work on next"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: todone.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown (alias: md)"
    )]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Find and enrich every TODO in the configured repositories
    #[command(long_about = "Find and enrich every TODO in the configured repositories.\n\n\
        Runs ripgrep over each [[repos]] entry, then asks the model to turn every match\n\
        into a work item. Items that were enriched are always printed; the command exits\n\
        non-zero afterwards if any TODO could not be enriched.\n\n\
        Examples:\n  todone aggregate\n  todone aggregate --concurrency 4 --format json")]
    Aggregate {
        /// Maximum concurrent model calls (overrides [enrich] concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List raw TODO matches without calling the model
    #[command(long_about = "List raw TODO matches without calling the model.\n\n\
        Useful to check the [search] settings before spending tokens.\n\n\
        Examples:\n  todone scan\n  todone scan --format json")]
    Scan,
    /// Chat with an assistant that can aggregate your TODOs
    #[command(long_about = "Chat with an assistant that can aggregate your TODOs.\n\n\
        Type a message and press enter. Type `exit` or press Ctrl-D to quit.\n\
        Ctrl-C while the assistant is working cancels the current turn.")]
    Chat,
    /// Create a default todone.toml configuration file
    #[command(long_about = "Create a default todone.toml configuration file.\n\n\
        Generates a template with every available option.\n\
        Fails if todone.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// Newline-delimited JSON
    Json,
}

fn init_tracing(verbose: u8, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "warn",
        1 => "todone=info",
        2 => "todone=debug",
        _ => "todone=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[32m✓\x1b[0m \x1b[1mtodone\x1b[0m v{version}: your TODO comments, as a prioritized work list\n");

        println!("Quick start:");
        println!("  \x1b[36mtodone init\x1b[0m          Create a todone.toml config file");
        println!("  \x1b[36mtodone scan\x1b[0m          List the TODOs ripgrep finds");
        println!("  \x1b[36mtodone aggregate\x1b[0m     Turn every TODO into a work item\n");

        println!("All commands:");
        println!("  \x1b[32maggregate\x1b[0m  Find and enrich every TODO");
        println!("  \x1b[32mscan\x1b[0m       List raw TODO matches");
        println!("  \x1b[32mchat\x1b[0m       Ask an assistant what to work on next");
        println!("  \x1b[32minit\x1b[0m       Create default configuration\n");
    } else {
        println!("todone v{version}: your TODO comments, as a prioritized work list\n");

        println!("Quick start:");
        println!("  todone init          Create a todone.toml config file");
        println!("  todone scan          List the TODOs ripgrep finds");
        println!("  todone aggregate     Turn every TODO into a work item\n");

        println!("All commands:");
        println!("  aggregate  Find and enrich every TODO");
        println!("  scan       List raw TODO matches");
        println!("  chat       Ask an assistant what to work on next");
        println!("  init       Create default configuration\n");
    }

    println!("Run 'todone <command> --help' for details.");
}

const DEFAULT_CONFIG: &str = r#"# todone configuration

# Repositories to scan, in order.
# [[repos]]
# name = "api"
# path = "../api"

[llm]
# Any OpenAI-compatible chat completions endpoint.
provider = "openai"
model = "gpt-4.1-mini"
# api_key = "..."                       # falls back to OPENAI_API_KEY
# base_url = "http://localhost:11434"   # e.g. Ollama
timeout_secs = 120

[search]
# Must accept ripgrep's flags; the pattern is matched literally.
command = "rg"
# args = ["--hidden"]
pattern = "TODO"
context_lines = 5
no_match_exit_code = 1

[enrich]
concurrency = 8
# Prompt file paths are relative to this file.
# prompt_file = "prompts/code_enrichment.md"
# task_file = "prompts/task_desc.md"

[agent]
# system_prompt_file = "prompts/agent.md"
max_tool_rounds = 8
"#;

fn load_config(path: Option<&Path>) -> Result<TodoneConfig> {
    let config = match path {
        Some(path) => TodoneConfig::from_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                TodoneConfig::from_file(default_path)?
            } else {
                TodoneConfig::default()
            }
        }
    };
    Ok(config)
}

fn require_repos(config: &TodoneConfig) -> Result<()> {
    if config.repos.is_empty() {
        miette::bail!(
            help = "add [[repos]] entries to todone.toml, or run `todone init` to create one",
            "no repositories configured"
        );
    }
    Ok(())
}

fn llm_client(config: &TodoneConfig) -> Result<Arc<LlmClient>> {
    let client = LlmClient::new(&config.llm)?;
    if !client.has_api_key() && config.llm.base_url.is_none() {
        miette::bail!(
            help = format!("export {API_KEY_ENV}, or set [llm] api_key / base_url in todone.toml"),
            "{API_KEY_ENV} is required to call the OpenAI API"
        );
    }
    tracing::info!(model = client.model(), "using model");
    Ok(Arc::new(client))
}

/// A signal that fires on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            handle.cancel();
        }
    });
    signal
}

fn spinner(message: &'static str) -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .into_diagnostic()?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn print_units(units: &[EnrichmentUnit], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(units).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("# TODO matches\n");
            if units.is_empty() {
                println!("No TODOs found.");
            } else {
                println!("| Location | Match |");
                println!("|----------|-------|");
                for unit in units {
                    println!(
                        "| `{}` | {} |",
                        unit.location(),
                        unit.match_text.replace('|', "\\|")
                    );
                }
            }
        }
        OutputFormat::Text => {
            if units.is_empty() {
                println!("No TODOs found.");
            }
            for unit in units {
                println!("{}  {}", unit.location(), unit.match_text);
            }
        }
    }
    Ok(())
}

async fn run_chat(config: &TodoneConfig) -> Result<()> {
    let client = llm_client(config)?;
    let mut agent = Agent::from_config(config, client)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("user>\t");
        std::io::stdout().flush().into_diagnostic()?;

        let line = tokio::select! {
            line = lines.next_line() => line.into_diagnostic()?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let (handle, cancel) = cancel_pair();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });
        let outcome = agent.turn(&line, &cancel).await;
        watcher.abort();

        match outcome {
            Ok(answer) => println!("agent>\t{answer}"),
            Err(TodoneError::Cancelled) => eprintln!("(cancelled)"),
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                eprintln!("error: {e}");
            }
        }
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Aggregate { concurrency }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(n) = concurrency {
                config.enrich.concurrency = n;
            }
            config.validate()?;
            require_repos(&config)?;

            let client = llm_client(&config)?;
            let aggregator = Aggregator::from_config(&config, client)?;
            let cancel = cancel_on_ctrl_c();

            let spinner = spinner("Aggregating TODOs...")?;
            let result = aggregator.run(&cancel).await.inspect_err(|_e| {
                if let Some(pb) = &spinner {
                    pb.finish_with_message("Failed");
                }
            })?;
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result.to_json()?).into_diagnostic()?
                    );
                }
                OutputFormat::Markdown => print!("{}", result.to_markdown()),
                OutputFormat::Text => print!("{result}"),
            }

            if !result.is_complete() {
                miette::bail!(
                    "{} of {} TODOs could not be enriched",
                    result.errors.len(),
                    result.stats.units
                );
            }
        }
        Some(Command::Scan) => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            require_repos(&config)?;

            let scanner = Scanner::new(config.search.clone());
            let units = scanner.scan_all(&config.repos, &cancel_on_ctrl_c()).await?;
            print_units(&units, cli.format)?;
        }
        Some(Command::Chat) => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            run_chat(&config).await?;
        }
        Some(Command::Init) => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                miette::bail!("{DEFAULT_CONFIG_PATH} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {DEFAULT_CONFIG_PATH} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "todone", &mut std::io::stdout());
        }
    }

    Ok(())
}
