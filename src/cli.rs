//! Command line: argument parsing, `run` and `config`.

use crate::agent::{Agent, AgentEvent};
use crate::config::{self, Config};
use crate::provider::{Endpoint, Provider};
use crate::session::{Credential, Session, SessionError};
use crate::tool::ToolRegistry;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, IsTerminal, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Conversational math assistant backed by a hosted language model
#[derive(Parser, Debug)]
#[command(name = "mathgpt", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to chat with (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Start without the assistant greeting
    #[arg(long, global = true)]
    pub no_greeting: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer one prompt and exit (non-interactive)
    Run(RunArgs),
    /// View or modify configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Key to get (e.g. model, wikipedia.top_k_results)
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Key to set
        key: String,
        /// Value to set (empty clears optional keys)
        value: String,
    },
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The question to answer (use "-" to read from stdin)
    #[arg(required = true)]
    pub prompt: String,

    /// Output format
    #[arg(short = 'o', long, default_value = "text", value_enum)]
    pub output_format: OutputFormat,

    /// Quiet mode (answer only, no progress)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    StreamJson,
}

/// One line of `json` / `stream-json` output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonEvent {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        text: String,
    },
    ToolCallStart {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolCallResult {
        id: String,
        content: String,
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    Done {
        response: String,
    },
    Error {
        kind: String,
        message: String,
    },
}

/// Initialize tracing.
///
/// `MATHGPT_LOG` logs to `mathgpt.log`, `RUST_LOG` to stderr with its own
/// filter, and `verbose` to stderr at debug level.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    if std::env::var("MATHGPT_LOG").is_ok() {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create("mathgpt.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = EnvFilter::new("mathgpt=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => eprintln!("Failed to create log file: {err}"),
        }
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .try_init();
    } else if verbose {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("mathgpt=debug"))
            .with_writer(io::stderr)
            .try_init();
    }
}

/// A ready-to-use session and what it talks to.
pub struct Setup {
    pub provider: Provider,
    pub model: String,
    pub session: Session,
}

/// Build agent and session from config, with command-line overrides.
pub fn build_session(
    config: &Config,
    model: Option<&str>,
    greeting: bool,
) -> crate::error::Result<Setup> {
    let provider = config.provider()?;
    let model = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(config.model.as_str())
        .to_string();

    let endpoint = Endpoint {
        provider,
        base_url: config.base_url.clone(),
    };
    let tools = ToolRegistry::with_builtins(config.wikipedia.clone());
    let agent = Agent::new(Arc::new(endpoint), Arc::new(tools), model.clone())
        .with_system_prompt(config.system_prompt.clone())
        .with_max_tool_rounds(config.max_tool_rounds)
        .with_streaming(config.stream)
        .with_sampling(config.max_tokens, config.temperature);

    let mut session_config = config.session_config();
    if !greeting {
        session_config.greeting = None;
    }

    Ok(Setup {
        provider,
        model,
        session: Session::new(session_config, Arc::new(agent)),
    })
}

/// Find the API key: provider env var first, then a hidden prompt when
/// `interactive` and stdin is a terminal. Keyless providers get a placeholder.
pub fn resolve_credential(
    provider: Provider,
    interactive: bool,
) -> crate::error::Result<Option<Credential>> {
    if !provider.requires_api_key() {
        return Ok(Credential::new(provider.id()));
    }
    if let Some(key) = provider.api_key_from_env() {
        return Ok(Credential::new(key));
    }
    if !interactive || !io::stdin().is_terminal() {
        return Ok(None);
    }

    let key = dialoguer::Password::new()
        .with_prompt(format!("{} API key", provider.name()))
        .allow_empty_password(true)
        .interact()?;
    Ok(Credential::new(key))
}

/// Hint shown when no credential could be found.
pub fn missing_credential_hint(provider: Provider) -> String {
    match provider.env_vars().first() {
        Some(var) => format!(
            "No API key for {}. Set {var} or enter one when prompted.",
            provider.name()
        ),
        None => format!("No API key for {}.", provider.name()),
    }
}

/// Short `name(arg)` form of a tool call for progress lines.
pub fn tool_call_summary(name: &str, args: &serde_json::Value) -> String {
    if let Some(query) = args.get("query").and_then(|v| v.as_str()) {
        return format!("{name}({query:?})");
    }
    let raw = args.to_string();
    if raw.chars().count() > 60 {
        let truncated: String = raw.chars().take(60).collect();
        format!("{name}({truncated}...)")
    } else {
        format!("{name}({raw})")
    }
}

/// Char-safe preview of a tool result.
pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        content.to_string()
    }
}

impl JsonEvent {
    /// Stream-json line for a progress event. Reasoning is only included
    /// when verbose.
    fn from_progress(event: AgentEvent, verbose: bool) -> Option<Self> {
        Some(match event {
            AgentEvent::TextDelta(text) => Self::TextDelta { text },
            AgentEvent::ThinkingDelta(text) if verbose => Self::ThinkingDelta { text },
            AgentEvent::ToolCallStart {
                id,
                name,
                arguments,
            } => Self::ToolCallStart {
                id,
                name,
                arguments,
            },
            AgentEvent::ToolCallResult {
                id,
                content,
                is_error,
                metadata,
            } => Self::ToolCallResult {
                id,
                content,
                is_error,
                metadata,
            },
            AgentEvent::ThinkingDelta(_) | AgentEvent::Usage { .. } => return None,
        })
    }
}

/// Human-readable progress: answer text on stdout, everything else on
/// stderr. Returns whether answer text was printed.
fn print_text_event(event: AgentEvent, verbose: bool) -> io::Result<bool> {
    match event {
        AgentEvent::TextDelta(text) => {
            print!("{text}");
            io::stdout().flush()?;
            return Ok(true);
        }
        AgentEvent::ThinkingDelta(text) if verbose => eprint!("[thinking] {text}"),
        AgentEvent::ToolCallStart {
            name, arguments, ..
        } => eprintln!("\n> {}", tool_call_summary(&name, &arguments)),
        AgentEvent::ToolCallResult {
            content, is_error, ..
        } if verbose || is_error => eprintln!("  -> {}", preview(&content, 200)),
        _ => {}
    }
    Ok(false)
}

/// Print progress events as they arrive. Returns whether any answer text
/// went to stdout.
async fn print_events(
    mut rx: mpsc::Receiver<AgentEvent>,
    output_format: OutputFormat,
    quiet: bool,
    verbose: bool,
) -> Result<bool> {
    let mut printed_text = false;

    while let Some(event) = rx.recv().await {
        if let AgentEvent::Usage {
            input_tokens,
            output_tokens,
        } = event
        {
            tracing::debug!(input_tokens, output_tokens, "Provider usage");
            continue;
        }

        match output_format {
            OutputFormat::Text if !quiet => printed_text |= print_text_event(event, verbose)?,
            OutputFormat::StreamJson => {
                if let Some(json) = JsonEvent::from_progress(event, verbose) {
                    println!("{}", serde_json::to_string(&json)?);
                }
            }
            OutputFormat::Text | OutputFormat::Json => {}
        }
    }

    Ok(printed_text)
}

/// Print the answer or the failure, and pick the exit code.
fn output_result(
    result: std::result::Result<String, SessionError>,
    output_format: OutputFormat,
    quiet: bool,
    printed_text: bool,
    provider: Provider,
) -> Result<ExitCode> {
    let err = match result {
        Ok(answer) => {
            if output_format == OutputFormat::Text {
                if quiet || !printed_text {
                    println!("{answer}");
                } else if !answer.ends_with('\n') {
                    println!();
                }
            } else {
                let done = JsonEvent::Done { response: answer };
                let json = if output_format == OutputFormat::Json {
                    serde_json::to_string_pretty(&done)?
                } else {
                    serde_json::to_string(&done)?
                };
                println!("{json}");
            }
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => e,
    };

    let message = match err {
        SessionError::MissingCredential => missing_credential_hint(provider),
        ref other => other.to_string(),
    };
    match output_format {
        OutputFormat::Text => {
            if printed_text {
                println!();
            }
            eprintln!("Error: {message}");
        }
        OutputFormat::Json | OutputFormat::StreamJson => {
            let json = serde_json::to_string(&JsonEvent::Error {
                kind: err.kind().to_string(),
                message,
            })?;
            println!("{json}");
        }
    }
    Ok(ExitCode::from(crate::error::Error::from(err).exit_code()))
}

/// `mathgpt run`: answer one prompt and exit. `model` and `no_greeting`
/// come from the top-level flags, which may appear before or after `run`.
pub async fn run(args: RunArgs, model: Option<String>, no_greeting: bool) -> ExitCode {
    run_inner(args, model, no_greeting)
        .await
        .unwrap_or_else(|e| report_error(&e))
}

/// Print a top-level failure and map it to an exit code.
pub fn report_error(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err:#}");
    let code = err
        .downcast_ref::<crate::error::Error>()
        .map_or(1, crate::error::Error::exit_code);
    ExitCode::from(code)
}

async fn run_inner(args: RunArgs, model: Option<String>, no_greeting: bool) -> Result<ExitCode> {
    init_logging(args.verbose);

    let config = Config::load().map_err(crate::error::Error::from)?;

    let from_stdin = args.prompt == "-";
    let prompt = if from_stdin {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer.trim().to_string()
    } else {
        args.prompt.trim().to_string()
    };
    if prompt.is_empty() {
        anyhow::bail!("Empty prompt");
    }

    let Setup {
        provider,
        model,
        mut session,
    } = build_session(&config, model.as_deref(), !no_greeting)?;
    let credential = resolve_credential(provider, !from_stdin)?;
    tracing::debug!(provider = %provider, %model, session = %session.id, "One-shot run");

    let (tx, rx) = mpsc::channel::<AgentEvent>(100);
    let output_format = args.output_format;
    let quiet = args.quiet;
    let printer = tokio::spawn(print_events(rx, output_format, quiet, args.verbose));

    let result = session.submit(&prompt, credential.as_ref(), Some(tx)).await;
    let printed_text = printer.await??;

    output_result(result, output_format, quiet, printed_text, provider)
}

/// `mathgpt config`
#[must_use]
pub fn config(args: ConfigArgs) -> ExitCode {
    match config_inner(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(e, crate::error::Error::Config(config::ConfigError::UnknownKey(_))) {
                eprintln!("Valid keys: {}", config::KEYS.join(", "));
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn config_inner(args: ConfigArgs) -> crate::error::Result<()> {
    let mut config = Config::load()?;

    match args.action {
        None => {
            let rendered = toml::to_string_pretty(&config).map_err(config::ConfigError::from)?;
            print!("{rendered}");
        }
        Some(ConfigAction::Path) => println!("{}", config::config_path().display()),
        Some(ConfigAction::Get { key }) => println!("{}", config.get(&key)?),
        Some(ConfigAction::Set { key, value }) => {
            config.set(&key, &value)?;
            config.save()?;
            println!("Updated {key}");
        }
    }
    Ok(())
}
