//! Interactive chat loop on stdin/stdout.

use crate::agent::AgentEvent;
use crate::cli::{self, Setup};
use crate::config::Config;
use crate::session::{Credential, Session, SessionError, Transcript, TurnRole};
use anyhow::Result;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "\
Type a math question and press Enter.

  /history   show the conversation so far
  /help      show this help
  /quit      leave (also /exit or Ctrl-D)";

/// One line of user input, classified.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Quit,
    History,
    Help,
    Unknown(String),
    Ask(String),
}

fn parse_input(line: &str) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "/quit" | "/exit" => Command::Quit,
        "/history" => Command::History,
        "/help" | "/?" => Command::Help,
        other if other.starts_with('/') && !other.contains(char::is_whitespace) => {
            Command::Unknown(other.to_string())
        }
        other => Command::Ask(other.to_string()),
    }
}

fn speaker(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "you",
        TurnRole::Assistant => "mathgpt",
    }
}

/// Transcript as `speaker: text` lines.
fn format_transcript(transcript: &Transcript) -> Vec<String> {
    transcript
        .turns()
        .iter()
        .map(|turn| format!("{}: {}", speaker(turn.role()), turn.content()))
        .collect()
}

fn print_prompt() -> io::Result<()> {
    print!("{} ", "you>".green().bold());
    io::stdout().flush()
}

/// Render progress for one submission. Returns whether answer text was printed.
async fn render_events(mut rx: mpsc::Receiver<AgentEvent>) -> bool {
    let mut printed_text = false;
    let mut started = false;

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::TextDelta(text) => {
                if !started {
                    print!("{} ", "mathgpt>".cyan().bold());
                    started = true;
                }
                print!("{text}");
                let _ = io::stdout().flush();
                printed_text = true;
            }
            AgentEvent::ToolCallStart {
                name, arguments, ..
            } => {
                if started {
                    println!();
                    started = false;
                }
                eprintln!("{}", format!("> {}", cli::tool_call_summary(&name, &arguments)).dim());
            }
            AgentEvent::ToolCallResult {
                content,
                is_error: true,
                ..
            } => {
                eprintln!("{}", format!("  -> {}", cli::preview(&content, 200)).red());
            }
            AgentEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                tracing::debug!(input_tokens, output_tokens, "Provider usage");
            }
            _ => {}
        }
    }

    printed_text
}

/// Submit one question, rendering progress while it runs.
async fn ask(session: &mut Session, credential: &Credential, question: &str) {
    let (tx, rx) = mpsc::channel::<AgentEvent>(100);
    let renderer = tokio::spawn(render_events(rx));

    let result = tokio::select! {
        result = session.submit(question, Some(credential), Some(tx)) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let printed_text = renderer.await.unwrap_or(false);

    match result {
        Some(Ok(answer)) => {
            if printed_text {
                println!();
            } else {
                println!("{} {answer}", "mathgpt>".cyan().bold());
            }
        }
        Some(Err(e)) => {
            if printed_text {
                println!();
            }
            eprintln!("{} {e}", "error:".red().bold());
        }
        None => {
            if printed_text {
                println!();
            }
            eprintln!("{}", "Interrupted".yellow());
        }
    }
    println!();
}

/// Run the interactive chat until `/quit` or end of input.
pub async fn run(model: Option<String>, no_greeting: bool) -> Result<ExitCode> {
    cli::init_logging(false);

    let config = Config::load().map_err(crate::error::Error::from)?;
    let Setup {
        provider,
        model,
        mut session,
    } = cli::build_session(&config, model.as_deref(), !no_greeting)?;

    println!(
        "{} {}",
        "MathGPT".cyan().bold(),
        format!("· {provider}/{model} · /help for commands").dim()
    );

    let Some(credential) = cli::resolve_credential(provider, true)? else {
        eprintln!("{}", cli::missing_credential_hint(provider).red());
        return Ok(ExitCode::from(
            crate::error::Error::from(SessionError::MissingCredential).exit_code(),
        ));
    };
    tracing::debug!(session = %session.id, %provider, %model, "Interactive session started");

    println!();
    for line in format_transcript(session.transcript()) {
        println!("{line}");
    }
    if !session.transcript().is_empty() {
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}\n"),
            Command::History => {
                for line in format_transcript(session.transcript()) {
                    println!("{line}");
                }
                println!();
            }
            Command::Unknown(cmd) => eprintln!("Unknown command {cmd}. Type /help for commands.\n"),
            Command::Ask(question) => ask(&mut session, &credential, &question).await,
        }
    }

    Ok(ExitCode::SUCCESS)
}
