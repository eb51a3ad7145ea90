use clap::Parser;
use mathgpt::cli::{self, Cli, Commands};
use mathgpt::repl;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let Cli {
        command,
        model,
        no_greeting,
    } = Cli::parse();

    match command {
        Some(Commands::Run(args)) => cli::run(args, model, no_greeting).await,
        Some(Commands::Config(args)) => cli::config(args),
        None => repl::run(model, no_greeting)
            .await
            .unwrap_or_else(|e| cli::report_error(&e)),
    }
}
