//! Entry point for the `verikit` binary.

mod commands;
mod console;
mod render;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use console::{new_session_id, Console};
use render::{render_answer, TraceLevel};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vk_core::config::load_config;
use vk_core::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "verikit", version, about = "Verified code generation from the terminal")]
struct Cli {
    /// Project root holding `.verikit/config.toml`.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    /// Trace output: off, basic or debug.
    #[arg(long, default_value = "basic")]
    trace: TraceLevel,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive console (the default).
    Chat {
        /// Resume an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Run a single turn and print the answer.
    Run {
        #[arg(long)]
        session: Option<String>,

        /// Print the turn output as JSON.
        #[arg(long)]
        json: bool,

        /// The message for the turn.
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Check that the configured verifier is reachable.
    Check,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.root).await?;
    let orchestrator = Orchestrator::from_config(config)?;

    match cli.command.unwrap_or(Command::Chat { session: None }) {
        Command::Chat { session } => {
            let session = session.unwrap_or_else(new_session_id);
            let mut console = Console::new(orchestrator, session, cli.trace);
            console.run().await.map_err(|e| eyre!(e))
        }
        Command::Run {
            session,
            json,
            message,
        } => {
            let session = session.unwrap_or_else(new_session_id);
            let console = Console::new(orchestrator, session, cli.trace);
            let output = console
                .send(&message.join(" "))
                .await
                .map_err(|e| eyre!(e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", render_answer(&output));
            }
            Ok(())
        }
        Command::Check => {
            println!("model:    {}", orchestrator.model_name());
            println!("verifier: {}", orchestrator.verifier_name());
            let console = Console::new(orchestrator, new_session_id(), cli.trace);
            if console.health_check().await {
                println!("verifier reachable");
                Ok(())
            } else {
                Err(eyre!("verifier unreachable"))
            }
        }
    }
}
