//! Interactive console client.
//!
//! Reads one line at a time from stdin, runs it as a turn and prints the
//! trace live while the turn is in flight.

use crate::commands::{parse_input, ConsoleInput};
use crate::render::{render_answer, render_event, TraceLevel};
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use vk_core::Orchestrator;
use vk_protocol::turn_models::{TurnInput, TurnOutput};

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct Console {
    orchestrator: Orchestrator,
    session_id: String,
    trace: TraceLevel,
}

impl Console {
    pub fn new(orchestrator: Orchestrator, session_id: String, trace: TraceLevel) -> Self {
        Self {
            orchestrator,
            session_id,
            trace,
        }
    }

    /// Warn when the verifier cannot be reached; turns would fail on the
    /// first verification call.
    pub async fn health_check(&self) -> bool {
        let available = self.orchestrator.check_verifier().await;
        if !available {
            eprintln!(
                "{} verifier '{}' is not reachable; turns will fail until it is.",
                "warning:".yellow().bold(),
                self.orchestrator.verifier_name()
            );
        }
        available
    }

    /// Main loop. Ends on `:quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        println!(
            "verikit ({}, {}), session {}. Type :quit to leave.",
            self.orchestrator.model_name(),
            self.orchestrator.config().artifact.language,
            self.session_id
        );
        self.health_check().await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", ">".green().bold());
            std::io::stdout().flush().context("Failed to flush stdout")?;

            let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
                break;
            };

            match parse_input(&line) {
                ConsoleInput::Quit => break,
                ConsoleInput::Empty => {}
                ConsoleInput::NewSession => {
                    self.session_id = new_session_id();
                    println!("New session {}", self.session_id);
                }
                ConsoleInput::ForgetSession => {
                    if let Err(e) = self.orchestrator.forget_session(&self.session_id).await {
                        eprintln!("{} {e}", "error:".red().bold());
                    }
                    self.session_id = new_session_id();
                    println!("Session forgotten. New session {}", self.session_id);
                }
                ConsoleInput::SetTrace(level) => {
                    self.trace = level;
                    println!("Trace level: {level}");
                }
                ConsoleInput::Invalid(hint) => println!("{}", hint.yellow()),
                ConsoleInput::Message(message) => match self.send(&message).await {
                    Ok(output) => println!("{}", render_answer(&output)),
                    // The checkpoint is untouched; the user may simply retry.
                    Err(e) => eprintln!("{} {e:#}", "error:".red().bold()),
                },
            }
        }
        info!(session_id = %self.session_id, "Console closed");
        Ok(())
    }

    /// Run one turn, printing trace events as they arrive.
    pub async fn send(&self, message: &str) -> Result<TurnOutput> {
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let input = TurnInput::new(self.session_id.clone(), message);

        let turn = self.orchestrator.run_turn(input, &events_tx);
        tokio::pin!(turn);

        let result = loop {
            select! {
                result = &mut turn => break result,
                Some(event) = events_rx.recv() => self.print_event(&event),
            }
        };
        while let Ok(event) = events_rx.try_recv() {
            self.print_event(&event);
        }

        result.context("Turn failed")
    }

    fn print_event(&self, event: &vk_protocol::ipc::Event) {
        if let Some(line) = render_event(event, self.trace) {
            eprintln!("{line}");
        }
    }
}
