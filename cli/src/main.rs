//! Subchat CLI - Interactive command-line peer
//!
//! Usage:
//!   subchat --session alice.json
//!   subchat --session bob.json --relay ws://127.0.0.1:8080 --relay ws://10.0.0.2:8080

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Duration;
use subchat_core::peer::{Peer, PeerConfig, PeerSession};
use tracing::info;

mod commands;
mod ui;

use commands::CommandHandler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the session file (created if it doesn't exist)
    #[arg(short, long, default_value = "subchat-session.json")]
    session: PathBuf,

    /// Candidate relay; repeat to race several
    #[arg(short, long)]
    relay: Vec<String>,

    /// Forget the remembered relay and race the candidates again
    #[arg(long)]
    reselect: bool,

    /// Seconds to wait for the relay to acknowledge a request
    #[arg(long, default_value_t = 10)]
    request_timeout_secs: u64,
}

impl Args {
    fn peer_config(&self) -> PeerConfig {
        let mut config = PeerConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..PeerConfig::default()
        };
        if !self.relay.is_empty() {
            config.relay_candidates = self.relay.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    // Print banner with version
    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", format!("  {}", subchat_core::version_string()).bright_cyan().bold());
    println!("{}", "  Short posts, relayed".bright_white());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    let mut session = PeerSession::load_or_create(&args.session)
        .with_context(|| format!("Failed to open session {}", args.session.display()))?;
    if args.reselect {
        session.set_best_relay(None);
    }
    let name = session.display_name().to_string();

    println!("{} {}", "Name:".bright_green(), name);
    println!("{} {}", "Key:".bright_green(), session.peer_key());
    ui::print_info("Looking for the closest relay...");

    let config = args.peer_config();
    info!("Connecting with config: {:?}", config);
    let peer = Peer::connect(session, config).await.context("Could not reach any relay")?;

    println!("{} {}", "Relay:".bright_green(), peer.relay());
    println!();

    let mut handler = CommandHandler::new(peer);

    // Interactive REPL
    let mut rl = DefaultEditor::new()?;
    let history_file = args.session.with_extension("history");
    let _ = rl.load_history(&history_file);

    println!("{}", "Type 'help' for available commands, 'quit' to exit".bright_yellow());
    println!();

    loop {
        let prompt = format!("{}@{}> ", name.bright_cyan(), handler.space().await.bright_yellow());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match line {
                    "quit" | "exit" => {
                        println!("{}", "Goodbye!".bright_green());
                        break;
                    }
                    "help" => {
                        ui::print_help();
                    }
                    _ => {
                        if let Err(e) = handler.handle_command(line).await {
                            ui::print_error(&format!("{}", e));
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => {
                ui::print_error(&format!("Error: {}", err));
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_file);

    handler.into_peer().disconnect().await?;
    Ok(())
}
