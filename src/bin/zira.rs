//! Terminal chat front-end.
//!
//! Reads user messages from stdin, runs them through the turn coordinator
//! and prints transcript and status changes as notifications arrive. The
//! main task is the single presentation consumer.
//!
//! Tracing goes to stderr so the transcript on stdout stays readable.

use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zira::config::TurnOrdering;
use zira::presenter::ViewChange;
use zira::responder::ScriptedResponder;
use zira::speaker::PacedSpeaker;
use zira::{ChatConfig, ChatView, TurnCoordinator, ZiraError};

/// Zira: a grumpy chatbot that talks back.
#[derive(Parser)]
#[command(name = "zira", version, about)]
struct Cli {
    /// Path to TOML configuration file (defaults to the user config dir if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the worker pool size.
    #[arg(long)]
    workers: Option<usize>,

    /// Finish each turn before starting the next.
    #[arg(long)]
    strict: bool,

    /// Multiplier for simulated speech time (0 disables pacing).
    #[arg(long, default_value_t = 1.0)]
    speech_scale: f32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zira=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.pool.workers = workers;
    }
    if cli.strict {
        config.turns.ordering = TurnOrdering::Strict;
    }

    let responder = match &config.responder.corpus_path {
        Some(path) => ScriptedResponder::from_file(path)?,
        None => ScriptedResponder::default(),
    };

    let (coordinator, mut notifications) = TurnCoordinator::new(
        &config,
        Arc::new(responder),
        Arc::new(PacedSpeaker::new(cli.speech_scale)?),
    )?;
    let coordinator = Arc::new(coordinator);
    let session = coordinator.session_token();
    let mut view = ChatView::new(config.transcript.clone());

    println!("Zira v{}", env!("CARGO_PKG_VERSION"));
    println!("Type a message and press Enter. Say \"bye\" to leave.\n");

    let mut lines = spawn_stdin_reader()?;

    loop {
        tokio::select! {
            () = session.cancelled() => break,
            envelope = notifications.recv() => {
                let Some(envelope) = envelope else { break };
                let change = view.apply(&envelope);
                print_change(&view, change);
            }
            line = lines.recv() => {
                let Some(text) = line else {
                    info!("stdin closed");
                    break;
                };
                submit(&coordinator, &mut view, &text);
            }
        }
    }

    let draining = Arc::clone(&coordinator);
    tokio::task::spawn_blocking(move || draining.shutdown()).await?;
    for envelope in notifications.drain_pending() {
        let change = view.apply(&envelope);
        print_change(&view, change);
    }

    Ok(())
}

/// Read stdin lines on a dedicated thread.
fn spawn_stdin_reader() -> anyhow::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("zira-stdin".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(text) => {
                        if tx.send(text).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("failed to read stdin: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ChatConfig> {
    if let Some(path) = path {
        return Ok(ChatConfig::from_file(path)?);
    }
    let default_path = ChatConfig::default_config_path();
    if default_path.exists() {
        info!("loading config from {}", default_path.display());
        Ok(ChatConfig::from_file(&default_path)?)
    } else {
        Ok(ChatConfig::default())
    }
}

fn submit(coordinator: &TurnCoordinator, view: &mut ChatView, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let change = view.record_user_message(text);
    print_change(view, change);

    match coordinator.submit_turn(text, None, None) {
        Ok(_) => {}
        Err(e @ ZiraError::QueueSaturated { .. }) => println!("(busy, try again: {e})"),
        Err(e) => warn!("message not accepted: {e}"),
    }
}

fn print_change(view: &ChatView, change: ViewChange) {
    match change {
        ViewChange::Status(status) => eprintln!("  [{}]", status.label()),
        ViewChange::Appended(entry) => println!("{}", view.format_entry(&entry)),
        ViewChange::Cleared => println!("\n--- chat erased ---\n"),
    }
}
