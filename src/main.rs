use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use meeting_copilot::{Config, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Headless terminal front-end: prints the live bilingual transcript and
/// forwards commands to the session manager.
#[derive(Parser, Debug)]
#[command(name = "meeting-copilot")]
struct Args {
    /// Config file path (extension optional, `config` crate conventions)
    #[arg(long, default_value = "config/meeting-copilot")]
    config: String,

    /// Backend capture device name (overrides config)
    #[arg(long)]
    device: Option<String>,

    /// Do not stream microphone audio (receive-only)
    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("config not loaded ({}), using defaults", e);
            Config::default()
        }
    };
    if args.device.is_some() {
        config.backend.device = args.device;
    }
    if args.no_audio {
        config.audio.enabled = false;
    }

    let manager = Arc::new(SessionManager::new(config)?);

    match manager.load_devices().await {
        Ok(devices) => {
            for device in &devices {
                info!(index = device.index, name = %device.name, "backend device");
            }
        }
        Err(e) => warn!("device listing failed: {}", e),
    }

    manager.connect().await?;

    let mut updates = manager.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = updates.borrow().clone();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            print_new_lines("en", &last.finals_en, &state.finals_en);
            print_new_lines("tr", &last.finals_tr, &state.finals_tr);
            if state.assistant_answer != last.assistant_answer
                && !state.assistant_answer.is_empty()
            {
                println!("[assistant] {}", state.assistant_answer);
            }
            if state.status_text != last.status_text {
                info!(status = %state.status_text, "session");
            }
            last = state;
        }
    });

    // Manual assistant questions and history clearing come in on stdin.
    let commands = Arc::clone(&manager);
    let command_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line == "clear" {
                commands.clear_history();
                println!("history cleared");
            } else if line == "ask" {
                commands.ask(None).await;
            } else if let Some(question) = line.strip_prefix("ask ") {
                commands.ask(Some(question.to_string())).await;
            } else if !line.is_empty() {
                println!("commands: ask [question] | clear");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    manager.disconnect().await;
    printer.abort();
    command_task.abort();

    Ok(())
}

/// Print transcript lines appended since the previous snapshot. Once the
/// 600-line cap kicks in lengths stop growing, so fall back to the newest
/// line when it changed.
fn print_new_lines(tag: &str, old: &[String], new: &[String]) {
    if new.len() > old.len() {
        for line in &new[old.len()..] {
            println!("[{}] {}", tag, line);
        }
    } else if new.last() != old.last() {
        if let Some(line) = new.last() {
            println!("[{}] {}", tag, line);
        }
    }
}
