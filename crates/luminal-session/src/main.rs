//! Luminal Session — a REPL driving the conversational memory engine over
//! stdin/stdout.
//!
//! Wires a `Storage`, a `HashEmbedder`, and an `EchoGenerator` test double
//! into a `SessionController` and runs one user turn per line of input.

mod echo_generator;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use luminal_core::{Config, HashEmbedder, SemanticIndex, SessionController, Storage};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::echo_generator::EchoGenerator;

#[derive(Parser)]
#[command(name = "luminal-session", version, about = "REPL for the luminal conversational memory engine")]
struct Args {
    /// Custom data directory; defaults to the platform data dir.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run entirely in memory, discarding state on exit.
    #[arg(long)]
    in_memory: bool,
}

fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "luminal", "luminal")
        .map(|dirs| dirs.data_dir().join("luminal.sqlite3"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let storage = if args.in_memory {
        Storage::open_in_memory()
    } else {
        let path = args.data_dir.or_else(default_data_dir).unwrap_or_else(|| PathBuf::from("luminal.sqlite3"));
        info!(path = %path.display(), "opening store");
        Storage::open(&path)
    };

    let storage = match storage {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let config = Config::default();
    let index = SemanticIndex::new(storage, HashEmbedder::new());
    let generator = EchoGenerator::new(config.context_limit);
    let mut session = SessionController::new(index, generator, config);

    println!("{}", "luminal-session — type a message, or /quit to exit".dimmed());

    let stdin = io::stdin();
    loop {
        print!("{} ", "you>".cyan().bold());
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        if let Some(fired) = session.maybe_reflect().await.transpose() {
            match fired {
                Ok(outcome) => println!("{} {}", "[reflection]".yellow(), outcome.assistant_text.trim()),
                Err(e) => error!("reflection turn failed: {}", e),
            }
        }

        match session.handle_user_turn(line).await {
            Ok(outcome) => {
                println!("{} {}", "assistant>".magenta().bold(), outcome.assistant_text.trim());
                info!(
                    resurrected = outcome.resurrection.resurrected.len(),
                    pruned = outcome.resurrection.pruned.len(),
                    written_chunks = outcome.written_chunks.len(),
                    "turn complete"
                );
            }
            Err(e) => {
                error!("turn failed: {}", e);
                println!("{} {}", "[error]".red(), e);
            }
        }
    }

    println!("{}", "goodbye".dimmed());
}
