//! Zenith - savings plan tracker
//!
//! Command-line entry point.

use std::io::Write;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod state;

use cli::Cli;
use commands::Clock;
use state::AppState;

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let state = match AppState::new(cli.data_dir.clone(), cli.config.as_deref()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize application: {}", e);
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(data_dir = %state.data_dir().display(), "Application state ready");

    let clock = Clock::system(cli.today);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = commands::run(&state, cli.command, clock, &mut out) {
        tracing::error!("Command failed: {}", e);
        eprintln!("{e}");
        std::process::exit(1);
    }
    let _ = out.flush();
}
