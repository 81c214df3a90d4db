//! Music Curator - duplicate detection and resolution for a music library
//! catalog.
//!
//! Finds duplicate entries by exact content hash, fuzzy metadata
//! similarity, and duration matching, then resolves them by merging play
//! history, collections, and favorites into the best-quality copy.

pub mod cli;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod model;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("music_curator=info".parse()?))
        .init();

    cli::run_command(&args)
}
