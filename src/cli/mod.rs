//! Command-line interface for music-curator.
//!
//! This module provides CLI commands for detecting, inspecting, and
//! resolving duplicate entries in the library catalog.

mod commands;

pub use commands::{Cli, Commands, run_command};
