// crates/orderflow-cli/src/main.rs
// ============================================================================
// Module: Orderflow CLI Entry Point
// Description: Binary entry for the worker and audit tooling.
// Purpose: Parse arguments, initialize logging, and dispatch commands.
// Dependencies: clap, orderflow-cli, tracing-subscriber
// ============================================================================

//! ## Overview
//! The binary parses arguments, initializes env-filtered structured logging,
//! and dispatches into the library. Failures render once on stderr and map
//! to a non-zero exit code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use orderflow_cli::Cli;
use orderflow_cli::run;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Binary entry point.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = std::io::stderr().lock();
            let _unused = writeln!(stderr, "orderflow: {error}");
            ExitCode::FAILURE
        }
    }
}
