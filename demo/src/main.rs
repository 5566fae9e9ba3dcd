//! taxdesk-verify entry point
//!
//! ```text
//! taxdesk-verify --provider-url https://abcd.supabase.co verify "$TOKEN"
//! echo "Bearer $TOKEN" | taxdesk-verify -v verify --header --require-authenticated
//! taxdesk-verify --config taxdesk.toml keys --format json
//! ```

#![warn(clippy::all)]

mod cli;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments
    let cli = cli::Cli::parse();

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
