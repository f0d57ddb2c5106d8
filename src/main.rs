// storymint - main.rs
// Parses the command line and hands off to the CLI runner.

use clap::Parser;
use std::process::exit;
use storymint::cli::{run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ {e:#}");
        exit(1);
    }
}
