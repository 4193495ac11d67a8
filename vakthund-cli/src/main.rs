//! ## vakthund-cli
//! **Operational entrypoint for the gate**
//!
//! `run` starts the gate, `check` validates a configuration file and `plan`
//! prints the firewall rules the gate would apply at startup.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
