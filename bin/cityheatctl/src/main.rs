//! ---
//! cityheat_section: "05-external-interfaces"
//! cityheat_subsection: "binary"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Command line utility for local heating network balancing runs."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Local heating network balancing utility",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Balance every heating network of a scenario and write reports.
    Balance(commands::BalanceCommand),
    /// List the heating networks of a scenario with their loss rates.
    Networks(commands::NetworksCommand),
    /// Estimate the design-point heat loss of a pipe run.
    Loss(commands::LossCommand),
    /// Verify a result bundle and summarise its contents.
    Inspect(commands::InspectCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Balance(cmd) => cmd.execute(),
        Commands::Networks(cmd) => cmd.execute(),
        Commands::Loss(cmd) => cmd.execute(),
        Commands::Inspect(cmd) => cmd.execute(),
    }
}
