//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pickbot", version, about = "Pick-and-place controller and actuation services")]
pub struct Cli {
    /// Path to the TOML configuration file (missing file means defaults)
    #[arg(short, long, value_name = "FILE", default_value = "pickbot.toml")]
    pub config: PathBuf,

    /// Which services to run (defaults to `all`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Controller: ingress API plus the state-machine control loop
    Controller,
    /// Actuation: PID / motion API in front of the hardware stores
    Actuation,
    /// Both services in one process
    All,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::All)
    }
}

impl Command {
    pub fn runs_controller(self) -> bool {
        matches!(self, Command::Controller | Command::All)
    }

    pub fn runs_actuation(self) -> bool {
        matches!(self, Command::Actuation | Command::All)
    }
}
