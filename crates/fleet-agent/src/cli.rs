use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "fleet-agent", about = "IoT fleet orchestration device agent", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the supervisor: boot, wire components, reconcile forever.
    Run,

    /// Inspect or change persisted agent configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Show device and reconciliation status from the local control API.
    Status,

    /// Print the agent's version.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Persist an override for the cloud API endpoint.
    SetApi { url: String },

    /// Print the effective configuration (environment + persisted overrides).
    Show,
}
