mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Command, ConfigCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run => commands::run().await,
        Command::Config { command } => match command {
            ConfigCommand::SetApi { url } => commands::config_set_api(url),
            ConfigCommand::Show => commands::config_show(),
        },
        Command::Status => commands::status().await,
        Command::Version => {
            commands::version();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

/// Maps a failure back to the exit codes device operators script against:
/// exit 2 is reserved for "not provisioned"; invalid args and an
/// unreachable runtime both fall through to exit 1.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.to_string().contains("not provisioned") {
        2
    } else {
        1
    }
}
