use clap::Parser;

use captionforge::cli::{self, Cli, Command, ConfigCommand};
use captionforge::{config, logging};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let command = Cli::parse().command.unwrap_or(Command::Process {
        path: None,
        media_type: None,
        json: false,
    });

    // These never need a valid config file.
    match command {
        Command::Version => {
            cli::handle_version();
            return Ok(());
        }
        Command::Config(ConfigCommand::Path) => {
            cli::handle_config_path();
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config()?;
    logging::init_tracing(&cfg.logging)?;

    match command {
        Command::Process {
            path,
            media_type,
            json,
        } => cli::handle_process(&cfg, path, media_type, json).await,
        Command::Check => cli::handle_check(&cfg).await,
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(&cfg),
        Command::Config(ConfigCommand::Path) | Command::Version => Ok(()),
    }
}
