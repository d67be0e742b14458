mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let (mode, args) = match &cli.command {
        Commands::Produce(args) => (cmd::Mode::Produce, args),
        Commands::Consume(args) => (cmd::Mode::Consume, args),
        Commands::Run(args) => (cmd::Mode::Run, args),
    };

    let eff = match Effective::new(args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cmd::run(mode, &eff).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
