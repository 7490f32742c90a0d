//! fleetnotify CLI - submit notification jobs and inspect deliveries

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod client;
mod commands;
mod output;

use cli::{Cli, Commands};
use client::ApiClient;
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so .env can supply --url and --secret
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fleetnotify={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let client = ApiClient::new(&cli.url, cli.secret)?;

    let result = match cli.command {
        Commands::Ping => ping::execute(&client).await,
        Commands::Submit(args) => submit::execute(&client, args).await,
        Commands::Job { id } => job::execute(&client, &id).await,
        Commands::LinkCode { uid } => link_code::execute(&client, &uid).await,
        Commands::Config { file } => config::execute(file.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
