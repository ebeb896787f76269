//! Ragline CLI entry point.

use anyhow::Result;
use clap::Parser;
use ragline::cli::{commands, Cli, Commands};
use ragline::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match &cli.config {
        Some(path) => Settings::expand_path(path),
        None => Settings::default_config_path(),
    };
    let settings = Settings::load_from(Some(&config_path))?;

    // Initialize logging; -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("ragline={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::Load { video } => {
            commands::run_load(video, settings).await?;
        }

        Commands::Ingest { video, app_id } => {
            commands::run_ingest(video, app_id.as_deref(), settings).await?;
        }

        Commands::Query {
            text,
            n_results,
            app_id,
            scores,
        } => {
            commands::run_query(text, *n_results, app_id.as_deref(), *scores, settings).await?;
        }

        Commands::Count => {
            commands::run_count(settings).await?;
        }

        Commands::Reset { yes } => {
            commands::run_reset(*yes, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&config_path, &settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &config_path, settings)?;
        }
    }

    Ok(())
}
