//! Beacon CLI - single entrypoint for the analytics API

mod commands;

use clap::{Parser, Subcommand};
use commands::ServeCommand;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BEACON_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "BEACON_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
}

fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    // RUST_LOG gives full control when set
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e));
    }

    EnvFilter::try_new(format!(
        "beacon={level},\
         beacon_cli={level},\
         beacon_core={level},\
         beacon_config={level},\
         beacon_entities={level},\
         beacon_database={level},\
         beacon_geo={level},\
         beacon_sessions={level},\
         beacon_variants={level},\
         beacon_analytics={level},\
         tower_http={level},\
         mongodb=warn,\
         h2=warn,\
         tower=warn,\
         hyper=warn,\
         reqwest=warn",
        level = level
    ))
    .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = log_filter(&cli.log_level)?;

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_reads_flags() {
        let cli = Cli::parse_from([
            "beacon",
            "--log-level",
            "debug",
            "serve",
            "--mongodb-uri",
            "mongodb://localhost:27017",
            "--frontend-origin",
            "https://example.com",
        ]);

        assert_eq!(cli.log_level, "debug");
        let Commands::Serve(serve) = cli.command;
        assert_eq!(serve.mongodb_uri, "mongodb://localhost:27017");
        assert_eq!(serve.frontend_origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        if std::env::var("RUST_LOG").is_err() {
            assert!(log_filter("loud").is_err());
        }
        assert!(log_filter("debug").is_ok());
    }
}
