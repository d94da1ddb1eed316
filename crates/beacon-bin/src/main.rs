//! Beacon - durable event delivery from the command line.

mod app;

use std::path::PathBuf;
use std::process::ExitCode;

use beacon_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// Beacon command-line interface.
#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Queue analytics events durably and deliver them in order")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for the queue database and config. Defaults to ~/.beacon
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an action for an actor
    Track {
        #[arg(long)]
        write_key: String,
        #[arg(long)]
        actor: String,
        /// Action name
        #[arg(long)]
        action: String,
        /// Property as key=value; values that parse as JSON keep their type
        #[arg(long = "property", value_name = "KEY=VALUE")]
        properties: Vec<String>,
        /// Record the action as a sale of this value
        #[arg(long)]
        sale_value: Option<f64>,
        /// Currency for --sale-value
        #[arg(long, default_value = "USD", requires = "sale_value")]
        currency: String,
    },
    /// Queue a transfer of identity from one actor to another
    Transfer {
        #[arg(long)]
        write_key: String,
        #[arg(long)]
        old_actor: String,
        #[arg(long)]
        new_actor: String,
    },
    /// Deliver everything queued for a write key now
    Flush {
        #[arg(long)]
        write_key: String,
    },
    /// Show pending records per write key
    Status,
    /// Delete every queued record
    Truncate,
    /// Deliver in the background until interrupted
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let app = app::App::open(paths, config).await?;

    let ok = match cli.command {
        Commands::Track {
            write_key,
            actor,
            action,
            properties,
            sale_value,
            currency,
        } => {
            let properties = app::parse_properties(&properties)?;
            let sale = sale_value.map(|value| (currency, value));
            app.track(&write_key, &actor, &action, properties, sale).await?;
            true
        }
        Commands::Transfer {
            write_key,
            old_actor,
            new_actor,
        } => {
            app.transfer(&write_key, &old_actor, &new_actor).await?;
            true
        }
        Commands::Flush { write_key } => app.flush(&write_key).await,
        Commands::Status => {
            app.print_status().await?;
            true
        }
        Commands::Truncate => {
            app.truncate().await?;
            true
        }
        Commands::Run => {
            app.run().await?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
