//! CLI for eventpub
//!
//! Subcommands:
//! - `publish`: publish one event and exit non-zero if it was not delivered
//! - `check`: connect to the configured broker and report

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use eventpub::Publisher;
use eventpub::config::load_config_from;
use serde_json::{Map, Value};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "eventpub", version, about = "Publish events to a Redis pub/sub broker")]
struct Cli {
    /// Configuration file, with or without extension
    #[arg(long, default_value = "config/default")]
    config_file: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish a single event
    Publish {
        /// Event name, e.g. user.created
        event: String,
        /// Event data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
        /// Channel to publish on (defaults to publisher.channel)
        #[arg(long)]
        channel: Option<String>,
        /// Named broker configuration (defaults to publisher.config_name)
        #[arg(long)]
        config_name: Option<String>,
    },
    /// Connect to the broker and report whether it is reachable
    Check {
        /// Named broker configuration (defaults to publisher.config_name)
        #[arg(long)]
        config_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    eventpub::utils::logging::init(&cli.log_level);

    let settings = match load_config_from(&cli.config_file) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };
    let publisher = Publisher::redis(settings);

    match cli.command {
        Command::Publish {
            event,
            data,
            channel,
            config_name,
        } => {
            let data = match parse_data(&data) {
                Ok(data) => data,
                Err(e) => {
                    error!("Invalid --data: {e}");
                    return ExitCode::from(2);
                }
            };
            let delivered = publisher
                .publish(&event, data, channel.as_deref(), config_name.as_deref())
                .await;
            report(delivered, &format!("event {event}"))
        }
        Command::Check { config_name } => {
            if let Some(name) = config_name {
                publisher.set_default_config_name(&name).await;
            }
            report(publisher.check().await, "broker connection")
        }
    }
}

fn parse_data(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

fn report(ok: bool, what: &str) -> ExitCode {
    if ok {
        info!("{what}: ok");
        ExitCode::SUCCESS
    } else {
        error!("{what}: failed");
        ExitCode::FAILURE
    }
}
