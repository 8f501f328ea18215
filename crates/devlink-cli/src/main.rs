//! Command-line interface for devlink.
//!
//! Loads the configured command and state definitions and lets an operator
//! inspect them, validate command payloads and try state updates.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devlink_commands::{CommandManager, CommandOrigin};
use devlink_core::{logging, DevlinkConfig, Error, ErrorInfo};
use devlink_schema::{PropValue, ValueMap};
use devlink_state::StateManager;
use serde_json::Value;
use tracing::debug;

/// devlink - typed device commands and state.
#[derive(Parser, Debug)]
#[command(name = "devlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: $DEVLINK_CONFIG or ./devlink.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded command definitions.
    Commands {
        /// Print full definitions as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate a command payload and print the admitted command.
    Submit {
        /// Payload: {"name": "pkg.cmd", "component": ..., "parameters": {...}}
        payload: String,
        /// Treat the command as coming from the cloud.
        #[arg(long)]
        cloud: bool,
    },
    /// Apply state updates and print the resulting state.
    State {
        /// Update as package.property=<json>; repeatable.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        updates: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = DevlinkConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    debug!(category = "config", ?config, "Effective configuration");

    match args.command {
        Command::Commands { json } => list_commands(&config, json),
        Command::Submit { payload, cloud } => submit(&config, &payload, cloud),
        Command::State { updates } => update_state(&config, &updates),
    }
}

/// Print loaded command names, or the full dictionary as JSON.
fn list_commands(config: &DevlinkConfig, json: bool) -> Result<()> {
    let manager = CommandManager::from_config(config).map_err(report)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manager.definitions_json())?);
        return Ok(());
    }

    let names = manager.all_names();
    if names.is_empty() {
        println!("No commands defined.");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Validate a payload and print the admitted command.
fn submit(config: &DevlinkConfig, payload: &str, cloud: bool) -> Result<()> {
    let manager = CommandManager::from_config(config).map_err(report)?;
    let origin = if cloud {
        CommandOrigin::Cloud
    } else {
        CommandOrigin::Local
    };

    let id = manager.add_command_json(payload, origin).map_err(report)?;
    let command = manager.command_json(&id).map_err(report)?;
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}

/// Apply a batch update and print the state, plus any failures.
fn update_state(config: &DevlinkConfig, updates: &[String]) -> Result<()> {
    let state = StateManager::from_config(config).map_err(report)?;

    let mut batch = ValueMap::new();
    for update in updates {
        let (name, value) = parse_update(update)?;
        batch.insert(name, value);
    }

    let outcome = if batch.is_empty() {
        Ok(())
    } else {
        state.set_properties(&batch, chrono::Utc::now())
    };

    println!("{}", serde_json::to_string_pretty(&state.to_json())?);
    outcome.map_err(report)
}

/// Split `name=value`. Values that are not JSON are taken as strings.
fn parse_update(update: &str) -> Result<(String, PropValue)> {
    let (name, raw) = update
        .split_once('=')
        .with_context(|| format!("Invalid update '{}', expected NAME=VALUE", update))?;

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(json) => PropValue::from_json(&json).map_err(report)?,
        Err(_) => PropValue::String(raw.to_string()),
    };
    Ok((name.trim().to_string(), value))
}

/// Print the transport representation of an error and convert it for
/// `main`.
fn report(err: Error) -> anyhow::Error {
    let info = ErrorInfo::from(&err);
    if let Ok(json) = serde_json::to_string_pretty(&info) {
        eprintln!("{}", json);
    }
    anyhow::Error::new(err)
}
