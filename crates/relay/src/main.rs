mod cli; // Declare the cli module
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use relay_core::event::{Event, LifecycleEvent, Payload, Subject};
use relay_core::kernel::constants::DEFAULT_CONFIG_FILE;
use relay_core::promise::{self, Promise};
use relay_core::{Application, KernelError, RelayConfig, Result as KernelResult};
use serde_json::{Value, json};

/// Relay: publish/subscribe dispatch and promises from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Simple ping command for testing
    #[arg(long)]
    ping: bool,

    /// Configuration file (json, yaml or toml); defaults to ./relay.toml when present
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish an event and print its final payload
    Publish {
        /// Name of the event to publish
        event: String,
        /// Subject attached to the event
        #[arg(long)]
        subject: Option<String>,
        /// Payload entry as key=value; values are parsed as JSON when possible
        #[arg(long = "set", value_parser = parse_assignment)]
        values: Vec<(String, Value)>,
        /// Declare a return slot that subscribers can fill
        #[arg(long)]
        expect_return: bool,
    },
    /// List subscribers in dispatch order
    Subscribers {
        /// Only list subscribers of this event
        event: Option<String>,
    },
    /// Settle a set of promises given as ok:<value> or err:<reason>
    Settle {
        #[arg(required = true)]
        outcomes: Vec<String>,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    Ok((key.to_string(), parse_value(value)))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn load_config(path: Option<&Path>) -> KernelResult<(RelayConfig, Option<PathBuf>)> {
    let path = match path {
        Some(explicit) => Some(explicit.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };
    match path {
        Some(path) => Ok((RelayConfig::load(&path)?, Some(path))),
        None => Ok((RelayConfig::default(), None)),
    }
}

fn publish_command(
    app: &Application,
    event_name: &str,
    subject: Option<String>,
    values: Vec<(String, Value)>,
    expect_return: bool,
) -> KernelResult<()> {
    let subject = subject.map(|s| Arc::new(s) as Subject);
    let mut event = Event::new(subject, values.into_iter().collect());
    if expect_return {
        event = event.with_return_slot();
    }

    let event = app.publish_event(event_name, event)?;
    if event.is_propagation_stopped() {
        info!("Propagation of '{}' was stopped", event_name);
    }

    let mut payload = Payload::new();
    payload.insert("event".to_string(), json!(event_name));
    app.publish(LifecycleEvent::Output.name(), None, payload)?;

    println!("{}", render(&event.export())?);
    Ok(())
}

fn subscribers_command(app: &Application, event_name: Option<String>) -> KernelResult<()> {
    let listing = match event_name {
        Some(name) => {
            let records = app.manager().subscribers(&name);
            records.iter().map(|record| cli::describe(&name, record)).collect::<Vec<_>>()
        }
        None => app
            .manager()
            .all_subscribers()
            .iter()
            .flat_map(|(name, records)| records.iter().map(move |record| cli::describe(name, record)))
            .collect(),
    };

    if listing.is_empty() {
        println!("No subscribers registered.");
    }
    for line in listing {
        println!("  - {}", line);
    }
    Ok(())
}

fn settle_command(app: &Application, outcomes: &[String]) -> KernelResult<()> {
    let promises = outcomes
        .iter()
        .map(|outcome| match outcome.split_once(':') {
            Some(("ok", value)) => Ok(Promise::fulfilled_in(app.queue().clone(), parse_value(value))),
            Some(("err", reason)) => Ok(Promise::rejected_in(app.queue().clone(), parse_value(reason))),
            _ => Err(KernelError::from(format!(
                "Invalid outcome '{}': expected ok:<value> or err:<reason>",
                outcome
            ))),
        })
        .collect::<KernelResult<Vec<_>>>()?;

    let settled = promise::settle(promises).wait()?;

    let mut payload = Payload::new();
    payload.insert("event".to_string(), json!("settle"));
    app.publish(LifecycleEvent::Output.name(), None, payload)?;

    println!("{}", render(&settled)?);
    Ok(())
}

fn render(value: &Value) -> KernelResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| KernelError::from(format!("Failed to render output: {}", e)))
}

fn run_command(app: &Application, command: Commands) -> KernelResult<()> {
    match command {
        Commands::Publish {
            event,
            subject,
            values,
            expect_return,
        } => publish_command(app, &event, subject, values, expect_return),
        Commands::Subscribers { event } => subscribers_command(app, event),
        Commands::Settle { outcomes } => settle_command(app, &outcomes),
    }
}

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Handle simple ping command
    if args.ping {
        println!("pong");
        return;
    }

    let (config, config_path) = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Fatal: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config);

    println!("Initializing application...");
    let mut app = Application::with_config(config);

    let console = match cli::ConsoleSubscriber::from_config(app.config()) {
        Ok(console) => console,
        Err(e) => {
            eprintln!("Fatal: Invalid subscriptions in configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = app.manager().add_subscriber_interface(Arc::new(console)) {
        eprintln!("Fatal: Failed to register console subscriber: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = app.run().await {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }

    let mut payload = Payload::new();
    let source = config_path.map(|p| p.display().to_string());
    payload.insert("source".to_string(), json!(source));
    let outcome = app
        .publish(LifecycleEvent::Config.name(), None, payload)
        .and_then(|_| match args.command {
            Some(command) => run_command(&app, command),
            None => {
                println!("No command specified, nothing to publish.");
                Ok(())
            }
        });

    if let Err(e) = &outcome {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
    }

    println!("Shutting down application...");
    if let Err(e) = app.shutdown().await {
        eprintln!("Error during shutdown: {}", e);
        std::process::exit(1);
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
}
