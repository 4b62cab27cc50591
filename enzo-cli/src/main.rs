//! enzo: command-line client.
//!
//! ```text
//! enzo emit <key> <data>          Send one request and print the reply
//! enzo emit --json <key> <data>   Send JSON, pretty-print a JSON reply
//! enzo listen <key>...            Print pushes for the keys, answering "ok"
//! enzo --config <path>            Load a custom config TOML
//! enzo --address <uri>            Override the configured address
//! enzo --gen-config               Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use enzo_core::{Client, LifecycleEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use enzo_cli::commands;
use enzo_cli::config::EnzoConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "enzo", version, about = "Client for enzo protocol endpoints")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "enzo.toml")]
    config: PathBuf,

    /// Endpoint address, overriding the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the reply.
    Emit {
        key: String,
        data: String,
        /// Send without a deadline.
        #[arg(long)]
        long_running: bool,
        /// Treat data and reply as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print pushes for the given keys until interrupted.
    Listen {
        #[arg(required = true)]
        keys: Vec<String>,
        /// Pretty-print JSON pushes.
        #[arg(long)]
        json: bool,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", EnzoConfig::default_toml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("nothing to do; see `enzo --help`");
        std::process::exit(2);
    };

    let config = EnzoConfig::load(&cli.config).with_address(cli.address);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("enzo v{}", env!("CARGO_PKG_VERSION"));
    info!("address: {}", config.client.address);

    let client = Client::new(config.client);
    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LifecycleEvent::Closed { reason } => warn!("connection closed: {reason}"),
                LifecycleEvent::Reconnecting { attempt, delay } => {
                    info!("reconnecting (attempt {attempt}) in {delay:?}")
                }
                LifecycleEvent::Connected => info!("connected"),
                LifecycleEvent::MalformedFrame { reason } => warn!("dropped frame: {reason}"),
            }
        }
    });

    client.connect().await?;

    match command {
        Command::Emit {
            key,
            data,
            long_running,
            json,
        } => {
            let reply = commands::emit(&client, &key, &data, long_running, json).await?;
            println!("{reply}");
        }
        Command::Listen { keys, json } => {
            let mut pushes = commands::listen(&client, &keys, json);
            loop {
                tokio::select! {
                    Some(push) = pushes.recv() => println!("[{}] {}", push.key, push.text),
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl-C received, shutting down");
                        break;
                    }
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
