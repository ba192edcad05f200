// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! LED Remote command line application

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use led_remote::bluetooth::{
    BatterySource, CentralState, FixedBattery, GattClient, GattServer, LedCommand, SysfsBattery,
};
use led_remote::config::{CentralConfig, Config, PeripheralConfig};
use led_remote::events::{CentralEvent, ChannelCallback, EventProcessor, PeripheralEvent};
use led_remote::state::AppState;

#[derive(Parser)]
#[command(name = "led-remote")]
#[command(about = "Bluetooth LE remote control for an LED", version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the LED and advertise it
    Peripheral {
        /// Advertised name
        #[arg(short, long)]
        name: Option<String>,
        /// Report a fixed battery level instead of the system battery
        #[arg(short, long)]
        battery: Option<u8>,
    },
    /// Scan for the LED and control it from stdin
    Central {
        /// Advertised name of the LED peripheral
        #[arg(short, long)]
        peer_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("led_remote=info".parse()?),
        )
        .init();

    info!("Starting LED Remote v{}...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded");

    match cli.command {
        Commands::Peripheral { name, battery } => {
            if let Some(name) = name {
                config.peripheral.advertised_name = name;
            }
            let battery: Arc<dyn BatterySource> = match battery {
                Some(level) => Arc::new(FixedBattery(level)),
                None => Arc::new(SysfsBattery::default()),
            };
            run_peripheral(&config.peripheral, battery).await?;
        }
        Commands::Central { peer_name } => {
            if let Some(peer_name) = peer_name {
                config.central.peer_name = peer_name;
            }
            run_central(&config.central).await?;
        }
    }

    info!("LED Remote stopped");
    Ok(())
}

async fn run_peripheral(config: &PeripheralConfig, battery: Arc<dyn BatterySource>) -> Result<()> {
    let state = AppState::new();
    let processor = EventProcessor::new(state.clone());
    let (callback, mut events) = ChannelCallback::<PeripheralEvent>::new();

    let mut server = GattServer::new(config, callback, battery).await?;
    server.start().await?;
    info!(
        "LED peripheral '{}' running on {}",
        config.advertised_name,
        server.address().await?
    );

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                processor.process_peripheral(event);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    server.stop().await;
    Ok(())
}

async fn run_central(config: &CentralConfig) -> Result<()> {
    let state = AppState::new();
    let (callback, mut events) = ChannelCallback::<CentralEvent>::new();
    let client = GattClient::new(config, callback).await?;
    let processor = EventProcessor::with_central(state.clone(), client.session().clone());

    start_scan(&client, config);
    println!("Commands: on, off, scan, stop, disconnect, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                processor.process_central(event);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                if let Some(command) = LedCommand::parse(input) {
                    if let Err(e) = client.send_command(command).await {
                        error!("Failed to send command: {}", e);
                    }
                    continue;
                }

                match input {
                    "scan" => start_scan(&client, config),
                    "stop" => client.stop_scan(),
                    "disconnect" => {
                        if let Err(e) = client.disconnect().await {
                            warn!("Disconnect failed: {}", e);
                        }
                    }
                    "status" => println!("{}", state.summary()),
                    "quit" | "exit" => break,
                    other => warn!("Unknown command: {}", other),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    client.stop_scan();
    if client.session().peer().is_some() {
        if let Err(e) = client.disconnect().await {
            warn!("Disconnect on shutdown failed: {}", e);
        }
    }
    Ok(())
}

/// Start scanning, giving up after the configured timeout.
fn start_scan(client: &Arc<GattClient>, config: &CentralConfig) {
    let client = client.clone();
    let timeout = config.scan_timeout();

    tokio::spawn(async move {
        if let Err(e) = client.start_scan().await {
            error!("Failed to start scan: {}", e);
            return;
        }

        if let Some(timeout) = timeout {
            tokio::time::sleep(timeout).await;
            if client.session().state() == CentralState::Scanning {
                warn!("No '{}' found within {:?}", client.session().expected_name(), timeout);
                client.stop_scan();
            }
        }
    });
}
