//! Pump Reader Control Tool
//!
//! CLI for querying and controlling the Pump Reader daemon over its
//! JSON API.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pumpreader_client::DaemonClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pumpreaderctl")]
#[command(about = "Control tool for the Pump Reader daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Daemon base URL
    #[arg(long, default_value = "http://127.0.0.1:8686")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current gauge pressures
    Pressures,
    /// Show per-device status strings
    Status,
    /// Show the pyrometer temperature snapshot
    Temperature,
    /// Rangefinder laser commands
    Laser {
        #[command(subcommand)]
        action: LaserCommands,
    },
    /// Zero the running maximum temperature
    ResetMax,
}

#[derive(Subcommand)]
enum LaserCommands {
    /// Switch the laser on (auto-off after 60 seconds)
    On,
    /// Switch the laser off
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = DaemonClient::new(&cli.url);

    match cli.command {
        Commands::Pressures => {
            for reading in client.pressures().await? {
                println!("{}: {} {}", reading.pump, reading.pressure, reading.units);
            }
        }
        Commands::Status => {
            for device in client.status().await? {
                println!("{}: {} ({})", device.name, device.status, device.units);
            }
        }
        Commands::Temperature => {
            let snapshot = client.temperature().await?;
            println!("Temperature: {}", snapshot.temperature);
            println!("Laser: {}", if snapshot.laser { "on" } else { "off" });
            println!("Maximum: {}", snapshot.max_temperature);
        }
        Commands::Laser { action } => match action {
            LaserCommands::On => {
                client.laser_on().await?;
                println!("Laser on");
            }
            LaserCommands::Off => {
                client.laser_off().await?;
                println!("Laser off");
            }
        },
        Commands::ResetMax => {
            client.reset_max().await?;
            println!("Maximum temperature reset");
        }
    }

    Ok(())
}
