//! # CiA-402 Master Binary
//!
//! Brings up a network of CiA-402 drives described by a master TOML file.
//! The CANopen stack is simulated; every node emulates a drive.
//!
//! # Usage
//!
//! ```bash
//! # Bring the network up and stop once every drive is IDLE
//! cia402_master --config config/master.toml
//!
//! # Override the communication scheme and run a homing + move demo
//! cia402_master --config config/master.toml --scheme master-object --demo
//!
//! # Verbose JSON logs
//! cia402_master --config config/master.toml -v --json
//! ```

#![deny(warnings)]

use cia402_common::config::CommunicationScheme;
use cia402_master::MasterCore;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// CiA-402 Master - configures and drives CANopen servo axes
#[derive(Parser, Debug)]
#[command(name = "cia402_master")]
#[command(version)]
#[command(about = "CANopen master for CiA-402 drives")]
#[command(long_about = None)]
struct Args {
    /// Path to the master configuration (master.toml)
    #[arg(short, long, default_value = "config/master.toml")]
    config: PathBuf,

    /// Override the communication scheme of the configuration
    #[arg(long, value_enum)]
    scheme: Option<Scheme>,

    /// Home and move every standalone or leader axis after start-up
    #[arg(long)]
    demo: bool,

    /// Demo target position
    #[arg(long, default_value_t = 10_000, allow_hyphen_values = true)]
    target: i32,

    /// Time allowed for all nodes to boot, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    boot_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scheme {
    Sdo,
    MappedTpdo,
    MasterObject,
}

impl From<Scheme> for CommunicationScheme {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Sdo => Self::Sdo,
            Scheme::MappedTpdo => Self::MappedTpdo,
            Scheme::MasterObject => Self::MasterObject,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Master failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match MasterCore::load_config(&args.config) {
        Ok(config) => {
            setup_tracing(&args, config.shared.log_level.as_directive());
            config
        }
        Err(e) => {
            setup_tracing(&args, "info");
            return Err(e.into());
        }
    };

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    if let Some(scheme) = args.scheme {
        info!("Communication scheme from CLI: {:?}", scheme);
        config.communication = scheme.into();
    }

    let core = MasterCore::new(config)?;
    core.start(Duration::from_millis(args.boot_timeout_ms)).await?;

    if args.demo {
        core.run_demo(args.target).await?;
    }

    core.shutdown();
    info!("Master shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, default_directive: &str) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
