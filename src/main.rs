//! ridelink - drive a ride status session from the terminal
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};

use ridelink_app::{default_config_path, init_settings_file, load_settings, RideContext};
use ridelink_core::{RideLeg, Role};
use ridelink_socket::{EnvToken, StaticToken, TokenProvider};

/// ridelink - real-time ride status over a WebSocket session
#[derive(Parser, Debug)]
#[command(name = "ridelink")]
#[command(about = "Follow and advance a ride over its status socket", long_about = None)]
struct Args {
    /// Ride to follow
    #[arg(long, required_unless_present = "init_config")]
    ride: Option<String>,

    /// Giver or taker id of this participant
    #[arg(long, required_unless_present = "init_config")]
    participant: Option<String>,

    /// giver | taker
    #[arg(long, default_value = "giver")]
    role: String,

    /// pick | drop
    #[arg(long, default_value = "pick")]
    leg: String,

    /// Settings file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bearer token (falls back to RIDELINK_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Write a default settings file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    ridelink_core::logging::init()?;

    let config_path = args.config.or_else(default_config_path);

    if args.init_config {
        let path = config_path.ok_or_else(|| eyre!("no config directory on this platform"))?;
        init_settings_file(&path)?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    let settings = config_path
        .as_deref()
        .map(load_settings)
        .unwrap_or_default();

    let ride = RideContext {
        ride_id: args.ride.ok_or_else(|| eyre!("--ride is required"))?,
        participant_id: args
            .participant
            .ok_or_else(|| eyre!("--participant is required"))?,
        role: args.role.parse::<Role>()?,
        leg: args.leg.parse::<RideLeg>()?,
    };

    let tokens: Arc<dyn TokenProvider> = match args.token {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => Arc::new(EnvToken),
    };

    ridelink::run_headless(ride, settings, tokens).await?;
    Ok(())
}
