//! CLI Entry Point for rticap
//!
//! Provides command-line access to:
//! - The LED dome (switch off/on, light one LED, step through the rotation)
//! - Light-position file rewrite for an existing image set
//! - A full capture sequence against the simulated rig
//! - The effective settings and the serial ports present
//!
//! # Usage
//!
//! ```bash
//! rticap dome led 12
//! rticap dome cycle --count 64 --dwell-ms 200
//! rticap lp-rewrite --base ref.lp --output lights.lp capture0/*.jpg
//! rticap simulate --rounds 8 --save-dir /tmp/captures
//! rticap simulate --rounds 8 --preview /tmp/preview.jpg
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rticap::adapters::MockAdapter;
use rticap::config::{Settings, DEFAULT_CONFIG_PATH};
use rticap::data::light_positions;
use rticap::experiment::{CaptureSequencer, ProgressHooks, SequenceOptions};
use rticap::hardware::{Illuminator, LedDomeController, ScriptCamera};
use rticap::ptp::{DeviceIdentity, MockPtpTransport, PtpSession};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rticap")]
#[command(about = "Single-light RTI capture on a camera + LED dome rig", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective settings as TOML
    ShowConfig,

    /// List serial ports
    Ports,

    /// Drive the LED dome directly
    Dome {
        #[command(subcommand)]
        action: DomeAction,
    },

    /// Rewrite a reference light-position file for a set of images
    LpRewrite {
        /// Reference light-position file
        #[arg(long)]
        base: PathBuf,

        /// File to write
        #[arg(long)]
        output: PathBuf,

        /// Images, in light order
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// Run a capture sequence against the simulated camera and dome
    Simulate {
        /// Number of captures (1-64); defaults to the settings value
        #[arg(long)]
        rounds: Option<usize>,

        /// Directory for `captureN` folders; defaults to the settings value
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Download after every capture instead of after the rotation
        #[arg(long)]
        no_defer: bool,

        /// Skip the initial autofocus
        #[arg(long)]
        no_autofocus: bool,

        /// Refocus and save a preview image here before the sequence
        #[arg(long)]
        preview: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DomeAction {
    /// Switch every LED off
    Off,
    /// Switch every LED on
    On,
    /// Light exactly one LED (0-63)
    Led {
        /// LED index
        index: usize,
    },
    /// Step through the rotation, one LED at a time
    Cycle {
        /// Number of steps
        #[arg(long, default_value = "64")]
        count: usize,

        /// Time each LED stays lit, in milliseconds
        #[arg(long, default_value = "250")]
        dwell_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::ShowConfig => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Commands::Ports => list_ports(),
        Commands::Dome { action } => drive_dome(&settings, action).await,
        Commands::LpRewrite {
            base,
            output,
            images,
        } => {
            light_positions::rewrite(&base, &images, &output).await?;
            println!("Wrote {} light positions to {}", images.len(), output.display());
            Ok(())
        }
        Commands::Simulate {
            rounds,
            save_dir,
            no_defer,
            no_autofocus,
            preview,
        } => {
            let mut options = SequenceOptions::from_settings(&settings.sequence);
            if let Some(rounds) = rounds {
                options.total_rounds = rounds;
            }
            if let Some(save_dir) = save_dir {
                options.destination_root = save_dir;
            }
            options.defer_download &= !no_defer;
            options.autofocus &= !no_autofocus;
            simulate(&settings, &options, preview.as_deref()).await
        }
    }
}

#[cfg(feature = "instrument_serial")]
fn list_ports() -> Result<()> {
    let ports = rticap::adapters::serial_adapter::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports() -> Result<()> {
    anyhow::bail!("Serial support not enabled; rebuild with --features instrument_serial")
}

#[cfg(feature = "instrument_serial")]
async fn drive_dome(settings: &Settings, action: DomeAction) -> Result<()> {
    info!("Opening dome on {}", settings.dome.port);
    let mut dome = LedDomeController::open_serial(&settings.dome).await?;

    match action {
        DomeAction::Off => dome.all_off().await?,
        DomeAction::On => dome.all_on().await?,
        DomeAction::Led { index } => dome.activate_single(index).await?,
        DomeAction::Cycle { count, dwell_ms } => {
            for _ in 0..count {
                let index = dome.advance().await?;
                println!("LED {}", index);
                tokio::time::sleep(Duration::from_millis(dwell_ms)).await;
            }
            dome.all_off().await?;
        }
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
async fn drive_dome(_settings: &Settings, _action: DomeAction) -> Result<()> {
    anyhow::bail!("Serial support not enabled; rebuild with --features instrument_serial")
}

async fn simulate(
    settings: &Settings,
    options: &SequenceOptions,
    preview: Option<&Path>,
) -> Result<()> {
    info!("Simulating {}-round sequence", options.total_rounds);

    let dome = LedDomeController::new(MockAdapter::new(), Duration::ZERO).await;
    let identity = DeviceIdentity {
        vendor_extension_id: 0x0B,
        model: "Simulated camera".to_string(),
        serial_number: "SIM-0001".to_string(),
    };
    let session = PtpSession::new(MockPtpTransport::new(), 1);
    let camera = ScriptCamera::new(session, identity, &settings.camera);

    let mut sequencer = CaptureSequencer::new(dome, camera);
    if let Some(destination) = preview {
        sequencer.refocus().await?;
        sequencer.preview(destination).await?;
        println!("Preview saved to {}", destination.display());
    }

    let mut hooks = ProgressHooks::none()
        .on_capture(|current, total| println!("Captured {}/{}", current, total))
        .on_download(|current, total, path| {
            println!("Saved {}/{}: {}", current, total, path.display())
        });

    let report = sequencer.run_sequence(options, &mut hooks).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
