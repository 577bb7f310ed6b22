// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tethercam::{CameraBackendType, Config};

mod cli;

#[derive(Parser)]
#[command(name = "tethercam")]
#[command(about = "Tethered camera control: capture, live view and exposure settings")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Use the network camera at HOST instead of a tethered one
    #[arg(long, global = true, value_name = "HOST")]
    remote: Option<String>,

    /// Number of virtual tethered cameras to attach
    #[arg(long, global = true, default_value = "1")]
    virtual_cameras: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default)]
struct ExposureOpts {
    /// ISO sensitivity (0 = auto)
    #[arg(long)]
    iso: Option<u32>,

    /// Aperture f-number (e.g. 5.6)
    #[arg(long)]
    aperture: Option<f32>,

    /// Shutter speed (e.g. 1/125, 0.5, 30")
    #[arg(long, value_parser = cli::parse_shutter_speed)]
    shutter: Option<f32>,
}

impl From<ExposureOpts> for cli::ExposureArgs {
    fn from(opts: ExposureOpts) -> Self {
        Self {
            iso: opts.iso,
            aperture: opts.aperture,
            shutter_speed: opts.shutter,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Camera index to use (from 'tethercam list')
        #[arg(short, long)]
        camera: Option<usize>,

        /// Output file or directory (default: ~/Pictures/tethercam/)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        exposure: ExposureOpts,
    },

    /// Stream live view
    LiveView {
        /// Camera index to use (from 'tethercam list')
        #[arg(short, long)]
        camera: Option<usize>,

        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Save the last frame to this file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show exposure settings and the values the camera accepts
    Options {
        /// Camera index to use (from 'tethercam list')
        #[arg(short, long)]
        camera: Option<usize>,

        #[command(flatten)]
        exposure: ExposureOpts,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=tethercam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load();
    if let Some(host) = cli.remote {
        config.backend = CameraBackendType::Remote;
        config.remote_host = Some(host);
    }
    let virtual_cameras = cli.virtual_cameras;

    match cli.command {
        Commands::List => cli::list_cameras(&config, virtual_cameras),
        Commands::Photo {
            camera,
            output,
            exposure,
        } => {
            config.device_index = camera.unwrap_or(config.device_index);
            cli::take_photo(&config, virtual_cameras, exposure.into(), output)
        }
        Commands::LiveView {
            camera,
            duration,
            output,
        } => {
            config.device_index = camera.unwrap_or(config.device_index);
            cli::live_view(&config, virtual_cameras, duration, output)
        }
        Commands::Options { camera, exposure } => {
            config.device_index = camera.unwrap_or(config.device_index);
            cli::show_options(&config, virtual_cameras, exposure.into())
        }
    }
}
