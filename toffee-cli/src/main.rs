// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Command line front end for the Toffee display module

mod config;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use config::{Config, LoggingConfig};
use log::{info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use toffee_module::{
    dump_all_files, push_image, raw_to_png, save_records, BulkChannel, ControlDriver, DeviceInfo,
    FileRecord, FilesystemClient, HidReportTransport, LightingClient, Response, DISPLAY_HEIGHT,
    DISPLAY_WIDTH, STATIC_IMAGE_EXTENSION,
};

#[derive(Parser, Debug)]
#[command(name = "toffee")]
#[command(author, version, about = "Manage files and lighting of a Toffee display module")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// USB vendor id, decimal or 0x-prefixed hex
    #[arg(long, value_name = "ID", value_parser = parse_usb_id, global = true)]
    vendor_id: Option<u16>,

    /// USB product id, decimal or 0x-prefixed hex
    #[arg(long, value_name = "ID", value_parser = parse_usb_id, global = true)]
    product_id: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files in the module's current directory
    Ls,
    /// Download every file stored on the module
    Dump {
        /// Target directory (defaults to `output_dir` from the config)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
        /// Also write a PNG preview next to every still image
        #[arg(long)]
        png: bool,
    },
    /// Encode an image and store it on the module
    Push {
        image: PathBuf,
        /// Name on the module (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },
    /// Read or change the lighting
    Lighting {
        #[command(subcommand)]
        action: LightingCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LightingCommand {
    /// Print the current lighting state
    Get {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more lighting parameters
    Set {
        #[arg(long)]
        effect: Option<u8>,
        #[arg(long)]
        speed: Option<u8>,
        #[arg(long)]
        brightness: Option<u8>,
        #[arg(long, requires = "saturation")]
        hue: Option<u8>,
        #[arg(long, requires = "hue")]
        saturation: Option<u8>,
    },
}

fn parse_usb_id(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid USB id '{}': {}", value, e))
}

fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&logging.level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }

    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(args.verbose, &config.logging);

    info!("toffee v{}", env!("CARGO_PKG_VERSION"));
    let device = config.device_info(args.vendor_id, args.product_id)?;

    match args.command {
        Command::Ls => list(&config, device).await,
        Command::Dump { out, png } => {
            let out = out.unwrap_or_else(|| config.output_dir.clone());
            dump(&config, device, &out, png).await
        }
        Command::Push { image, name } => push(&config, device, &image, name).await,
        Command::Lighting { action } => lighting(&config, device, action).await,
    }
}

async fn open_control(config: &Config, device: DeviceInfo) -> Result<ControlDriver<HidReportTransport>> {
    let driver = ControlDriver::hid(device, &config.timings);
    driver
        .open()
        .await
        .context("Failed to open the module's report channel")?;
    Ok(driver)
}

async fn open_bulk(config: &Config, device: DeviceInfo) -> Result<BulkChannel> {
    let bulk = BulkChannel::serial(config.timings);
    if !bulk.connect(device.vendor_id, device.product_id).await {
        bail!(
            "No serial port found for {:04x}:{:04x}",
            device.vendor_id,
            device.product_id
        );
    }
    Ok(bulk)
}

async fn list(config: &Config, device: DeviceInfo) -> Result<()> {
    let driver = open_control(config, device).await?;
    let fs = FilesystemClient::new(&driver, &config.timings);

    let entries = fs.ls().await;
    driver.close().await;

    for entry in entries? {
        println!("{}", entry);
    }
    Ok(())
}

/// PNG preview record for a still image, if the payload is one
fn png_preview(record: &FileRecord) -> Option<FileRecord> {
    let stem = record
        .filename
        .strip_suffix(&format!(".{}", STATIC_IMAGE_EXTENSION))?;

    match raw_to_png(&record.data, DISPLAY_WIDTH, DISPLAY_HEIGHT) {
        Ok(png) => Some(FileRecord::new(format!("{}.png", stem), png)),
        Err(e) => {
            warn!("No preview for {}: {}", record.filename, e);
            None
        }
    }
}

async fn dump(config: &Config, device: DeviceInfo, out: &Path, png: bool) -> Result<()> {
    let driver = open_control(config, device).await?;
    let bulk = open_bulk(config, device).await?;
    let fs = FilesystemClient::new(&driver, &config.timings);

    let result = dump_all_files(&fs, &bulk).await;
    bulk.disconnect().await;
    driver.close().await;

    let mut records = result?;
    if png {
        let previews: Vec<FileRecord> = records.iter().filter_map(png_preview).collect();
        records.extend(previews);
    }

    for path in save_records(out, &records).await? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn push(config: &Config, device: DeviceInfo, image: &Path, name: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image: {:?}", image))?;
    let base = match name {
        Some(name) => name,
        None => image
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let bulk = open_bulk(config, device).await?;
    let result = push_image(&bulk, &base, &bytes).await;
    bulk.disconnect().await;

    println!("Stored as {}", result?);
    Ok(())
}

fn report(what: &str, response: Response) {
    if response.status.is_success() {
        info!("{} applied", what);
    } else {
        warn!("{} rejected with {}", what, response.status);
    }
}

async fn lighting(config: &Config, device: DeviceInfo, action: LightingCommand) -> Result<()> {
    let driver = open_control(config, device).await?;
    let result = run_lighting(&driver, action).await;
    driver.close().await;
    result
}

async fn run_lighting(
    driver: &ControlDriver<HidReportTransport>,
    action: LightingCommand,
) -> Result<()> {
    let client = LightingClient::new(driver);

    match action {
        LightingCommand::Get { json } => {
            let state = client.get_lighting_state().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{}", state);
            }
        }
        LightingCommand::Set {
            effect,
            speed,
            brightness,
            hue,
            saturation,
        } => {
            if let Some(effect) = effect {
                report("Effect", client.set_animation(effect).await?);
            }
            if let Some(speed) = speed {
                report("Speed", client.set_speed(speed).await?);
            }
            if let Some(brightness) = brightness {
                report("Brightness", client.set_brightness(brightness).await?);
            }
            if let (Some(hue), Some(saturation)) = (hue, saturation) {
                report("Color", client.set_color(hue, saturation).await?);
            }
        }
    }
    Ok(())
}
