use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::fs;

use crate::config::{
    self, ColorOrder, Config, PayloadFormat, UploadMode,
};
use crate::encode;
use crate::prepare::{self, PanelTarget, RotationPolicy};
use crate::sjpg::SjpgContainer;
use crate::transfer::TransferClient;

#[derive(Parser, Debug)]
#[command(name = "stripcast", about = "Prepare and upload images to SJPG panel devices")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./stripcast.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare an image and upload it to the device
    Show(ShowArgs),
    /// Convert an image to an SJPG file on disk
    Convert(ConvertArgs),
    /// Print the geometry and strip table of an SJPG file
    Inspect(InspectArgs),
    /// Tell the device to drop the currently displayed image
    Dismiss(DismissArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Image file: .jpg/.jpeg/.png to prepare, or a pre-built .sjpg
    pub image: PathBuf,

    /// Device IP address or hostname (may come from the config file instead)
    pub host: Option<String>,

    /// Upload protocol
    #[arg(long, value_enum)]
    pub mode: UploadMode,

    /// Payload for single mode (strip mode always uses sjpg strips)
    #[arg(long, value_enum, default_value = "sjpg")]
    pub format: PayloadFormat,

    /// Seconds the device shows the image; 0 means indefinitely
    #[arg(long)]
    pub timeout: Option<u64>,

    /// First strip to upload (debug aid, strip mode only)
    #[arg(long)]
    pub start: Option<usize>,

    /// Last strip to upload (debug aid, strip mode only)
    #[arg(long)]
    pub end: Option<usize>,

    #[command(flatten)]
    pub prep: PrepArgs,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Image file to convert (.jpg/.jpeg/.png)
    pub image: PathBuf,

    /// Output .sjpg path
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    #[command(flatten)]
    pub prep: PrepArgs,
}

/// Preparation knobs shared by `show` and `convert`. Flags override the
/// config file, which overrides the built-in defaults.
#[derive(Args, Debug, Default)]
pub struct PrepArgs {
    /// Panel width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Panel height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Rotation: auto, none, or 0/90/180/270 degrees
    #[arg(long)]
    pub rotate: Option<String>,

    /// Strip height in pixels
    #[arg(long)]
    pub strip_height: Option<u16>,

    /// JPEG quality (1-100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// Keep RGB channel order (for panels that do not scan out BGR)
    #[arg(long)]
    pub no_bgr_swap: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// SJPG file to inspect
    pub file: PathBuf,

    /// Emit a machine-readable JSON summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DismissArgs {
    /// Device IP address or hostname (may come from the config file instead)
    pub host: Option<String>,
}

/// Fully resolved preparation parameters, passed explicitly into the
/// pipeline so nothing depends on ambient state.
struct PrepOptions {
    target: PanelTarget,
    rotation: RotationPolicy,
    color_order: ColorOrder,
    strip_height: u16,
    quality: u8,
}

fn resolve_prep(cfg: &Config, args: &PrepArgs, default_strip_height: u16) -> Result<PrepOptions> {
    let panel = cfg.panel.as_ref();
    let conv = cfg.conversion.as_ref();
    let width = args
        .width
        .or(panel.and_then(|p| p.width))
        .unwrap_or(config::DEFAULT_PANEL_WIDTH);
    let height = args
        .height
        .or(panel.and_then(|p| p.height))
        .unwrap_or(config::DEFAULT_PANEL_HEIGHT);
    let rotation = match args
        .rotate
        .as_deref()
        .or(conv.and_then(|c| c.rotation.as_deref()))
    {
        Some(s) => s.parse::<RotationPolicy>()?,
        None => RotationPolicy::Auto,
    };
    let color_order = if args.no_bgr_swap {
        ColorOrder::Rgb
    } else {
        panel.and_then(|p| p.color_order).unwrap_or_default()
    };
    Ok(PrepOptions {
        target: PanelTarget::new(width, height)?,
        rotation,
        color_order,
        strip_height: args
            .strip_height
            .or(conv.and_then(|c| c.strip_height))
            .unwrap_or(default_strip_height),
        quality: args
            .quality
            .or(conv.and_then(|c| c.quality))
            .unwrap_or(config::DEFAULT_JPEG_QUALITY),
    })
}

fn resolve_host(cfg: &Config, host: Option<String>) -> Result<String> {
    host.or_else(|| cfg.device.as_ref().and_then(|d| d.host.clone()))
        .context("no device host given (positional argument or [device].host in the config)")
}

fn request_timeout(cfg: &Config) -> Duration {
    let secs = cfg
        .device
        .as_ref()
        .and_then(|d| d.request_timeout_secs)
        .unwrap_or(config::DEFAULT_REQUEST_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn is_sjpg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sjpg"))
}

/// Prepare source bytes and cut them into an in-memory SJPG container.
fn build_container(source: &[u8], opts: &PrepOptions) -> Result<SjpgContainer> {
    let prepared = prepare::prepare(source, opts.target, opts.rotation, opts.color_order)?;
    let strips = encode::split_and_encode(&prepared.to_image()?, opts.strip_height, opts.quality)?;
    let container = SjpgContainer::from_encoded_strips(
        prepared.width,
        prepared.height,
        opts.strip_height,
        strips,
    )?;
    Ok(container)
}

pub async fn run(cli: Cli, cfg: Config) -> Result<()> {
    match cli.command {
        Command::Show(args) => show(&cfg, args).await,
        Command::Convert(args) => convert(&cfg, args).await,
        Command::Inspect(args) => inspect(args).await,
        Command::Dismiss(args) => dismiss(&cfg, args).await,
    }
}

async fn show(cfg: &Config, args: ShowArgs) -> Result<()> {
    let host = resolve_host(cfg, args.host)?;
    let display_timeout = args
        .timeout
        .unwrap_or(config::DEFAULT_DISPLAY_TIMEOUT_SECS);
    let bytes = fs::read(&args.image)
        .await
        .with_context(|| format!("reading {}", args.image.display()))?;
    let client = TransferClient::new(&host, request_timeout(cfg));

    match args.mode {
        UploadMode::Single => {
            if args.start.is_some() || args.end.is_some() {
                bail!("--start/--end only apply to strip mode");
            }
            let (payload, filename, content_type) = if is_sjpg(&args.image) {
                (bytes, "image.sjpg", "application/octet-stream")
            } else {
                match args.format {
                    PayloadFormat::Jpeg => {
                        let opts = resolve_prep(
                            cfg,
                            &args.prep,
                            config::DEFAULT_STRIP_HEIGHT_SINGLE,
                        )?;
                        let prepared = prepare::prepare(
                            &bytes,
                            opts.target,
                            opts.rotation,
                            opts.color_order,
                        )?;
                        let jpeg = encode::encode_jpeg(&prepared.to_image()?, opts.quality)?;
                        (jpeg, "image.jpg", "image/jpeg")
                    }
                    PayloadFormat::Sjpg => {
                        let opts = resolve_prep(
                            cfg,
                            &args.prep,
                            config::DEFAULT_STRIP_HEIGHT_SINGLE,
                        )?;
                        let container = build_container(&bytes, &opts)?;
                        (container.to_bytes()?, "image.sjpg", "application/octet-stream")
                    }
                }
            };
            client
                .send_single(payload, filename, content_type, display_timeout)
                .await?;
        }
        UploadMode::Strip => {
            let container = if is_sjpg(&args.image) {
                SjpgContainer::from_bytes(&bytes)?
            } else {
                let opts = resolve_prep(cfg, &args.prep, config::DEFAULT_STRIP_HEIGHT_STRIP)?;
                build_container(&bytes, &opts)?
            };
            let range = match (args.start, args.end) {
                (None, None) => None,
                (s, e) => Some((
                    s.unwrap_or(0),
                    e.unwrap_or_else(|| container.strip_count().saturating_sub(1)),
                )),
            };
            client
                .send_strips(&container, display_timeout, range)
                .await?;
        }
    }
    tracing::info!(host = %host, "upload complete");
    Ok(())
}

async fn convert(cfg: &Config, args: ConvertArgs) -> Result<()> {
    if is_sjpg(&args.image) {
        bail!("{} is already an sjpg file", args.image.display());
    }
    let bytes = fs::read(&args.image)
        .await
        .with_context(|| format!("reading {}", args.image.display()))?;
    let opts = resolve_prep(cfg, &args.prep, config::DEFAULT_STRIP_HEIGHT_STRIP)?;
    let container = build_container(&bytes, &opts)?;
    let out = container.to_bytes()?;
    fs::write(&args.output, &out)
        .await
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(
        path = %args.output.display(),
        strips = container.strip_count(),
        bytes = out.len(),
        "sjpg written"
    );
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    width: u16,
    height: u16,
    strip_height: u16,
    strip_count: usize,
    data_bytes: usize,
    strip_sizes: Vec<usize>,
}

async fn inspect(args: InspectArgs) -> Result<()> {
    let bytes = fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let container = SjpgContainer::from_bytes(&bytes)?;
    let report = InspectReport {
        width: container.width,
        height: container.height,
        strip_height: container.strip_height,
        strip_count: container.strip_count(),
        data_bytes: container.data_len(),
        strip_sizes: container.strips.iter().map(Vec::len).collect(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}x{} pixels, {} strips of {}px ({} payload bytes)",
            report.width,
            report.height,
            report.strip_count,
            report.strip_height,
            report.data_bytes
        );
        for (i, size) in report.strip_sizes.iter().enumerate() {
            println!("  strip {i}: {size} bytes");
        }
    }
    Ok(())
}

async fn dismiss(cfg: &Config, args: DismissArgs) -> Result<()> {
    let host = resolve_host(cfg, args.host)?;
    let client = TransferClient::new(&host, request_timeout(cfg));
    client.dismiss().await?;
    tracing::info!(host = %host, "image dismissed");
    Ok(())
}
