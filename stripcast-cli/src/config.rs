use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::fs;
use toml_edit::DocumentMut;

/// Default on-disk config filename, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "stripcast.toml";

/// Raw panel coordinates of the reference device.
pub const DEFAULT_PANEL_WIDTH: u32 = 240;
pub const DEFAULT_PANEL_HEIGHT: u32 = 280;

/// Quality used when re-encoding strips as baseline JPEG.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// How long the device shows the image before reverting, in seconds.
pub const DEFAULT_DISPLAY_TIMEOUT_SECS: u64 = 10;

/// Client-side deadline for each HTTP request to the device.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// The LVGL single-file decode path misbehaves with strips taller than 16px,
/// so single mode defaults lower than strip mode.
pub const DEFAULT_STRIP_HEIGHT_SINGLE: u16 = 16;
pub const DEFAULT_STRIP_HEIGHT_STRIP: u16 = 32;

/// Strongly typed representation of the configuration file. Every field is
/// optional; resolution against CLI flags and built-in defaults happens once
/// at startup, and only the resolved values flow into the pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub device: Option<Device>,
    pub panel: Option<Panel>,
    pub conversion: Option<Conversion>,
    pub logging: Option<Logging>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Device {
    pub host: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Panel {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub color_order: Option<ColorOrder>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Conversion {
    pub strip_height: Option<u16>,
    pub quality: Option<u8>,
    /// `auto`, `none`, or an explicit degree value (`0`/`90`/`180`/`270`).
    pub rotation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    pub filter: Option<String>,
}

/// Channel order the panel expects in decoded pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    Rgb,
    /// Most of the supported panels scan out BGR; the preparer pre-swaps
    /// channels so the device-side decode lands in the right order.
    #[default]
    Bgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// One multipart POST carrying the whole payload.
    Single,
    /// Sequential raw-body POSTs, one per strip.
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Plain baseline JPEG of the whole prepared image.
    Jpeg,
    /// SJPG container of independently decodable strips.
    Sjpg,
}

/// Load the config file. An explicitly given path must exist; the default
/// path is optional and silently falls back to `Config::default()`.
pub async fn load(path: Option<PathBuf>) -> Result<Config> {
    let (path, required) = match path {
        Some(p) => (p, true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    if !path.exists() {
        if required {
            bail!("config file {} not found", path.display());
        }
        return Ok(Config::default());
    }
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn parse(text: &str) -> Result<Config> {
    let doc = text.parse::<DocumentMut>()?;
    let typed: Config = toml_edit::de::from_document(doc)?;
    Ok(typed)
}
