//! Configuration and execution flags.
//!
//! Settings come from an optional `config.toml`, merged on top of the stock
//! defaults, then narrowed into [`Flags`], the runtime view the pipeline
//! consumes. Command-line flags override individual values after loading.
//!
//! ## Config File Location
//!
//! By default the file is looked up in the platform config directory
//! (`~/.config/cellframe/config.toml` on Linux). `--config` points elsewhere.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output = "x11"            # x11 | wayland | chafa | kitty | sixel | iterm2
//! no_cache = false          # never read or write resized bitmaps
//! origin_center = false     # center images on their anchor cell
//! use_opengl = false        # flip buffers for bottom-up compositors
//!
//! [scaling]
//! scale_factor = 1          # cell alignment multiple (HiDPI scale)
//! needs_scaling = false     # round sizes up to the scale factor
//!
//! [cache]
//! # directory = "/tmp/cellframe"   # default: platform cache dir
//!
//! [processing]
//! # max_threads = 4         # omit for all cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Terminal graphics output the prepared buffer is destined for.
///
/// The set is closed; each variant has a fixed row in the channel
/// adaptation table of [`normalize`](crate::imaging::normalize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    /// Native X11 child window.
    #[default]
    X11,
    /// Wayland layer surface fed by an external helper.
    Wayland,
    /// Chafa symbol rendering.
    Chafa,
    /// Kitty graphics protocol.
    Kitty,
    /// DEC sixel graphics.
    Sixel,
    /// iTerm2 inline images.
    Iterm2,
}

impl Output {
    pub const ALL: [Output; 6] = [
        Output::X11,
        Output::Wayland,
        Output::Chafa,
        Output::Kitty,
        Output::Sixel,
        Output::Iterm2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Output::X11 => "x11",
            Output::Wayland => "wayland",
            Output::Chafa => "chafa",
            Output::Kitty => "kitty",
            Output::Sixel => "sixel",
            Output::Iterm2 => "iterm2",
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Output {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Output::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = Output::ALL.iter().map(|o| o.as_str()).collect();
                ConfigError::Validation(format!(
                    "unknown output '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Execution flags consumed by the image pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    pub output: Output,
    /// Cell alignment multiple. Always at least 1.
    pub scale_factor: u32,
    pub no_cache: bool,
    pub origin_center: bool,
    pub needs_scaling: bool,
    pub use_opengl: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Config::default().flags()
    }
}

/// Settings loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output protocol the buffers are prepared for.
    pub output: Output,
    /// Disable reading and writing the resize cache.
    pub no_cache: bool,
    /// Center images on their anchor instead of anchoring top-left.
    pub origin_center: bool,
    /// Flip buffers vertically for bottom-up compositors.
    pub use_opengl: bool,
    /// Cell alignment settings.
    pub scaling: ScalingConfig,
    /// Resize cache location.
    pub cache: CacheConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: Output::default(),
            no_cache: false,
            origin_center: false,
            use_opengl: false,
            scaling: ScalingConfig::default(),
            cache: CacheConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scaling.scale_factor == 0 {
            return Err(ConfigError::Validation(
                "scaling.scale_factor must be at least 1".into(),
            ));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Runtime flags for the image pipeline.
    pub fn flags(&self) -> Flags {
        Flags {
            output: self.output,
            scale_factor: self.scaling.scale_factor.max(1),
            no_cache: self.no_cache,
            origin_center: self.origin_center,
            needs_scaling: self.scaling.needs_scaling,
            use_opengl: self.use_opengl,
        }
    }
}

/// Cell alignment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScalingConfig {
    /// Multiple that resized dimensions are rounded up to.
    pub scale_factor: u32,
    /// Whether sizes must be rounded to `scale_factor` at all.
    pub needs_scaling: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1,
            needs_scaling: false,
        }
    }
}

/// Resize cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory holding resized bitmaps. When absent the platform cache
    /// directory is used.
    pub directory: Option<PathBuf>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of rayon worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Default location of the user config file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "cellframe")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(Config::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or from the default location when `None`.
///
/// A missing file yields the stock defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = match path {
        Some(p) => load_raw_config(p)?,
        None => match default_config_path() {
            Some(p) => load_raw_config(&p)?,
            None => None,
        },
    };
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# cellframe configuration
# =======================
#
# Every key is optional. Values shown are the defaults.

# Terminal graphics output the images are prepared for.
# One of: x11, wayland, chafa, kitty, sixel, iterm2
output = "x11"

# Skip the resize cache entirely (no lookups, no writes).
no_cache = false

# Center each image on its anchor cell instead of anchoring the top-left
# corner there.
origin_center = false

# Flip buffers vertically for compositors that draw bottom-up.
use_opengl = false

[scaling]
# Resized dimensions are rounded up to a multiple of this value so images
# land on whole terminal cells.
scale_factor = 1
needs_scaling = false

[cache]
# Where resized bitmaps are kept. Defaults to the platform cache directory.
# directory = "/tmp/cellframe"

[processing]
# Worker threads for per-pixel passes. Omit to use all cores.
# max_threads = 4
"##
}
