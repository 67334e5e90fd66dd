use cellframe::cache::CacheStore;
use cellframe::config::{self, Config, Output};
use cellframe::dimensions::{Dimensions, Scaler, TerminalGeometry};
use cellframe::imaging::ImagePipeline;
use cellframe::output;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("CELLFRAME_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("CELLFRAME_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; version_string runs a single time per process
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "cellframe")]
#[command(about = "Prepare images for pixel-accurate display inside terminal cells")]
#[command(long_about = "\
Prepare images for pixel-accurate display inside terminal cells

Each image is decoded, turned upright according to its EXIF orientation,
resized to fit a box measured in terminal cells, and converted to the pixel
layout the chosen output protocol expects.

Resized bitmaps are cached by source path. A cache entry is trusted until
'cellframe cache clear' removes it, even if the source changes.

Logging goes to stderr; set RUST_LOG=debug to trace every stage.

Run 'cellframe gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Where and how large an image is placed, in terminal cells.
#[derive(clap::Args, Clone)]
struct PlacementArgs {
    /// Column of the anchor cell
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    x: i32,
    /// Row of the anchor cell
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    y: i32,
    /// Maximum width in cells
    #[arg(long, default_value_t = 80)]
    max_cols: u32,
    /// Maximum height in cells
    #[arg(long, default_value_t = 24)]
    max_rows: u32,
    /// Font cell width in pixels
    #[arg(long, default_value_t = 8)]
    font_width: u32,
    /// Font cell height in pixels
    #[arg(long, default_value_t = 16)]
    font_height: u32,
    /// contain, fit_contain, cover, forced_cover or distort
    #[arg(long, default_value_t = Scaler::Contain)]
    scaler: Scaler,
}

impl PlacementArgs {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(
            TerminalGeometry::new(self.font_width, self.font_height),
            self.x,
            self.y,
            self.max_cols,
            self.max_rows,
            self.scaler,
        )
    }
}

/// Per-run overrides of config.toml.
#[derive(clap::Args, Clone)]
struct FlagArgs {
    /// x11, wayland, chafa, kitty, sixel or iterm2
    #[arg(long)]
    output: Option<Output>,
    /// Neither read nor write the resize cache
    #[arg(long)]
    no_cache: bool,
    /// Center the image on its anchor cell
    #[arg(long)]
    origin_center: bool,
    /// Cell alignment multiple
    #[arg(long)]
    scale_factor: Option<u32>,
    /// Round sizes up to the scale factor
    #[arg(long)]
    needs_scaling: bool,
    /// Flip rows for bottom-up compositors
    #[arg(long)]
    opengl: bool,
}

impl FlagArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(sf) = self.scale_factor {
            config.scaling.scale_factor = sf;
        }
        config.no_cache |= self.no_cache;
        config.origin_center |= self.origin_center;
        config.scaling.needs_scaling |= self.needs_scaling;
        config.use_opengl |= self.opengl;
    }
}

#[derive(Subcommand)]
enum Command {
    /// Prepare one image and report the resulting buffer
    Prepare {
        path: PathBuf,
        #[command(flatten)]
        placement: PlacementArgs,
        #[command(flatten)]
        flags: FlagArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// Write the raw prepared bytes to this file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Inspect or clear the resize cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Draw one image into a child window (needs the `x11` feature)
    Show {
        path: PathBuf,
        #[command(flatten)]
        placement: PlacementArgs,
        #[command(flatten)]
        flags: FlagArgs,
        /// Parent window id (default: root window)
        #[arg(long, value_parser = parse_window_id)]
        parent: Option<u64>,
        /// How long to keep the window open
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print the cache file that holds the resized bitmap for PATH
    Path { path: PathBuf },
    /// Count cache entries and their size
    Stats,
    /// Remove every cache entry
    Clear,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Prepare {
            path,
            placement,
            flags,
            json,
            dump,
        } => {
            flags.apply(&mut config);
            config.validate()?;
            init_thread_pool(&config.processing);

            let pipeline = ImagePipeline::new(config.flags(), cache_store(&config));
            let mut dims = placement.dimensions();
            let prepared = pipeline.open(&absolute(&path), &mut dims)?;

            if let Some(dump) = dump {
                std::fs::write(&dump, prepared.data())?;
            }
            if json {
                let value = output::prepared_json(&prepared, config.output);
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                output::print_prepared(&prepared, config.output);
            }
        }
        Command::Cache(CacheCommand::Path { path }) => {
            println!("{}", cache_store(&config).path_for(&absolute(&path)).display());
        }
        Command::Cache(CacheCommand::Stats) => {
            let store = cache_store(&config);
            output::print_cache_stats(&store, &store.stats());
        }
        Command::Cache(CacheCommand::Clear) => {
            let store = cache_store(&config);
            let removed = store.clear()?;
            println!("Removed {} cache entries from {}", removed, store.dir().display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Show {
            path,
            placement,
            flags,
            parent,
            seconds,
        } => {
            flags.apply(&mut config);
            config.output = Output::X11;
            config.validate()?;
            init_thread_pool(&config.processing);
            show(&config, &absolute(&path), placement.dimensions(), parent, seconds)?;
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn cache_store(config: &Config) -> CacheStore {
    CacheStore::from_config(config.cache.directory.as_deref())
}

/// Cache keys are derived from the path, so relative paths are anchored to
/// the working directory first.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parse_window_id(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid window id '{s}': {e}"))
}

#[cfg(all(feature = "x11", target_os = "linux"))]
fn show(
    config: &Config,
    path: &Path,
    mut dims: Dimensions,
    parent: Option<u64>,
    seconds: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    use cellframe::surface::x11::X11Connection;
    use cellframe::surface::{EVENT_POLL_INTERVAL, Geometry, RenderSurface};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    let pipeline = ImagePipeline::new(config.flags(), cache_store(config));
    let prepared = pipeline.open(path, &mut dims)?;

    let connection = Arc::new(X11Connection::open(None)?);
    let parent = parent.unwrap_or_else(|| connection.root_window());
    let (x, y) = prepared.dimensions().pixel_origin();
    let geometry = Geometry {
        x,
        y,
        width: prepared.width(),
        height: prepared.height(),
    };

    let mut surface = RenderSurface::new(Arc::clone(&connection), parent, geometry)?;
    surface.draw(&prepared)?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        surface.redraw_if_damaged();
        std::thread::sleep(EVENT_POLL_INTERVAL);
    }
    Ok(())
}

#[cfg(not(all(feature = "x11", target_os = "linux")))]
fn show(
    _config: &Config,
    _path: &Path,
    _dims: Dimensions,
    _parent: Option<u64>,
    _seconds: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    Err("this build has no window system; rebuild with --features x11".into())
}
