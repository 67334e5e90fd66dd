//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>` or a JSON
//! value) for testability and a `print_*` wrapper that writes to stdout.
//! Format functions are pure: no I/O, no side effects.
//!
//! ## Prepare
//!
//! ```text
//! photos/cat.jpg
//!     Pixels: 400x200, 4 channels, 8-bit
//!     Bytes: 320000
//!     Placement: cell (3, 2), box 40x12 cells, contain
//!     Output: x11
//! ```
//!
//! ## Cache
//!
//! ```text
//! Cache: /home/me/.cache/cellframe
//!     3 entries, 2.0 KiB
//! ```

use crate::cache::{CacheStats, CacheStore};
use crate::config::Output;
use crate::imaging::PreparedImage;
use serde_json::{Value, json};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Prepare
// ============================================================================

pub fn format_prepared(prepared: &PreparedImage, output: Output) -> Vec<String> {
    let dims = prepared.dimensions();
    vec![
        prepared.filename().display().to_string(),
        format!(
            "{}Pixels: {}x{}, {} channels, {}-bit",
            indent(1),
            prepared.width(),
            prepared.height(),
            prepared.channels(),
            prepared.bytes_per_channel() as u32 * 8
        ),
        format!("{}Bytes: {}", indent(1), prepared.size()),
        format!(
            "{}Placement: cell ({}, {}), box {}x{} cells, {}",
            indent(1),
            dims.x,
            dims.y,
            dims.max_width,
            dims.max_height,
            dims.scaler
        ),
        format!("{}Output: {}", indent(1), output),
    ]
}

pub fn print_prepared(prepared: &PreparedImage, output: Output) {
    for line in format_prepared(prepared, output) {
        println!("{}", line);
    }
}

/// Machine-readable summary for `prepare --json`.
pub fn prepared_json(prepared: &PreparedImage, output: Output) -> Value {
    let dims = prepared.dimensions();
    json!({
        "filename": prepared.filename(),
        "width": prepared.width(),
        "height": prepared.height(),
        "channels": prepared.channels(),
        "bytes_per_channel": prepared.bytes_per_channel(),
        "size": prepared.size(),
        "output": output,
        "dimensions": dims,
    })
}

// ============================================================================
// Cache
// ============================================================================

pub fn format_cache_stats(store: &CacheStore, stats: &CacheStats) -> Vec<String> {
    vec![
        format!("Cache: {}", store.dir().display()),
        format!("{}{}", indent(1), stats),
    ]
}

pub fn print_cache_stats(store: &CacheStore, stats: &CacheStats) {
    for line in format_cache_stats(store, stats) {
        println!("{}", line);
    }
}
