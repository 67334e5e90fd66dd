//! Disk cache of resized bitmaps.
//!
//! Resizing a large photo down to a terminal-sized box is the most expensive
//! step of preparing it, and the same file is typically shown many times in a
//! row (file manager previews, scrolling back and forth). After a real resize
//! the pipeline writes the resized bitmap here; the next time the same path
//! is opened the cached bitmap is loaded instead and the resize is skipped.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Entries are keyed by the **source path only**: the file name is the
//! SHA-256 of the path bytes, so the mapping is a pure function of the path
//! and needs no manifest.
//!
//! A cache entry, once written, is authoritative. It is never invalidated
//! when the source file changes or when the box the image is shown in
//! changes size; callers that care about staleness clear the cache
//! (`cellframe cache clear`) or run with `no_cache`.
//!
//! ## Storage
//!
//! Entries are PNG files, which hold every buffer layout the pipeline
//! produces before normalization (gray, RGB, RGBA at 8 or 16 bits) without
//! loss. Writes go to a temporary name first and are renamed into place, so
//! a reader never sees a half-written entry.

use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension of every cache entry.
const ENTRY_EXTENSION: &str = "png";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] image::ImageError),
}

/// A directory of resized bitmaps keyed by source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache in the platform cache directory (`~/.cache/cellframe` on Linux),
    /// or under the system temp directory when the platform has none.
    pub fn platform_default() -> Self {
        let dir = directories::ProjectDirs::from("", "", "cellframe")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("cellframe"));
        Self::new(dir)
    }

    /// Cache at `dir` when given, otherwise the platform default.
    pub fn from_config(dir: Option<&Path>) -> Self {
        match dir {
            Some(d) => Self::new(d),
            None => Self::platform_default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the resized bitmap for `source` lives. Deterministic for a
    /// given path and does not touch the filesystem.
    pub fn path_for(&self, source: &Path) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hash_source_path(source), ENTRY_EXTENSION))
    }

    /// The cache entry for `source`, if one has been written.
    pub fn lookup(&self, source: &Path) -> Option<PathBuf> {
        let path = self.path_for(source);
        path.is_file().then_some(path)
    }

    /// Persist a resized bitmap for `source`, replacing any previous entry.
    pub fn save(&self, source: &Path, image: &DynamicImage) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source);
        let partial = path.with_extension(format!("{ENTRY_EXTENSION}.partial"));
        if let Err(e) = image.save_with_format(&partial, ImageFormat::Png) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        std::fs::rename(&partial, &path)?;
        Ok(path)
    }

    /// Count the entries currently on disk.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries() {
            stats.files += 1;
            stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
        stats
    }

    /// Delete every entry. Returns how many files were removed.
    ///
    /// Files that are not cache entries are left alone.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.entries() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }

    fn entries(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == ENTRY_EXTENSION)
            })
    }
}

/// SHA-256 of a path's bytes, returned as a hex string.
pub fn hash_source_path(source: &Path) -> String {
    let digest = Sha256::digest(source.as_os_str().as_encoded_bytes());
    format!("{:x}", digest)
}

/// Summary of what the cache directory holds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub files: u64,
    pub bytes: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.files == 0 {
            return write!(f, "empty");
        }
        let noun = if self.files == 1 { "entry" } else { "entries" };
        if self.bytes >= 1024 * 1024 {
            write!(
                f,
                "{} {}, {:.1} MiB",
                self.files,
                noun,
                self.bytes as f64 / (1024.0 * 1024.0)
            )
        } else if self.bytes >= 1024 {
            write!(
                f,
                "{} {}, {:.1} KiB",
                self.files,
                noun,
                self.bytes as f64 / 1024.0
            )
        } else {
            write!(f, "{} {}, {} B", self.files, noun, self.bytes)
        }
    }
}
