//! Load-to-ready-buffer coordination.
//!
//! [`ImagePipeline::load`] decodes a file and runs the stages in a fixed
//! order: orientation, resize, normalization. Rotation comes first because
//! it can swap width and height; normalization comes last so premultiplying
//! and channel conversion touch the smaller, resized buffer.
//!
//! Decoding is the only step that can fail. Everything after it degrades
//! to a logged no-op.

use super::exif_parser::read_exif_orientation;
use super::normalize::normalize;
use super::orientation::OrientationAction;
use super::resize::{ResizeStage, ResizeStrategy};
use crate::cache::CacheStore;
use crate::config::Flags;
use crate::dimensions::Dimensions;
use image::{DynamicImage, ImageError, ImageReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

/// A buffer ready for display, with the metadata a renderer needs.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    filename: PathBuf,
    dimensions: Dimensions,
    image: DynamicImage,
}

impl PreparedImage {
    pub fn new(filename: impl Into<PathBuf>, dimensions: Dimensions, image: DynamicImage) -> Self {
        Self {
            filename: filename.into(),
            dimensions,
            image,
        }
    }

    /// The source file the buffer was prepared from.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Logical placement after any origin centering.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Byte length of [`data`](Self::data).
    pub fn size(&self) -> usize {
        self.image.as_bytes().len()
    }

    pub fn data(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn bytes_per_channel(&self) -> u8 {
        self.image.color().bytes_per_pixel() / self.channels()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decodes and prepares images with one set of flags.
pub struct ImagePipeline {
    flags: Flags,
    cache: CacheStore,
    strategy: ResizeStrategy,
}

impl ImagePipeline {
    /// Build a pipeline, choosing the resize strategy for this machine.
    pub fn new(flags: Flags, cache: CacheStore) -> Self {
        let strategy = ResizeStrategy::detect();
        log::debug!("resize strategy: {strategy:?}");
        Self::with_strategy(flags, cache, strategy)
    }

    pub fn with_strategy(flags: Flags, cache: CacheStore, strategy: ResizeStrategy) -> Self {
        Self {
            flags,
            cache,
            strategy,
        }
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Decode `path` and prepare it for display.
    ///
    /// `in_cache` marks a file that is itself a cache entry: it is already
    /// sized and is not resized again. With `origin_center` set, `dims` is
    /// moved so the image is centered on its anchor.
    pub fn load(
        &self,
        path: &Path,
        dims: &mut Dimensions,
        in_cache: bool,
    ) -> Result<PreparedImage, PipelineError> {
        self.prepare(path, path, dims, in_cache)
    }

    /// Like [`load`](Self::load), but reads the cached bitmap for `path`
    /// when caching is on and one exists. An unreadable cache entry falls
    /// back to the source.
    pub fn open(&self, path: &Path, dims: &mut Dimensions) -> Result<PreparedImage, PipelineError> {
        if !self.flags.no_cache
            && let Some(cached) = self.cache.lookup(path)
        {
            // A failed decode is logged by prepare; fall through to the source
            if let Ok(prepared) = self.prepare(&cached, path, dims, true) {
                return Ok(prepared);
            }
        }
        self.prepare(path, path, dims, false)
    }

    fn prepare(
        &self,
        decode_from: &Path,
        source: &Path,
        dims: &mut Dimensions,
        in_cache: bool,
    ) -> Result<PreparedImage, PipelineError> {
        let mut image = decode(decode_from).inspect_err(|e| log::warn!("{e}"))?;
        log::info!(
            "loaded {} ({}x{} {:?})",
            decode_from.display(),
            image.width(),
            image.height(),
            image.color()
        );

        let orientation = OrientationAction::from_exif(read_exif_orientation(decode_from));
        if orientation != OrientationAction::NoOp {
            log::debug!("{}: applying {orientation:?}", source.display());
            orientation.apply(&mut image);
        }

        let stage = ResizeStage::new(self.strategy, &self.cache, &self.flags);
        stage.run(&mut image, source, dims, in_cache);

        normalize(&mut image, &self.flags);

        if self.flags.origin_center {
            dims.center_on_anchor(image.width(), image.height());
        }

        Ok(PreparedImage::new(source, dims.clone(), image))
    }
}

/// Decode with the format sniffed from content, keeping bit depth.
fn decode(path: &Path) -> Result<DynamicImage, PipelineError> {
    let decode_err = |source: ImageError| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let image = ImageReader::open(path)
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;
    Ok(canonicalize(image))
}

/// Fold layouts the later stages don't handle into ones they do:
/// gray+alpha becomes RGBA, float becomes 16-bit.
fn canonicalize(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLumaA8(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
        DynamicImage::ImageLumaA16(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba16(image.to_rgba16())
        }
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(image.to_rgb16()),
        other => other,
    }
}
