//! Resize stage: sizing policy, cell alignment, resampling and cache writes.
//!
//! Both strategies behind [`ResizeStrategy`] run the same `fast_image_resize`
//! box (area-averaging) convolution with alpha-aware averaging. `Accelerated`
//! lets it use the SIMD extensions detected at runtime; `Host` pins it to
//! plain scalar code. The strategy only changes speed: pixels and
//! dimensions are identical either way.

use super::calculations::{TargetDimensions, alignment_dimensions, target_dimensions};
use crate::cache::CacheStore;
use crate::config::Flags;
use crate::dimensions::Dimensions;
use fast_image_resize as fr;
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;

/// Box convolution: every output pixel averages the source area it covers.
const AREA_AVERAGE: fr::ResizeAlg = fr::ResizeAlg::Convolution(fr::FilterType::Box);

/// Which resampler performs a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStrategy {
    /// SIMD convolution (SSE4.1/AVX2/NEON) via `fast_image_resize`.
    Accelerated,
    /// The same convolution with CPU extensions disabled.
    Host,
}

impl ResizeStrategy {
    /// `Accelerated` when the CPU offers any SIMD extension the resizer uses.
    pub fn detect() -> Self {
        if matches!(fr::CpuExtensions::default(), fr::CpuExtensions::None) {
            ResizeStrategy::Host
        } else {
            ResizeStrategy::Accelerated
        }
    }

    /// Resample `image` to exactly `width`×`height`, keeping its pixel layout.
    pub fn resample(self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let resized = match self {
            ResizeStrategy::Accelerated => convolve(image, width, height, false).or_else(|e| {
                log::warn!("accelerated resize failed, using host path: {e}");
                convolve(image, width, height, true)
            }),
            ResizeStrategy::Host => convolve(image, width, height, true),
        };
        resized.unwrap_or_else(|e| {
            // Only layouts the convolution has no pixel type for land here
            log::warn!("cannot area-average {:?} ({e}), using triangle filter", image.color());
            image.resize_exact(width, height, FilterType::Triangle)
        })
    }
}

fn convolve(
    image: &DynamicImage,
    width: u32,
    height: u32,
    scalar: bool,
) -> Result<DynamicImage, fr::ResizeError> {
    let mut dst = DynamicImage::new(width, height, image.color());
    let mut resizer = fr::Resizer::new();
    if scalar {
        // SAFETY: the scalar path needs no CPU extension.
        unsafe { resizer.set_cpu_extensions(fr::CpuExtensions::None) };
    }
    let options = fr::ResizeOptions::new().resize_alg(AREA_AVERAGE);
    resizer.resize(image, &mut dst, Some(&options))?;
    Ok(dst)
}

/// What the resize stage did to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// The buffer came from the cache and is already sized.
    SkippedCached,
    /// No resize was needed.
    Unchanged,
    /// The buffer was resampled. `cached` is false when caching is off or
    /// the cache write failed.
    Resized { cached: bool },
}

/// Resize stage bound to one pipeline's strategy, cache and flags.
pub struct ResizeStage<'a> {
    strategy: ResizeStrategy,
    cache: &'a CacheStore,
    flags: &'a Flags,
}

impl<'a> ResizeStage<'a> {
    pub fn new(strategy: ResizeStrategy, cache: &'a CacheStore, flags: &'a Flags) -> Self {
        Self {
            strategy,
            cache,
            flags,
        }
    }

    /// Bring `image` (decoded from `source`) to its display size.
    ///
    /// Buffers loaded from the cache are never touched. A failed cache
    /// write is logged and otherwise ignored.
    pub fn run(
        &self,
        image: &mut DynamicImage,
        source: &Path,
        dims: &Dimensions,
        in_cache: bool,
    ) -> ResizeOutcome {
        if in_cache {
            log::debug!("{}: loaded from cache, skipping resize", source.display());
            return ResizeOutcome::SkippedCached;
        }

        let current = (image.width(), image.height());
        let target = match target_dimensions(
            current,
            (dims.max_wpixels(), dims.max_hpixels()),
            dims.scaler,
            self.flags.scale_factor,
            self.flags.needs_scaling,
        ) {
            TargetDimensions::Resize { width, height } => Some((width, height)),
            TargetDimensions::Unchanged if self.flags.needs_scaling => {
                alignment_dimensions(current, self.flags.scale_factor)
            }
            TargetDimensions::Unchanged => None,
        };

        let Some((width, height)) = target else {
            return ResizeOutcome::Unchanged;
        };

        log::debug!(
            "{}: resizing {}x{} -> {}x{} ({:?})",
            source.display(),
            current.0,
            current.1,
            width,
            height,
            self.strategy
        );
        *image = self.strategy.resample(image, width, height);

        if self.flags.no_cache {
            return ResizeOutcome::Resized { cached: false };
        }
        match self.cache.save(source, image) {
            Ok(path) => {
                log::debug!("cached {} at {}", source.display(), path.display());
                ResizeOutcome::Resized { cached: true }
            }
            Err(e) => {
                log::error!("could not cache {}: {e}", source.display());
                ResizeOutcome::Resized { cached: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{Scaler, TerminalGeometry};
    use image::{RgbImage, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7) as u8, (y * 5) as u8, 128])
        }))
    }

    /// 10x20 px cells, 40x12 cells → 400x240 px box.
    fn dims(scaler: Scaler) -> Dimensions {
        Dimensions::new(TerminalGeometry::new(10, 20), 0, 0, 40, 12, scaler)
    }

    fn flags(scale_factor: u32, needs_scaling: bool, no_cache: bool) -> Flags {
        Flags {
            scale_factor,
            needs_scaling,
            no_cache,
            ..Flags::default()
        }
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    #[test]
    fn strategies_produce_identical_rgb_pixels() {
        let src = gradient(97, 61);
        let host = ResizeStrategy::Host.resample(&src, 40, 25);
        let accelerated = ResizeStrategy::Accelerated.resample(&src, 40, 25);
        assert_eq!(host.color(), image::ColorType::Rgb8);
        assert_eq!((host.width(), host.height()), (40, 25));
        assert_eq!(host.as_bytes(), accelerated.as_bytes());
    }

    #[test]
    fn strategies_produce_identical_rgba_pixels() {
        // Left half opaque red, right half transparent blue
        let src = DynamicImage::ImageRgba8(RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 0])
            }
        }));
        let host = ResizeStrategy::Host.resample(&src, 2, 2);
        let accelerated = ResizeStrategy::Accelerated.resample(&src, 2, 2);
        assert_eq!(host.color(), image::ColorType::Rgba8);
        assert_eq!(host.as_bytes(), accelerated.as_bytes());
        // Each output pixel covers one 4x4 quadrant; no colour bleeds across
        assert_eq!(&host.as_bytes()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn strategies_agree_on_alignment_upscale() {
        let src = gradient(101, 150);
        let host = ResizeStrategy::Host.resample(&src, 102, 150);
        let accelerated = ResizeStrategy::Accelerated.resample(&src, 102, 150);
        assert_eq!(host.as_bytes(), accelerated.as_bytes());
    }

    #[test]
    fn box_filter_averages_uniform_area() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, image::Rgb([90, 90, 90])));
        for strategy in [ResizeStrategy::Host, ResizeStrategy::Accelerated] {
            let out = strategy.resample(&src, 16, 16);
            assert!(out.as_bytes().iter().all(|&b| b == 90), "{strategy:?}");
        }
    }

    // =========================================================================
    // ResizeStage
    // =========================================================================

    #[test]
    fn cached_buffer_is_never_resized() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path());
        let flags = flags(2, true, false);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);

        let mut img = gradient(1001, 999);
        let outcome = stage.run(&mut img, Path::new("/a.png"), &dims(Scaler::Contain), true);
        assert_eq!(outcome, ResizeOutcome::SkippedCached);
        assert_eq!((img.width(), img.height()), (1001, 999));
        assert_eq!(cache.stats().files, 0);
    }

    #[test]
    fn fitting_image_is_unchanged_without_alignment() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path());
        let flags = flags(2, false, false);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);

        let mut img = gradient(101, 150);
        let outcome = stage.run(&mut img, Path::new("/a.png"), &dims(Scaler::Contain), false);
        assert_eq!(outcome, ResizeOutcome::Unchanged);
        assert_eq!((img.width(), img.height()), (101, 150));
    }

    #[test]
    fn misaligned_image_is_rounded_up() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path());
        let flags = flags(2, true, true);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);

        let mut img = gradient(101, 150);
        let outcome = stage.run(&mut img, Path::new("/a.png"), &dims(Scaler::Contain), false);
        assert_eq!(outcome, ResizeOutcome::Resized { cached: false });
        assert_eq!((img.width(), img.height()), (102, 150));
    }

    #[test]
    fn real_resize_writes_cache_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path());
        let flags = flags(1, false, false);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);
        let source = Path::new("/photos/wide.png");

        let mut img = gradient(800, 400);
        let outcome = stage.run(&mut img, source, &dims(Scaler::Contain), false);
        assert_eq!(outcome, ResizeOutcome::Resized { cached: true });
        assert_eq!((img.width(), img.height()), (400, 200));

        let entry = cache.lookup(source).expect("cache entry");
        let cached = image::open(entry).unwrap();
        assert_eq!((cached.width(), cached.height()), (400, 200));
    }

    #[test]
    fn no_cache_flag_skips_write() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path());
        let flags = flags(1, false, true);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);

        let mut img = gradient(800, 400);
        stage.run(&mut img, Path::new("/a.png"), &dims(Scaler::Contain), false);
        assert_eq!(cache.stats().files, 0);
    }

    #[test]
    fn cache_write_failure_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let cache = CacheStore::new(blocker.join("cache"));
        let flags = flags(1, false, false);
        let stage = ResizeStage::new(ResizeStrategy::Host, &cache, &flags);

        let mut img = gradient(800, 400);
        let outcome = stage.run(&mut img, Path::new("/a.png"), &dims(Scaler::Contain), false);
        assert_eq!(outcome, ResizeOutcome::Resized { cached: false });
        assert_eq!((img.width(), img.height()), (400, 200));
    }
}
