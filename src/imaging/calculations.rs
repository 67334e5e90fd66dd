//! Pure calculation functions for target image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::dimensions::Scaler;

/// Outcome of the sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDimensions {
    /// The source already has the right size.
    Unchanged,
    /// Resample to exactly this many pixels.
    Resize { width: u32, height: u32 },
}

/// Round `value` up to the next multiple of `multiple`.
///
/// # Examples
/// ```
/// # use cellframe::imaging::calculations::round_up;
/// assert_eq!(round_up(101, 2), 102);
/// assert_eq!(round_up(150, 2), 150);
/// assert_eq!(round_up(7, 1), 7);
/// ```
pub fn round_up(value: u32, multiple: u32) -> u32 {
    if multiple <= 1 {
        return value;
    }
    value.div_ceil(multiple).saturating_mul(multiple)
}

/// Decide the pixel size an image should be resampled to.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `bounds` - Maximum pixel dimensions of the cell box (width, height)
/// * `scaler` - Fitting mode
/// * `scale_factor` - Cell alignment multiple
/// * `needs_scaling` - Round the result up to multiples of `scale_factor`
///
/// A zero-sized box means "no limit" and never resizes. `Contain` and
/// `Cover` leave images that already fit alone; the other modes always
/// rescale. Aspect ratio is kept except by `Distort`.
pub fn target_dimensions(
    source: (u32, u32),
    bounds: (u32, u32),
    scaler: Scaler,
    scale_factor: u32,
    needs_scaling: bool,
) -> TargetDimensions {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if src_w == 0 || src_h == 0 || max_w == 0 || max_h == 0 {
        return TargetDimensions::Unchanged;
    }

    let fits = src_w <= max_w && src_h <= max_h;
    if fits && !scaler.always_scales() {
        return TargetDimensions::Unchanged;
    }

    let (width, height) = match scaler {
        Scaler::Distort => (max_w, max_h),
        _ => {
            // Ratios as fractions so the limiting edge lands exactly on the bound
            let rw = (max_w as u64, src_w as u64);
            let rh = (max_h as u64, src_h as u64);
            let width_limits = rw.0 * rh.1 <= rh.0 * rw.1;
            let ratio = match scaler {
                Scaler::Contain | Scaler::FitContain => {
                    if width_limits { rw } else { rh }
                }
                _ => {
                    let larger = if width_limits { rh } else { rw };
                    // Cover never enlarges
                    if scaler == Scaler::Cover && larger.0 > larger.1 {
                        (1, 1)
                    } else {
                        larger
                    }
                }
            };
            (scale_edge(src_w, ratio), scale_edge(src_h, ratio))
        }
    };

    let (width, height) = if needs_scaling {
        (round_up(width, scale_factor), round_up(height, scale_factor))
    } else {
        (width, height)
    };

    if (width, height) == source {
        TargetDimensions::Unchanged
    } else {
        TargetDimensions::Resize { width, height }
    }
}

fn scale_edge(edge: u32, (num, den): (u64, u64)) -> u32 {
    let scaled = edge as u64 * num / den;
    scaled.clamp(1, u32::MAX as u64) as u32
}

/// Size an unresized image must be padded out to so both edges are
/// multiples of `scale_factor`, or `None` when it is already aligned.
///
/// # Examples
/// ```
/// # use cellframe::imaging::calculations::alignment_dimensions;
/// assert_eq!(alignment_dimensions((101, 150), 2), Some((102, 150)));
/// assert_eq!(alignment_dimensions((100, 150), 2), None);
/// ```
pub fn alignment_dimensions(current: (u32, u32), scale_factor: u32) -> Option<(u32, u32)> {
    let (w, h) = current;
    if scale_factor <= 1 || (w % scale_factor == 0 && h % scale_factor == 0) {
        return None;
    }
    Some((round_up(w, scale_factor), round_up(h, scale_factor)))
}
