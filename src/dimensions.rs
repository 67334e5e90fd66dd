//! Logical placement and pixel bounds for one image.
//!
//! A [`Dimensions`] value ties a placement in terminal cells (`x`, `y`,
//! maximum columns and rows) to the pixel geometry of the terminal font, so
//! the pipeline can turn "at most 40×20 cells" into pixel limits and the
//! surface can turn a cell anchor into a window position.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel size of one terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    pub font_width: u32,
    pub font_height: u32,
}

impl TerminalGeometry {
    /// Zero-sized fonts are clamped to one pixel so cell math never divides
    /// by zero.
    pub fn new(font_width: u32, font_height: u32) -> Self {
        Self {
            font_width: font_width.max(1),
            font_height: font_height.max(1),
        }
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self::new(8, 16)
    }
}

/// How an image is fitted into its cell box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaler {
    /// Shrink to fit, never enlarge.
    #[default]
    Contain,
    /// Shrink or enlarge to fit.
    FitContain,
    /// Shrink so the smaller side fits, never enlarge.
    Cover,
    /// Shrink or enlarge so the smaller side fits.
    ForcedCover,
    /// Stretch to exactly the box, ignoring aspect ratio.
    Distort,
}

impl Scaler {
    pub const ALL: [Scaler; 5] = [
        Scaler::Contain,
        Scaler::FitContain,
        Scaler::Cover,
        Scaler::ForcedCover,
        Scaler::Distort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scaler::Contain => "contain",
            Scaler::FitContain => "fit_contain",
            Scaler::Cover => "cover",
            Scaler::ForcedCover => "forced_cover",
            Scaler::Distort => "distort",
        }
    }

    /// Whether images that already fit are still rescaled.
    pub fn always_scales(self) -> bool {
        matches!(self, Scaler::FitContain | Scaler::ForcedCover | Scaler::Distort)
    }
}

impl fmt::Display for Scaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scaler {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        Scaler::ALL
            .into_iter()
            .find(|sc| sc.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ConfigError::Validation(format!("unknown scaler '{s}'")))
    }
}

/// Placement of one image in terminal cells plus the geometry needed to
/// convert cells to pixels.
///
/// `x` and `y` are signed: centering an image on its anchor can move the
/// origin past the top-left corner of the terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub terminal: TerminalGeometry,
    pub x: i32,
    pub y: i32,
    /// Maximum width in cells.
    pub max_width: u32,
    /// Maximum height in cells.
    pub max_height: u32,
    pub scaler: Scaler,
}

impl Dimensions {
    pub fn new(
        terminal: TerminalGeometry,
        x: i32,
        y: i32,
        max_width: u32,
        max_height: u32,
        scaler: Scaler,
    ) -> Self {
        Self {
            terminal,
            x,
            y,
            max_width,
            max_height,
            scaler,
        }
    }

    /// Maximum image width in pixels.
    pub fn max_wpixels(&self) -> u32 {
        self.max_width.saturating_mul(self.terminal.font_width)
    }

    /// Maximum image height in pixels.
    pub fn max_hpixels(&self) -> u32 {
        self.max_height.saturating_mul(self.terminal.font_height)
    }

    /// Pixel position of the anchor cell relative to the terminal window.
    pub fn pixel_origin(&self) -> (i32, i32) {
        (
            self.x.saturating_mul(self.terminal.font_width as i32),
            self.y.saturating_mul(self.terminal.font_height as i32),
        )
    }

    /// Shift the anchor so an image of `width`×`height` pixels is centered
    /// on it instead of hanging off its top-left corner.
    ///
    /// The shift is half the image's span in cells, floored.
    pub fn center_on_anchor(&mut self, width: u32, height: u32) {
        let half_cols = (width as f64 / self.terminal.font_width as f64 / 2.0).floor();
        let half_rows = (height as f64 / self.terminal.font_height as f64 / 2.0).floor();
        self.x -= half_cols as i32;
        self.y -= half_rows as i32;
    }
}
