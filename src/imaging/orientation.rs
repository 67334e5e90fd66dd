//! EXIF orientation → pixel transform.
//!
//! Codes 2-8 of the EXIF Orientation tag map to a fixed flip/rotate
//! combination; code 1, out-of-range values and a missing tag leave the
//! buffer alone. See <https://jdhao.github.io/2019/07/31/image_rotation_exif_info/>
//! for pictures of each case.

use image::DynamicImage;

/// The transform that makes a stored image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrientationAction {
    #[default]
    NoOp,
    FlipHorizontal,
    FlipVertical,
    /// Both axes, i.e. a 180° rotation.
    FlipBoth,
    Rotate90Cw,
    Rotate90Ccw,
    Rotate90CwFlipHorizontal,
    Rotate90CcwFlipHorizontal,
}

impl OrientationAction {
    /// Map an EXIF orientation code to its action.
    pub fn from_exif(code: Option<u16>) -> Self {
        match code {
            Some(2) => Self::FlipHorizontal,
            Some(3) => Self::FlipBoth,
            Some(4) => Self::FlipVertical,
            Some(5) => Self::Rotate90CwFlipHorizontal,
            Some(6) => Self::Rotate90Cw,
            Some(7) => Self::Rotate90CcwFlipHorizontal,
            Some(8) => Self::Rotate90Ccw,
            _ => Self::NoOp,
        }
    }

    /// Transform `image` in place.
    pub fn apply(self, image: &mut DynamicImage) {
        let transformed = match self {
            Self::NoOp => return,
            Self::FlipHorizontal => image.fliph(),
            Self::FlipVertical => image.flipv(),
            Self::FlipBoth => image.rotate180(),
            Self::Rotate90Cw => image.rotate90(),
            Self::Rotate90Ccw => image.rotate270(),
            Self::Rotate90CwFlipHorizontal => image.rotate90().fliph(),
            Self::Rotate90CcwFlipHorizontal => image.rotate270().fliph(),
        };
        *image = transformed;
    }
}
