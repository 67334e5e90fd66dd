//! Pixel format normalization after resizing.
//!
//! Steps run in a fixed order, each only when it applies:
//!
//! 1. 16-bit channels are narrowed to 8 bits (`v >> 8`).
//! 2. Four-channel buffers get premultiplied alpha.
//! 3. Buffers are flipped vertically for bottom-up OpenGL compositors.
//! 4. Grayscale is expanded to four channels.
//! 5. Channels are adapted to what the output protocol expects.
//!
//! Nothing here fails: a buffer whose layout does not match a step skips it.

use crate::config::{Flags, Output};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use rayon::prelude::*;

/// Run every normalization step on `image`.
pub fn normalize(image: &mut DynamicImage, flags: &Flags) {
    reduce_bit_depth(image);
    premultiply_alpha(image);
    if flags.use_opengl {
        *image = image.flipv();
    }
    expand_grayscale(image);
    adapt_to_output(image, flags.output);
    log::debug!(
        "normalized to {}x{} {:?} for {}",
        image.width(),
        image.height(),
        image.color(),
        flags.output
    );
}

fn narrow(samples: &[u16]) -> Vec<u8> {
    samples.iter().map(|&v| (v >> 8) as u8).collect()
}

/// Narrow 16-bit channels to 8 bits, truncating.
pub fn reduce_bit_depth(image: &mut DynamicImage) {
    let (w, h) = (image.width(), image.height());
    let narrowed = match &*image {
        DynamicImage::ImageLuma16(buf) => {
            GrayImage::from_raw(w, h, narrow(buf.as_raw())).map(DynamicImage::ImageLuma8)
        }
        DynamicImage::ImageLumaA16(buf) => {
            GrayAlphaImage::from_raw(w, h, narrow(buf.as_raw())).map(DynamicImage::ImageLumaA8)
        }
        DynamicImage::ImageRgb16(buf) => {
            RgbImage::from_raw(w, h, narrow(buf.as_raw())).map(DynamicImage::ImageRgb8)
        }
        DynamicImage::ImageRgba16(buf) => {
            RgbaImage::from_raw(w, h, narrow(buf.as_raw())).map(DynamicImage::ImageRgba8)
        }
        _ => None,
    };
    if let Some(narrowed) = narrowed {
        *image = narrowed;
    }
}

/// Scale the color channels of an 8-bit RGBA buffer by alpha:
/// `c * a / 255`, floored. Alpha itself is kept.
pub fn premultiply_alpha(image: &mut DynamicImage) {
    let Some(buf) = image.as_mut_rgba8() else {
        return;
    };
    buf.par_chunks_exact_mut(4).for_each(|px| {
        let alpha = px[3] as u16;
        for c in &mut px[..3] {
            *c = (*c as u16 * alpha / 255) as u8;
        }
    });
}

/// Single-channel buffers become RGBA with the gray value in every color
/// channel and opaque alpha.
pub fn expand_grayscale(image: &mut DynamicImage) {
    if let DynamicImage::ImageLuma8(_) = image {
        *image = DynamicImage::ImageRgba8(image.to_rgba8());
    }
}

/// Match the channel layout to the output protocol.
pub fn adapt_to_output(image: &mut DynamicImage, output: Output) {
    match output {
        // Direct framebuffer-style backends want interleaved color + alpha
        Output::X11 | Output::Wayland | Output::Chafa => {
            if let DynamicImage::ImageRgb8(_) = image {
                *image = DynamicImage::ImageRgba8(image.to_rgba8());
            }
        }
        // Decoded buffers are already red-green-blue(-alpha)
        Output::Kitty => {}
        Output::Sixel => {
            if let DynamicImage::ImageRgba8(buf) = image {
                let (w, h) = buf.dimensions();
                let rgb: Vec<u8> = buf
                    .as_raw()
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                if let Some(rgb) = RgbImage::from_raw(w, h, rgb) {
                    *image = DynamicImage::ImageRgb8(rgb);
                }
            }
        }
        Output::Iterm2 => {}
    }
}
