//! Shared test utilities for the cellframe test suite.
//!
//! Builds small synthetic images in memory or on disk, optionally carrying
//! an EXIF orientation tag spliced into the container, so tests never depend
//! on binary fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("rotated.jpg");
//! write_jpeg_with_exif(&path, 64, 32, 6);
//! assert_eq!(read_exif_orientation(&path), Some(6));
//! ```

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

// =========================================================================
// Pixel content
// =========================================================================

/// RGB gradient with distinct values per coordinate.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

// =========================================================================
// EXIF blocks
// =========================================================================

/// A TIFF structure whose IFD0 holds a single Orientation entry.
///
/// Layout: 8-byte header, IFD at offset 8 with one 12-byte entry, then a
/// zero next-IFD pointer (26 bytes total).
pub fn exif_tiff_block(orientation: u16, big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };
    let u32b = |v: u32| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut data = Vec::with_capacity(26);
    data.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    data.extend_from_slice(&u16b(42));
    data.extend_from_slice(&u32b(8));
    // IFD0: one entry
    data.extend_from_slice(&u16b(1));
    data.extend_from_slice(&u16b(0x0112));
    data.extend_from_slice(&u16b(3));
    data.extend_from_slice(&u32b(1));
    data.extend_from_slice(&u16b(orientation));
    data.extend_from_slice(&[0, 0]);
    // No next IFD
    data.extend_from_slice(&u32b(0));
    data
}

/// A baseline JPEG with an `Exif` APP1 segment right after SOI.
pub fn jpeg_with_exif(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let jpeg = encode(&gradient(width, height), ImageFormat::Jpeg);
    let tiff = exif_tiff_block(orientation, false);

    let seg_len = (2 + 6 + tiff.len()) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + seg_len as usize + 2);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A PNG with an `eXIf` chunk between IHDR and the image data.
pub fn png_with_exif(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let png = encode(&gradient(width, height), ImageFormat::Png);
    let tiff = exif_tiff_block(orientation, true);

    // Signature (8) + IHDR chunk (4 len + 4 type + 13 data + 4 crc)
    let ihdr_end = 33;
    let mut chunk = Vec::with_capacity(tiff.len() + 12);
    chunk.extend_from_slice(&(tiff.len() as u32).to_be_bytes());
    chunk.extend_from_slice(b"eXIf");
    chunk.extend_from_slice(&tiff);
    chunk.extend_from_slice(&crc32(&chunk[4..]).to_be_bytes());

    let mut out = Vec::with_capacity(png.len() + chunk.len());
    out.extend_from_slice(&png[..ihdr_end]);
    out.extend_from_slice(&chunk);
    out.extend_from_slice(&png[ihdr_end..]);
    out
}

/// CRC-32 (IEEE) as used by PNG chunks.
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

// =========================================================================
// Files on disk
// =========================================================================

/// Write an RGB gradient PNG.
pub fn write_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

/// Write a single-channel PNG.
pub fn write_gray_png(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        image::Luma([((x * 16 + y) % 256) as u8])
    }))
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

/// Write a JPEG tagged with an EXIF orientation.
pub fn write_jpeg_with_exif(path: &Path, width: u32, height: u32, orientation: u16) {
    std::fs::write(path, jpeg_with_exif(width, height, orientation)).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_value() {
        // CRC of the IEND chunk type, as found in every PNG
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn spliced_png_still_decodes() {
        let data = png_with_exif(5, 3, 6);
        let img = image::load_from_memory(&data).unwrap();
        assert_eq!((img.width(), img.height()), (5, 3));
    }

    #[test]
    fn spliced_jpeg_still_decodes() {
        let data = jpeg_with_exif(5, 3, 6);
        let img = image::load_from_memory(&data).unwrap();
        assert_eq!((img.width(), img.height()), (5, 3));
    }
}
