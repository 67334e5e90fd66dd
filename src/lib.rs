//! # cellframe
//!
//! Prepares raster images for pixel-accurate display inside terminal cells
//! and draws them into native child windows.
//!
//! # Architecture: One-Way Pipeline
//!
//! ```text
//! file ─► orientation ─► resize (+ cache) ─► normalize ─► PreparedImage ─► RenderSurface
//! ```
//!
//! Every stage mutates one `image::DynamicImage` in place. Only decoding can
//! fail; missing EXIF data, cache write errors and an unavailable SIMD path
//! are logged and absorbed so a decodable file always yields a displayable
//! buffer.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, EXIF orientation, sizing policy, resize, pixel normalization |
//! | [`cache`] | Disk cache of resized bitmaps keyed by source path |
//! | [`dimensions`] | Cell placement, font geometry, scaler modes |
//! | [`config`] | `config.toml` loading and the execution [`Flags`](config::Flags) |
//! | [`surface`] | Native child window with a background event thread |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Cell Alignment
//!
//! Terminals place images on whole character cells. With `needs_scaling`
//! set, every resized image has both edges rounded up to the scale factor,
//! and images that need no resize are still padded out when an edge is
//! misaligned (a 101×150 image at scale factor 2 becomes 102×150).
//!
//! ## Cache Entries Are Never Invalidated
//!
//! The cache maps a source path to its resized bitmap and trusts that entry
//! from then on, even if the source changes. Clearing it is an explicit
//! action (`cellframe cache clear`).
//!
//! ## Two Strategies, One Result
//!
//! Resizing is a `fast_image_resize` box convolution. It uses SIMD when the
//! CPU has extensions for it and scalar code otherwise. The choice is made
//! once per pipeline and changes neither dimensions nor pixel values.

pub mod cache;
pub mod config;
pub mod dimensions;
pub mod imaging;
pub mod output;
pub mod surface;

#[cfg(test)]
pub(crate) mod test_helpers;
