//! Image preparation: decode, orient, resize, normalize.
//!
//! | Stage | Module | Crate / function |
//! |---|---|---|
//! | **Decode** | [`pipeline`] | `image::ImageReader` (format sniffed from content) |
//! | **Orientation** | [`exif_parser`], [`orientation`] | custom EXIF reader + `image` flips/rotations |
//! | **Resize** | [`resize`], [`calculations`] | `fast_image_resize` box convolution, SIMD or scalar |
//! | **Normalize** | [`normalize`] | bit depth, premultiply (`rayon`), protocol channels |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Stages**: one module per step, each mutating a `DynamicImage` in place
//! - **Pipeline**: [`ImagePipeline`] running the stages in order

pub mod calculations;
pub mod exif_parser;
pub mod normalize;
pub mod orientation;
pub mod pipeline;
pub mod resize;

pub use calculations::TargetDimensions;
pub use orientation::OrientationAction;
pub use pipeline::{ImagePipeline, PipelineError, PreparedImage};
pub use resize::{ResizeOutcome, ResizeStrategy};
