//! # picman-core
//!
//! Core pixel types for the picman raster pipeline.
//!
//! This crate provides the foundational types used by every other picman
//! crate:
//!
//! - [`Rect`] - Regions, tile extents and update rectangles
//! - [`Error`], [`Result`] - Error taxonomy shared by the pixel pipeline
//! - [`Format`], [`FormatRegistry`] - Canonical pixel encodings and queries
//! - [`PixelFormat`], [`codec`] - Component storage types and byte codecs
//! - [`Fish`] - Explicit conversion between two formats
//!
//! ## Crate Structure
//!
//! ```text
//! picman-core (this crate)
//!    ^
//!    |
//!    +-- picman-tiles (tile cache, buffers, region iterator)
//!    +-- picman-ops (layer modes, applicator, filters, drawables)
//!    +-- picman-cli
//! ```
//!
//! Formats are never reinterpreted implicitly: combining two buffers of
//! different formats always goes through a [`Fish`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod convert;
pub mod error;
pub mod format;
pub mod pixel;
pub mod rect;

pub use convert::{Fish, srgb_eotf, srgb_oetf};
pub use error::*;
pub use format::*;
pub use pixel::{PixelFormat, REC709_LUMA, luminance_rec709};
pub use rect::*;

/// Prelude module for convenient imports.
///
/// ```
/// use picman_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::convert::Fish;
    pub use crate::error::{Error, Result};
    pub use crate::format::{BaseType, ComponentFormat, Format, FormatRegistry, Precision};
    pub use crate::pixel::PixelFormat;
    pub use crate::rect::Rect;
}
