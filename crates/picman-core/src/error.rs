//! Error types for picman-core operations.
//!
//! This module provides the error taxonomy shared by every layer that touches
//! pixel data: format lookups, conversions, tiled buffers and region iteration.
//!
//! # Overview
//!
//! The [`Error`] enum covers all failure modes of the pixel pipeline:
//! - Region geometry (size mismatch between lockstep regions, out of bounds)
//! - Pixel formats (unknown or unsupported formats, incompatible formats)
//! - Tile memory (cache exhausted, tile already checked out)
//! - Cancellation between iteration steps
//!
//! Every error is fatal to the operation that raised it. Nothing here is
//! retried; the error surfaces to the editing command that started the work.
//!
//! # Usage
//!
//! ```rust
//! use picman_core::{Error, Rect, Result};
//!
//! fn check(region: Rect, width: u32, height: u32) -> Result<()> {
//!     if !Rect::from_size(width, height).contains_rect(&region) {
//!         return Err(Error::out_of_bounds(region, width, height));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(Rect::new(0, 0, 10, 10), 64, 64).is_ok());
//! assert!(check(Rect::new(60, 0, 10, 10), 64, 64).is_err());
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - For derive macro error implementation

use crate::Rect;
use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while processing pixel buffers.
///
/// # Categories
///
/// - **Geometry**: [`SizeMismatch`](Error::SizeMismatch), [`OutOfBounds`](Error::OutOfBounds),
///   [`InvalidDimensions`](Error::InvalidDimensions)
/// - **Formats**: [`FormatMismatch`](Error::FormatMismatch), [`UnsupportedFormat`](Error::UnsupportedFormat)
/// - **Tile memory**: [`CacheExhausted`](Error::CacheExhausted), [`TileBusy`](Error::TileBusy)
/// - **Control**: [`Cancelled`](Error::Cancelled)
/// - **Environment**: [`Io`](Error::Io), [`Config`](Error::Config)
#[derive(Debug, Error)]
pub enum Error {
    /// Regions iterated in lockstep do not have the same size.
    ///
    /// The first registered region defines the expected size.
    #[error("region size mismatch: {a_width}x{a_height} vs {b_width}x{b_height}")]
    SizeMismatch {
        /// Expected width
        a_width: u32,
        /// Expected height
        a_height: u32,
        /// Offending width
        b_width: u32,
        /// Offending height
        b_height: u32,
    },

    /// A rectangle extends beyond the bounds of its buffer.
    ///
    /// # Example
    ///
    /// ```rust
    /// use picman_core::{Error, Rect};
    ///
    /// let err = Error::out_of_bounds(Rect::new(100, 50, 10, 10), 80, 60);
    /// assert!(err.to_string().contains("100"));
    /// assert!(err.is_bounds_error());
    /// ```
    #[error("region ({rx}, {ry}, {rw}x{rh}) exceeds buffer bounds {width}x{height}")]
    OutOfBounds {
        /// Region X origin
        rx: u32,
        /// Region Y origin
        ry: u32,
        /// Region width
        rw: u32,
        /// Region height
        rh: u32,
        /// Buffer width
        width: u32,
        /// Buffer height
        height: u32,
    },

    /// Two formats were combined without an explicit conversion step.
    #[error("format mismatch: expected {expected}, got {got}")]
    FormatMismatch {
        /// Format the operation required
        expected: String,
        /// Format that was supplied
        got: String,
    },

    /// The format is not part of the registry or cannot be used here.
    ///
    /// Indexed formats are the common case: palette lookup belongs to the
    /// image, not to the format registry.
    #[error("unsupported pixel format: {format}")]
    UnsupportedFormat {
        /// Format name or description
        format: String,
    },

    /// The tile cache has no evictable tile left for a new acquisition.
    ///
    /// Every resident tile is pinned, so the budget cannot be honoured.
    #[error("tile cache exhausted: all {budget} tiles are pinned")]
    CacheExhausted {
        /// Tile-count budget of the cache
        budget: usize,
    },

    /// A tile was requested while it is checked out for writing.
    #[error("tile ({tx}, {ty}) of buffer {buffer} is checked out for writing")]
    TileBusy {
        /// Owning buffer id
        buffer: u64,
        /// Tile column
        tx: u32,
        /// Tile row
        ty: u32,
    },

    /// Invalid buffer or tile dimensions.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// The abort flag was raised between two iteration steps.
    #[error("operation cancelled after {steps} steps")]
    Cancelled {
        /// Steps completed before the abort was observed
        steps: usize,
    },

    /// Configuration value could not be parsed or is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from a swap-backed tile store or a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    ///
    /// Prefer specific error variants when possible.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::SizeMismatch`] error.
    #[inline]
    pub fn size_mismatch(a: (u32, u32), b: (u32, u32)) -> Self {
        Self::SizeMismatch {
            a_width: a.0,
            a_height: a.1,
            b_width: b.0,
            b_height: b.1,
        }
    }

    /// Creates an [`Error::OutOfBounds`] error for `region` inside a
    /// `width` x `height` buffer.
    #[inline]
    pub fn out_of_bounds(region: Rect, width: u32, height: u32) -> Self {
        Self::OutOfBounds {
            rx: region.x,
            ry: region.y,
            rw: region.width,
            rh: region.height,
            width,
            height,
        }
    }

    /// Creates an [`Error::FormatMismatch`] error.
    #[inline]
    pub fn format_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::FormatMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` if this is a geometry error.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::SizeMismatch { .. })
    }

    /// Returns `true` if this is a format error.
    #[inline]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::FormatMismatch { .. } | Self::UnsupportedFormat { .. }
        )
    }

    /// Returns `true` if tile memory could not be provided.
    #[inline]
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheExhausted { .. } | Self::TileBusy { .. })
    }

    /// Returns `true` if the operation was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds() {
        let err = Error::out_of_bounds(Rect::new(100, 50, 8, 8), 80, 60);
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
        assert!(msg.contains("80x60"));
        assert!(err.is_bounds_error());
    }

    #[test]
    fn test_size_mismatch() {
        let err = Error::size_mismatch((100, 100), (200, 200));
        let msg = err.to_string();
        assert!(msg.contains("100x100"));
        assert!(msg.contains("200x200"));
        assert!(err.is_bounds_error());
    }

    #[test]
    fn test_cache_exhausted() {
        let err = Error::CacheExhausted { budget: 4 };
        assert!(err.to_string().contains('4'));
        assert!(err.is_cache_error());
        assert!(!err.is_bounds_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "swap file missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_format_errors() {
        assert!(Error::unsupported_format("Indexed u8").is_format_error());
        assert!(Error::format_mismatch("R'G'B'A u8", "Y float").is_format_error());
    }
}
