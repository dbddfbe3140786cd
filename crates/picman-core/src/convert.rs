//! Conversion between pixel formats.
//!
//! A [`Fish`] converts runs of pixels from one [`Format`] to another. The
//! pipeline per pixel is:
//!
//! ```text
//! decode -> linearize -> RGB<->Gray -> re-encode transfer -> alpha -> encode
//! ```
//!
//! Stages that are not needed are skipped: same-model conversions between
//! formats of equal linearity never touch the transfer curve, so a
//! `R'G'B'A u8 -> R'G'B'A u16` conversion is a pure precision change.
//!
//! RGB to Gray uses Rec.709 luminance in linear light, Gray to RGB replicates
//! the gray value. Adding alpha writes 1.0, removing alpha discards it.
//!
//! # Usage
//!
//! ```rust
//! use picman_core::{Fish, Format};
//!
//! let fish = Fish::new(Format::RGBA_U8, Format::RGBA_FLOAT);
//! let src = [255u8, 0, 0, 255];
//! let mut dst = [0u8; 16];
//! fish.convert(&src, &mut dst, 1).unwrap();
//! ```

use crate::codec::{decode_rgba, encode_rgba};
use crate::pixel::luminance_rec709;
use crate::{BaseType, Error, Format, Result};

/// sRGB EOTF: decodes sRGB encoded values to linear light.
///
/// ```text
/// if V <= 0.04045:
///     L = V / 12.92
/// else:
///     L = ((V + 0.055) / 1.055)^2.4
/// ```
#[inline]
pub fn srgb_eotf(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB OETF: encodes linear light to sRGB.
///
/// ```text
/// if L <= 0.0031308:
///     V = L * 12.92
/// else:
///     V = 1.055 * L^(1/2.4) - 0.055
/// ```
#[inline]
pub fn srgb_oetf(l: f32) -> f32 {
    if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    /// Byte copy.
    Identity,
    /// Decode and encode only.
    Precision,
    /// Full pipeline through linear light.
    Linear,
}

/// Converter between two formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fish {
    src: Format,
    dst: Format,
    path: Path,
}

impl Fish {
    /// Plans a conversion from `src` to `dst`.
    pub fn new(src: Format, dst: Format) -> Self {
        let path = if src == dst {
            Path::Identity
        } else if src.is_linear() == dst.is_linear()
            && (src.base_type() == dst.base_type() || src.base_type() == BaseType::Gray)
        {
            // Replicating gray works in either transfer
            Path::Precision
        } else {
            Path::Linear
        };
        tracing::trace!(src = %src, dst = %dst, ?path, "fish planned");
        Self { src, dst, path }
    }

    /// Source format.
    pub fn source(&self) -> Format {
        self.src
    }

    /// Destination format.
    pub fn destination(&self) -> Format {
        self.dst
    }

    /// Whether conversion is a byte copy.
    pub fn is_identity(&self) -> bool {
        self.path == Path::Identity
    }

    /// Converts a single pixel to an RGBA view in the destination model and
    /// transfer, before encoding.
    #[inline]
    pub fn convert_to_rgba(&self, pixel: &[u8]) -> [f32; 4] {
        let mut c = decode_rgba(&self.src, pixel);
        if self.path == Path::Linear {
            if !self.src.is_linear() {
                for v in &mut c[..3] {
                    *v = srgb_eotf(*v);
                }
            }
            if self.src.base_type() == BaseType::Rgb && self.dst.base_type() == BaseType::Gray {
                let y = luminance_rec709([c[0], c[1], c[2]]);
                c[0] = y;
                c[1] = y;
                c[2] = y;
            }
            if !self.dst.is_linear() {
                for v in &mut c[..3] {
                    *v = srgb_oetf(*v);
                }
            }
        }
        c
    }

    /// Converts `n_pixels` pixels from `src` into `dst`.
    ///
    /// Fails with [`Error::Other`] if either slice is too short.
    pub fn convert(&self, src: &[u8], dst: &mut [u8], n_pixels: usize) -> Result<()> {
        let sbpp = self.src.bytes_per_pixel();
        let dbpp = self.dst.bytes_per_pixel();
        if src.len() < n_pixels * sbpp || dst.len() < n_pixels * dbpp {
            return Err(Error::other(format!(
                "conversion {} -> {} of {} pixels: buffers hold {} and {} bytes",
                self.src,
                self.dst,
                n_pixels,
                src.len(),
                dst.len()
            )));
        }

        if self.is_identity() {
            dst[..n_pixels * sbpp].copy_from_slice(&src[..n_pixels * sbpp]);
            return Ok(());
        }

        for (s, d) in src
            .chunks_exact(sbpp)
            .zip(dst.chunks_exact_mut(dbpp))
            .take(n_pixels)
        {
            let rgba = self.convert_to_rgba(s);
            encode_rgba(&self.dst, &rgba, d);
        }
        Ok(())
    }

    /// Converts a whole slice, returning a newly allocated destination.
    pub fn convert_vec(&self, src: &[u8]) -> Result<Vec<u8>> {
        let n = src.len() / self.src.bytes_per_pixel();
        let mut out = vec![0u8; n * self.dst.bytes_per_pixel()];
        self.convert(src, &mut out, n)?;
        Ok(out)
    }
}
