//! Component codec: raw pixel bytes to and from normalized `f32`.
//!
//! Decoding never changes the transfer curve or the color model; it only
//! turns stored components into floats. [`decode_rgba`] and [`encode_rgba`]
//! use a four-slot RGBA view where gray pixels occupy all three color slots
//! and a missing alpha reads as 1.0.

use half::f16;

use crate::{Format, PixelFormat, Precision};

/// Decodes one component of `precision` from the start of `bytes`.
#[inline]
pub fn decode_component(precision: Precision, bytes: &[u8]) -> f32 {
    match precision {
        Precision::U8 => u8::read_ne(bytes).to_f32(),
        Precision::U16 => u16::read_ne(bytes).to_f32(),
        Precision::U32 => u32::read_ne(bytes).to_f32(),
        Precision::Half => f16::read_ne(bytes).to_f32(),
        Precision::Float => f32::read_ne(bytes),
    }
}

/// Encodes one component of `precision` to the start of `bytes`.
#[inline]
pub fn encode_component(precision: Precision, value: f32, bytes: &mut [u8]) {
    match precision {
        Precision::U8 => u8::from_f32(value).write_ne(bytes),
        Precision::U16 => u16::from_f32(value).write_ne(bytes),
        Precision::U32 => u32::from_f32(value).write_ne(bytes),
        Precision::Half => f16::from_f32(value).write_ne(bytes),
        Precision::Float => value.write_ne(bytes),
    }
}

/// Decodes every component of one pixel into `out` (length >= components).
#[inline]
pub fn decode_components(format: &Format, pixel: &[u8], out: &mut [f32]) {
    let precision = format.precision();
    let step = precision.bytes();
    for (i, slot) in out.iter_mut().take(format.components()).enumerate() {
        *slot = decode_component(precision, &pixel[i * step..]);
    }
}

/// Encodes the leading components of `values` into one pixel.
#[inline]
pub fn encode_components(format: &Format, values: &[f32], pixel: &mut [u8]) {
    let precision = format.precision();
    let step = precision.bytes();
    for (i, v) in values.iter().take(format.components()).enumerate() {
        encode_component(precision, *v, &mut pixel[i * step..]);
    }
}

/// Decodes one pixel into an RGBA view of its own model and transfer.
///
/// ```rust
/// use picman_core::{codec, Format};
///
/// let rgba = codec::decode_rgba(&Format::YA_U8, &[255, 0]);
/// assert_eq!(rgba, [1.0, 1.0, 1.0, 0.0]);
/// let rgba = codec::decode_rgba(&Format::RGB_U8, &[0, 255, 0]);
/// assert_eq!(rgba, [0.0, 1.0, 0.0, 1.0]);
/// ```
#[inline]
pub fn decode_rgba(format: &Format, pixel: &[u8]) -> [f32; 4] {
    let mut c = [0.0f32; 4];
    decode_components(format, pixel, &mut c);
    let alpha = if format.has_alpha() {
        c[format.color_components()]
    } else {
        1.0
    };
    if format.color_components() == 1 {
        [c[0], c[0], c[0], alpha]
    } else {
        [c[0], c[1], c[2], alpha]
    }
}

/// Encodes an RGBA view into one pixel of `format`.
///
/// Gray formats store the first slot; formats without alpha drop the fourth.
#[inline]
pub fn encode_rgba(format: &Format, rgba: &[f32; 4], pixel: &mut [u8]) {
    if format.color_components() == 1 {
        encode_components(format, &[rgba[0], rgba[3]], pixel);
    } else {
        encode_components(format, rgba, pixel);
    }
}
