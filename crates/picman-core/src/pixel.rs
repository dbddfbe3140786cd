//! Component storage types.
//!
//! Every [`Precision`](crate::Precision) maps to one Rust type implementing
//! [`PixelFormat`]. Integer types normalize to [0.0, 1.0]; float types pass
//! values through unchanged, so float buffers may hold values outside the
//! unit range.
//!
//! # Dependencies
//!
//! - `half` crate for `f16` support

use half::f16;

/// Rec.709 luminance coefficient for red channel.
///
/// Used in the standard luminance formula: `Y = 0.2126*R + 0.7152*G + 0.0722*B`
pub const REC709_LUMA_R: f32 = 0.2126;

/// Rec.709 luminance coefficient for green channel.
pub const REC709_LUMA_G: f32 = 0.7152;

/// Rec.709 luminance coefficient for blue channel.
pub const REC709_LUMA_B: f32 = 0.0722;

/// Rec.709 luminance coefficients as an array [R, G, B].
pub const REC709_LUMA: [f32; 3] = [REC709_LUMA_R, REC709_LUMA_G, REC709_LUMA_B];

/// Rec.709 luminance of linear RGB values.
///
/// ```
/// use picman_core::pixel::luminance_rec709;
/// let luma = luminance_rec709([0.5, 0.3, 0.2]);
/// assert!((luma - 0.3353).abs() < 0.0001);
/// ```
#[inline]
pub fn luminance_rec709(rgb: [f32; 3]) -> f32 {
    rgb[0] * REC709_LUMA_R + rgb[1] * REC709_LUMA_G + rgb[2] * REC709_LUMA_B
}

/// Trait for component storage types.
///
/// ```
/// use picman_core::PixelFormat;
///
/// let byte_val: u8 = 128;
/// assert!((byte_val.to_f32() - 0.502).abs() < 0.01);
///
/// let back: u16 = PixelFormat::from_f32(0.5);
/// assert_eq!(back, 32768);
/// ```
pub trait PixelFormat: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Number of bits per component.
    const BITS: u32;

    /// Whether this is a floating-point type.
    const IS_FLOAT: bool;

    /// Size in bytes.
    const BYTES: usize = (Self::BITS / 8) as usize;

    /// Convert to f32. Integers normalize to [0.0, 1.0].
    fn to_f32(self) -> f32;

    /// Convert from f32. Integers clamp to [0.0, 1.0] and round.
    fn from_f32(v: f32) -> Self;

    /// Reads one native-endian component from the start of `bytes`.
    fn read_ne(bytes: &[u8]) -> Self;

    /// Writes one native-endian component to the start of `bytes`.
    fn write_ne(self, bytes: &mut [u8]);
}

impl PixelFormat for u8 {
    const BITS: u32 = 8;
    const IS_FLOAT: bool = false;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 255.0
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0]
    }

    #[inline]
    fn write_ne(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }
}

impl PixelFormat for u16 {
    const BITS: u32 = 16;
    const IS_FLOAT: bool = false;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 65535.0
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * 65535.0).round() as u16
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        u16::from_ne_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn write_ne(self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&self.to_ne_bytes());
    }
}

impl PixelFormat for u32 {
    const BITS: u32 = 32;
    const IS_FLOAT: bool = false;

    #[inline]
    fn to_f32(self) -> f32 {
        (self as f64 / u32::MAX as f64) as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        // f64 keeps the full 32-bit range representable
        (v.clamp(0.0, 1.0) as f64 * u32::MAX as f64).round() as u32
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn write_ne(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

impl PixelFormat for f16 {
    const BITS: u32 = 16;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        f16::from_ne_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn write_ne(self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&self.to_ne_bytes());
    }
}

impl PixelFormat for f32 {
    const BITS: u32 = 32;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn write_ne(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_u8_conversion() {
        assert_eq!(0u8.to_f32(), 0.0);
        assert_eq!(255u8.to_f32(), 1.0);
        assert_eq!(u8::from_f32(0.5), 128);
        assert_eq!(u8::from_f32(-1.0), 0);
        assert_eq!(u8::from_f32(2.0), 255);
    }

    #[test]
    fn test_u32_extremes() {
        assert_eq!(u32::from_f32(1.0), u32::MAX);
        assert_eq!(u32::from_f32(0.0), 0);
        assert_relative_eq!(u32::MAX.to_f32(), 1.0);
    }

    #[test]
    fn test_integer_round_trip() {
        for v in 0..=255u8 {
            assert_eq!(u8::from_f32(v.to_f32()), v);
        }
        for v in (0..=65535u16).step_by(97) {
            assert_eq!(u16::from_f32(v.to_f32()), v);
        }
    }

    #[test]
    fn test_native_endian_io() {
        let mut buf = [0u8; 4];
        1.5f32.write_ne(&mut buf);
        assert_eq!(f32::read_ne(&buf), 1.5);

        let mut buf = [0u8; 2];
        f16::from_f32(0.25).write_ne(&mut buf);
        assert_relative_eq!(f16::read_ne(&buf).to_f32(), 0.25);

        0xBEEFu16.write_ne(&mut buf);
        assert_eq!(u16::read_ne(&buf), 0xBEEF);
    }

    #[test]
    fn test_luminance() {
        assert_relative_eq!(luminance_rec709([1.0, 1.0, 1.0]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(luminance_rec709([1.0, 0.0, 0.0]), REC709_LUMA_R);
    }
}
