//! Layer modes and per-pixel blend formulas.
//!
//! Pixels are straight-alpha RGBA `f32` in the destination's own model and
//! transfer; gray pixels arrive with the gray value replicated into the three
//! color slots. Every mode reduces to one of three shapes:
//!
//! - separable and HSV modes blend the colors with `B(cb, cs)` and composite
//!   the result over the destination (Porter-Duff over),
//! - alpha modes ([`LayerMode::Erase`], [`LayerMode::AntiErase`]) only touch
//!   destination alpha,
//! - [`LayerMode::Replace`] interpolates color and alpha towards the source.
//!
//! # Example
//!
//! ```rust
//! use picman_ops::mode::LayerMode;
//!
//! let red = [1.0, 0.0, 0.0, 1.0];
//! let blue = [0.0, 0.0, 1.0, 1.0];
//!
//! let out = LayerMode::Normal.composite(blue, red, 0.5, 0, 0);
//! assert!((out[0] - 0.5).abs() < 1e-6);
//! assert!((out[2] - 0.5).abs() < 1e-6);
//! ```

use std::fmt;
use std::str::FromStr;

use picman_core::{BaseType, Format};

use crate::{OpsError, OpsResult};

/// How a source pixel is merged into a destination pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerMode {
    /// Source over destination.
    #[default]
    Normal,
    /// Source pixels are kept or dropped by a positional threshold.
    Dissolve,
    /// Destination over source: paints only where the destination is
    /// transparent.
    Behind,
    /// `cb * cs`.
    Multiply,
    /// `1 - (1 - cb)(1 - cs)`.
    Screen,
    /// Multiply or screen depending on the destination.
    Overlay,
    /// `|cb - cs|`.
    Difference,
    /// `cb + cs`.
    Addition,
    /// `cb - cs`, floored at zero.
    Subtract,
    /// `min(cb, cs)`.
    DarkenOnly,
    /// `max(cb, cs)`.
    LightenOnly,
    /// Source hue with destination saturation and value.
    Hue,
    /// Source saturation with destination hue and value.
    Saturation,
    /// Source hue and saturation with destination lightness (HSL).
    Color,
    /// Source value with destination hue and saturation.
    Value,
    /// `cb / cs`.
    Divide,
    /// `cb / (1 - cs)`.
    Dodge,
    /// `1 - (1 - cb) / cs`.
    Burn,
    /// Multiply or screen depending on the source.
    HardLight,
    /// Softened hard light.
    SoftLight,
    /// `cb - cs + 0.5`.
    GrainExtract,
    /// `cb + cs - 0.5`.
    GrainMerge,
    /// Removes the source color from the destination, turning it into
    /// transparency.
    ColorErase,
    /// Lowers destination alpha by source alpha.
    Erase,
    /// Replaces destination color and alpha.
    Replace,
    /// Raises destination alpha by source alpha.
    AntiErase,
}

impl LayerMode {
    /// Every mode, in menu order.
    pub const ALL: [LayerMode; 26] = [
        Self::Normal,
        Self::Dissolve,
        Self::Behind,
        Self::Multiply,
        Self::Screen,
        Self::Overlay,
        Self::Difference,
        Self::Addition,
        Self::Subtract,
        Self::DarkenOnly,
        Self::LightenOnly,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Value,
        Self::Divide,
        Self::Dodge,
        Self::Burn,
        Self::HardLight,
        Self::SoftLight,
        Self::GrainExtract,
        Self::GrainMerge,
        Self::ColorErase,
        Self::Erase,
        Self::Replace,
        Self::AntiErase,
    ];

    /// Stable lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Dissolve => "dissolve",
            Self::Behind => "behind",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Difference => "difference",
            Self::Addition => "addition",
            Self::Subtract => "subtract",
            Self::DarkenOnly => "darken-only",
            Self::LightenOnly => "lighten-only",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Value => "value",
            Self::Divide => "divide",
            Self::Dodge => "dodge",
            Self::Burn => "burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::GrainExtract => "grain-extract",
            Self::GrainMerge => "grain-merge",
            Self::ColorErase => "color-erase",
            Self::Erase => "erase",
            Self::Replace => "replace",
            Self::AntiErase => "anti-erase",
        }
    }

    /// Looks a mode up by name. Case and `_`/`-` are not significant.
    pub fn from_name(name: &str) -> OpsResult<Self> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == key)
            .ok_or_else(|| OpsError::UnsupportedMode(format!("unknown layer mode '{name}'")))
    }

    /// Whether the mode blends each color channel independently.
    pub const fn is_separable(&self) -> bool {
        !matches!(
            self,
            Self::Hue | Self::Saturation | Self::Color | Self::Value | Self::ColorErase
        ) && !self.is_alpha_only()
    }

    /// Whether the mode only changes destination alpha.
    pub const fn is_alpha_only(&self) -> bool {
        matches!(self, Self::Erase | Self::AntiErase)
    }

    /// Whether the mode needs three distinct color channels.
    pub const fn needs_color(&self) -> bool {
        matches!(self, Self::Hue | Self::Saturation | Self::Color | Self::ColorErase)
    }

    /// Whether the mode needs a destination alpha channel.
    pub const fn needs_alpha(&self) -> bool {
        matches!(self, Self::Behind | Self::Erase | Self::AntiErase)
    }

    /// Fails with [`OpsError::UnsupportedMode`] when the mode has no formula
    /// for destination pixels of `format`.
    pub fn check_format(&self, format: &Format) -> OpsResult<()> {
        if self.needs_color() && format.base_type() == BaseType::Gray {
            return Err(OpsError::UnsupportedMode(format!(
                "{} is undefined for grayscale format {format}",
                self.name()
            )));
        }
        if self.needs_alpha() && !format.has_alpha() {
            return Err(OpsError::UnsupportedMode(format!(
                "{} needs an alpha channel, {format} has none",
                self.name()
            )));
        }
        Ok(())
    }

    /// Merges `src` into `dst` with strength `opacity` (opacity times mask).
    ///
    /// `x` and `y` are destination coordinates, used by [`LayerMode::Dissolve`].
    pub fn composite(&self, dst: [f32; 4], src: [f32; 4], opacity: f32, x: u32, y: u32) -> [f32; 4] {
        let sa = src[3] * opacity;
        match self {
            Self::Normal => over_pixel([src[0], src[1], src[2], sa], dst),
            Self::Dissolve => {
                if dissolve_noise(x, y) < sa {
                    [src[0], src[1], src[2], 1.0]
                } else {
                    dst
                }
            }
            Self::Behind => over_pixel(dst, [src[0], src[1], src[2], sa]),
            Self::Erase => [dst[0], dst[1], dst[2], dst[3] * (1.0 - sa)],
            Self::AntiErase => [dst[0], dst[1], dst[2], dst[3] + (1.0 - dst[3]) * sa],
            Self::Replace => replace_pixel(dst, src, opacity),
            Self::ColorErase => color_erase_pixel(dst, src, sa),
            _ => {
                let cb = [dst[0], dst[1], dst[2]];
                let cs = [src[0], src[1], src[2]];
                let blended = self.blend_rgb(cb, cs);
                // Over a transparent destination the source shows unblended
                let da = dst[3];
                let mixed = [
                    cs[0] + (blended[0] - cs[0]) * da,
                    cs[1] + (blended[1] - cs[1]) * da,
                    cs[2] + (blended[2] - cs[2]) * da,
                ];
                over_pixel([mixed[0], mixed[1], mixed[2], sa], dst)
            }
        }
    }

    /// Blend function `B(cb, cs)` of the color modes.
    ///
    /// Alpha, dissolve and replace modes return the source unchanged.
    pub fn blend_rgb(&self, cb: [f32; 3], cs: [f32; 3]) -> [f32; 3] {
        match self {
            Self::Hue => {
                let (hs, ss, _) = rgb_to_hsv(cs);
                if ss == 0.0 {
                    return cb;
                }
                let (_, sb, vb) = rgb_to_hsv(cb);
                hsv_to_rgb(hs, sb, vb)
            }
            Self::Saturation => {
                let (hb, _, vb) = rgb_to_hsv(cb);
                let (_, ss, _) = rgb_to_hsv(cs);
                hsv_to_rgb(hb, ss, vb)
            }
            Self::Value => {
                let (hb, sb, _) = rgb_to_hsv(cb);
                let (_, _, vs) = rgb_to_hsv(cs);
                hsv_to_rgb(hb, sb, vs)
            }
            Self::Color => {
                let (hs, ss, _) = rgb_to_hsl(cs);
                let (_, _, lb) = rgb_to_hsl(cb);
                hsl_to_rgb(hs, ss, lb)
            }
            _ => [
                self.blend_channel(cb[0], cs[0]),
                self.blend_channel(cb[1], cs[1]),
                self.blend_channel(cb[2], cs[2]),
            ],
        }
    }

    /// Separable blend of one channel, `cb` destination and `cs` source.
    #[inline]
    pub fn blend_channel(&self, cb: f32, cs: f32) -> f32 {
        match self {
            Self::Multiply => cb * cs,
            Self::Screen => 1.0 - (1.0 - cb) * (1.0 - cs),
            Self::Overlay => {
                if cb < 0.5 {
                    2.0 * cb * cs
                } else {
                    1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
                }
            }
            Self::Difference => (cb - cs).abs(),
            Self::Addition => cb + cs,
            Self::Subtract => (cb - cs).max(0.0),
            Self::DarkenOnly => cb.min(cs),
            Self::LightenOnly => cb.max(cs),
            Self::Divide => {
                if cs <= 0.0 {
                    if cb > 0.0 { 1.0 } else { 0.0 }
                } else {
                    (cb / cs).clamp(0.0, 1.0)
                }
            }
            Self::Dodge => {
                if cb <= 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cb / (1.0 - cs)).min(1.0)
                }
            }
            Self::Burn => {
                if cb >= 1.0 {
                    1.0
                } else if cs <= 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cb) / cs).min(1.0)
                }
            }
            Self::HardLight => {
                if cs < 0.5 {
                    2.0 * cb * cs
                } else {
                    1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
                }
            }
            Self::SoftLight => {
                if cs <= 0.5 {
                    cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
                } else {
                    let d = if cb <= 0.25 {
                        ((16.0 * cb - 12.0) * cb + 4.0) * cb
                    } else {
                        cb.sqrt()
                    };
                    cb + (2.0 * cs - 1.0) * (d - cb)
                }
            }
            Self::GrainExtract => cb - cs + 0.5,
            Self::GrainMerge => cb + cs - 0.5,
            _ => cs,
        }
    }
}

impl fmt::Display for LayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerMode {
    type Err = OpsError;

    fn from_str(s: &str) -> OpsResult<Self> {
        Self::from_name(s)
    }
}

/// Composites foreground over background (Porter-Duff over), straight alpha.
#[inline]
pub fn over_pixel(fg: [f32; 4], bg: [f32; 4]) -> [f32; 4] {
    let fg_a = fg[3];
    let bg_a = bg[3];
    let out_a = fg_a + bg_a * (1.0 - fg_a);

    if out_a < 1e-8 {
        return [0.0, 0.0, 0.0, 0.0];
    }

    let inv_out_a = 1.0 / out_a;
    [
        (fg[0] * fg_a + bg[0] * bg_a * (1.0 - fg_a)) * inv_out_a,
        (fg[1] * fg_a + bg[1] * bg_a * (1.0 - fg_a)) * inv_out_a,
        (fg[2] * fg_a + bg[2] * bg_a * (1.0 - fg_a)) * inv_out_a,
        out_a,
    ]
}

fn replace_pixel(dst: [f32; 4], src: [f32; 4], t: f32) -> [f32; 4] {
    let out_a = dst[3] + (src[3] - dst[3]) * t;
    if out_a < 1e-8 {
        return [0.0, 0.0, 0.0, 0.0];
    }
    let wd = dst[3] * (1.0 - t) / out_a;
    let ws = src[3] * t / out_a;
    [
        dst[0] * wd + src[0] * ws,
        dst[1] * wd + src[1] * ws,
        dst[2] * wd + src[2] * ws,
        out_a,
    ]
}

fn color_erase_pixel(dst: [f32; 4], src: [f32; 4], t: f32) -> [f32; 4] {
    let mut alpha = 0.0f32;
    for c in 0..3 {
        let (d, s) = (dst[c], src[c]);
        let a = if d > s && s < 1.0 {
            (d - s) / (1.0 - s)
        } else if d < s && s > 0.0 {
            (s - d) / s
        } else {
            0.0
        };
        alpha = alpha.max(a);
    }

    let mut erased = [0.0, 0.0, 0.0, dst[3] * alpha];
    if alpha > 1e-8 {
        for c in 0..3 {
            erased[c] = (dst[c] - src[c]) / alpha + src[c];
        }
    } else {
        erased[..3].copy_from_slice(&dst[..3]);
    }

    [
        dst[0] + (erased[0] - dst[0]) * t,
        dst[1] + (erased[1] - dst[1]) * t,
        dst[2] + (erased[2] - dst[2]) * t,
        dst[3] + (erased[3] - dst[3]) * t,
    ]
}

/// Positional threshold in [0, 1) for dissolve.
///
/// Deterministic per destination pixel so repeated renders agree.
#[inline]
pub fn dissolve_noise(x: u32, y: u32) -> f32 {
    let mut h = ((x as u64) << 32) | y as u64;
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    (h >> 40) as f32 / (1u64 << 24) as f32
}

fn rgb_to_hsv([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    (hue(r, g, b, max, delta), s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    if s <= 0.0 {
        return [v, v, v];
    }
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

fn rgb_to_hsl([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let l = (max + min) * 0.5;
    let s = if delta <= 0.0 {
        0.0
    } else if l <= 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };
    (hue(r, g, b, max, delta), s, l)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    if s <= 0.0 {
        return [l, l, l];
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    [
        hsl_channel(m1, m2, h + 1.0 / 3.0),
        hsl_channel(m1, m2, h),
        hsl_channel(m1, m2, h - 1.0 / 3.0),
    ]
}

fn hsl_channel(m1: f32, m2: f32, h: f32) -> f32 {
    let h = h.rem_euclid(1.0);
    if h < 1.0 / 6.0 {
        m1 + (m2 - m1) * h * 6.0
    } else if h < 0.5 {
        m2
    } else if h < 2.0 / 3.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - h) * 6.0
    } else {
        m1
    }
}

/// Hue in [0, 1).
fn hue(r: f32, g: f32, b: f32, max: f32, delta: f32) -> f32 {
    if delta <= 0.0 {
        return 0.0;
    }
    let h = if max == r {
        (g - b) / delta
    } else if max == g {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    (h / 6.0).rem_euclid(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use picman_core::{BaseType, Precision};

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

    #[test]
    fn test_names_unique_and_parse() {
        for mode in LayerMode::ALL {
            assert_eq!(LayerMode::from_name(mode.name()).unwrap(), mode);
        }
        assert_eq!(LayerMode::from_name("Darken_Only").unwrap(), LayerMode::DarkenOnly);
        assert_eq!("grain-merge".parse::<LayerMode>().unwrap(), LayerMode::GrainMerge);
    }

    #[test]
    fn test_unknown_name() {
        let err = LayerMode::from_name("vivid-light").unwrap_err();
        assert!(matches!(err, OpsError::UnsupportedMode(_)));
    }

    #[test]
    fn test_normal_full_opacity() {
        assert_eq!(LayerMode::Normal.composite(BLUE, RED, 1.0, 0, 0), RED);
    }

    #[test]
    fn test_normal_transparent_source() {
        let src = [1.0, 0.0, 0.0, 0.0];
        let out = LayerMode::Normal.composite(BLUE, src, 1.0, 3, 4);
        assert_relative_eq!(out[2], 1.0);
        assert_relative_eq!(out[3], 1.0);
    }

    #[test]
    fn test_over_pixel_empty() {
        assert_eq!(over_pixel([1.0, 1.0, 1.0, 0.0], [1.0, 1.0, 1.0, 0.0]), [0.0; 4]);
    }

    #[test]
    fn test_separable_formulas() {
        let (cb, cs) = (0.8, 0.2);
        assert_relative_eq!(LayerMode::Multiply.blend_channel(cb, cs), 0.16, epsilon = 1e-6);
        assert_relative_eq!(LayerMode::Screen.blend_channel(cb, cs), 0.84, epsilon = 1e-6);
        assert_relative_eq!(LayerMode::Difference.blend_channel(cb, cs), 0.6, epsilon = 1e-6);
        assert_relative_eq!(LayerMode::Subtract.blend_channel(cs, cb), 0.0);
        assert_relative_eq!(LayerMode::DarkenOnly.blend_channel(cb, cs), 0.2);
        assert_relative_eq!(LayerMode::LightenOnly.blend_channel(cb, cs), 0.8);
        assert_relative_eq!(LayerMode::GrainExtract.blend_channel(0.5, 0.5), 0.5);
        assert_relative_eq!(LayerMode::GrainMerge.blend_channel(0.5, 0.5), 0.5);
        assert_relative_eq!(LayerMode::Divide.blend_channel(0.25, 0.5), 0.5);
        assert_relative_eq!(LayerMode::Dodge.blend_channel(0.25, 0.5), 0.5);
        assert_relative_eq!(LayerMode::Burn.blend_channel(0.75, 0.5), 0.5);
    }

    #[test]
    fn test_overlay_and_hard_light_swap_roles() {
        for (a, b) in [(0.2, 0.7), (0.7, 0.2), (0.4, 0.9)] {
            assert_relative_eq!(
                LayerMode::Overlay.blend_channel(a, b),
                LayerMode::HardLight.blend_channel(b, a),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_soft_light_neutral_gray() {
        for cb in [0.1, 0.3, 0.9] {
            assert_relative_eq!(LayerMode::SoftLight.blend_channel(cb, 0.5), cb, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_hsv_round_trip() {
        for rgb in [[0.2, 0.4, 0.6], [0.9, 0.1, 0.3], [0.5, 0.5, 0.5]] {
            let (h, s, v) = rgb_to_hsv(rgb);
            let back = hsv_to_rgb(h, s, v);
            for c in 0..3 {
                assert_relative_eq!(back[c], rgb[c], epsilon = 1e-5);
            }
            let (h, s, l) = rgb_to_hsl(rgb);
            let back = hsl_to_rgb(h, s, l);
            for c in 0..3 {
                assert_relative_eq!(back[c], rgb[c], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_hue_keeps_value() {
        let cb = [0.0, 0.0, 0.5];
        let out = LayerMode::Hue.blend_rgb(cb, [1.0, 0.0, 0.0]);
        assert_relative_eq!(out[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[2], 0.0, epsilon = 1e-6);
        // Gray source has no hue
        assert_eq!(LayerMode::Hue.blend_rgb(cb, [0.3, 0.3, 0.3]), cb);
    }

    #[test]
    fn test_value_takes_source_brightness() {
        let out = LayerMode::Value.blend_rgb([1.0, 0.0, 0.0], [0.25, 0.25, 0.25]);
        assert_relative_eq!(out[0], 0.25, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_erase_and_anti_erase() {
        let dst = [0.3, 0.3, 0.3, 0.8];
        let out = LayerMode::Erase.composite(dst, RED, 0.5, 0, 0);
        assert_relative_eq!(out[3], 0.4);
        assert_relative_eq!(out[0], 0.3);
        let out = LayerMode::AntiErase.composite([0.3, 0.3, 0.3, 0.5], RED, 0.5, 0, 0);
        assert_relative_eq!(out[3], 0.75);
    }

    #[test]
    fn test_behind_only_shows_through_transparency() {
        assert_eq!(LayerMode::Behind.composite(BLUE, RED, 1.0, 0, 0), BLUE);
        let out = LayerMode::Behind.composite([0.0; 4], RED, 1.0, 0, 0);
        assert_eq!(out, RED);
    }

    #[test]
    fn test_replace() {
        let out = LayerMode::Replace.composite(BLUE, [1.0, 0.0, 0.0, 0.5], 1.0, 0, 0);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[2], 0.0);
        assert_relative_eq!(out[3], 0.5);
        let half = LayerMode::Replace.composite(BLUE, RED, 0.5, 0, 0);
        assert_relative_eq!(half[0], 0.5);
        assert_relative_eq!(half[2], 0.5);
    }

    #[test]
    fn test_color_erase_removes_matching_color() {
        let out = LayerMode::ColorErase.composite(RED, RED, 1.0, 0, 0);
        assert_relative_eq!(out[3], 0.0);
        let untouched = LayerMode::ColorErase.composite(BLUE, RED, 0.0, 0, 0);
        assert_eq!(untouched, BLUE);
    }

    #[test]
    fn test_dissolve_deterministic() {
        let a = LayerMode::Dissolve.composite(BLUE, RED, 0.5, 10, 20);
        let b = LayerMode::Dissolve.composite(BLUE, RED, 0.5, 10, 20);
        assert_eq!(a, b);
        assert_eq!(LayerMode::Dissolve.composite(BLUE, RED, 1.0, 7, 9), RED);
        assert_eq!(LayerMode::Dissolve.composite(BLUE, RED, 0.0, 7, 9), BLUE);
    }

    #[test]
    fn test_dissolve_density() {
        let kept = (0..64u32)
            .flat_map(|y| (0..64u32).map(move |x| (x, y)))
            .filter(|&(x, y)| dissolve_noise(x, y) < 0.25)
            .count();
        let frac = kept as f32 / 4096.0;
        assert!((0.2..0.3).contains(&frac), "dissolve density {frac}");
    }

    #[test]
    fn test_check_format() {
        let gray = Format::new(BaseType::Gray, Precision::U8, false).unwrap();
        let rgb = Format::RGB_U8;
        assert!(LayerMode::Multiply.check_format(&gray).is_ok());
        assert!(matches!(
            LayerMode::Hue.check_format(&gray),
            Err(OpsError::UnsupportedMode(_))
        ));
        assert!(LayerMode::Hue.check_format(&rgb).is_ok());
        assert!(LayerMode::Erase.check_format(&rgb).is_err());
        assert!(LayerMode::Erase.check_format(&Format::RGBA_U8).is_ok());
    }

    #[test]
    fn test_mode_classes() {
        assert!(LayerMode::Multiply.is_separable());
        assert!(!LayerMode::Hue.is_separable());
        assert!(!LayerMode::Erase.is_separable());
        assert!(LayerMode::AntiErase.is_alpha_only());
    }
}
