//! Pixel formats and the format registry.
//!
//! A [`Format`] is the canonical encoding of one pixel: color model, component
//! precision, presence of alpha and whether components are stored in linear
//! light or perceptually (sRGB) encoded.
//!
//! # Canonical Linearity
//!
//! Integer precisions up to 16 bits are perceptual, wider and floating point
//! precisions are linear:
//!
//! | precision | RGB            | RGB + alpha     | Gray        |
//! |-----------|----------------|-----------------|-------------|
//! | u8        | `R'G'B' u8`    | `R'G'B'A u8`    | `Y' u8`     |
//! | u16       | `R'G'B' u16`   | `R'G'B'A u16`   | `Y' u16`    |
//! | u32       | `RGB u32`      | `RGBA u32`      | `Y u32`     |
//! | half      | `RGB half`     | `RGBA half`     | `Y half`    |
//! | float     | `RGB float`    | `RGBA float`    | `Y float`   |
//!
//! Non-canonical linearity is still representable through
//! [`Format::with_linear`], for example a linear u8 mask (`Y u8`).
//!
//! # Usage
//!
//! ```rust
//! use picman_core::{BaseType, FormatRegistry, Precision};
//!
//! let registry = FormatRegistry::new();
//! let fmt = registry.format_for(BaseType::Rgb, Precision::U8, true).unwrap();
//! assert_eq!(fmt.name(), "R'G'B'A u8");
//! assert_eq!(fmt.bytes_per_pixel(), 4);
//! assert_eq!(registry.description(&fmt), "RGB-alpha");
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::{Error, Result};

/// Color model of a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaseType {
    /// Red, green, blue.
    #[default]
    Rgb,
    /// Single luminance channel.
    Gray,
    /// Palette indices. Resolved by the image, never by the registry.
    Indexed,
}

impl BaseType {
    /// Human readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Gray => "Grayscale",
            Self::Indexed => "Indexed",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage type of one pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    /// 8-bit unsigned integer.
    #[default]
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit IEEE half float.
    Half,
    /// 32-bit IEEE float.
    Float,
}

impl Precision {
    /// All precisions, narrowest first.
    pub const ALL: [Precision; 5] = [
        Precision::U8,
        Precision::U16,
        Precision::U32,
        Precision::Half,
        Precision::Float,
    ];

    /// Size of one component in bytes.
    #[inline]
    pub const fn bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::Half => 2,
            Self::U32 | Self::Float => 4,
        }
    }

    /// Whether components are floating point.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Half | Self::Float)
    }

    /// Whether the canonical format of this precision stores linear light.
    #[inline]
    pub const fn is_linear_by_default(&self) -> bool {
        !matches!(self, Self::U8 | Self::U16)
    }

    /// Suffix used in format names.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::Half => "half",
            Self::Float => "float",
        }
    }

    /// Parses a format name suffix.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == s)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable description of a pixel encoding.
///
/// Only RGB and Gray models are representable; indexed pixels are bytes whose
/// meaning depends on a palette the format knows nothing about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    base: BaseType,
    precision: Precision,
    alpha: bool,
    linear: bool,
}

impl Format {
    /// `R'G'B' u8`
    pub const RGB_U8: Format = Format::canonical(BaseType::Rgb, Precision::U8, false);
    /// `R'G'B'A u8`
    pub const RGBA_U8: Format = Format::canonical(BaseType::Rgb, Precision::U8, true);
    /// `RGBA float`
    pub const RGBA_FLOAT: Format = Format::canonical(BaseType::Rgb, Precision::Float, true);
    /// `Y' u8`
    pub const Y_U8: Format = Format::canonical(BaseType::Gray, Precision::U8, false);
    /// `Y'A u8`
    pub const YA_U8: Format = Format::canonical(BaseType::Gray, Precision::U8, true);
    /// `Y float`
    pub const Y_FLOAT: Format = Format::canonical(BaseType::Gray, Precision::Float, false);

    const fn canonical(base: BaseType, precision: Precision, alpha: bool) -> Self {
        Self {
            base,
            precision,
            alpha,
            linear: precision.is_linear_by_default(),
        }
    }

    /// Canonical format for a model, precision and alpha flag.
    ///
    /// Fails with [`Error::UnsupportedFormat`] for [`BaseType::Indexed`].
    pub fn new(base: BaseType, precision: Precision, alpha: bool) -> Result<Self> {
        if base == BaseType::Indexed {
            return Err(Error::unsupported_format(format!(
                "Indexed {}{}",
                precision,
                if alpha { " with alpha" } else { "" }
            )));
        }
        Ok(Self::canonical(base, precision, alpha))
    }

    /// Same format with the given linearity.
    #[inline]
    pub const fn with_linear(self, linear: bool) -> Self {
        Self { linear, ..self }
    }

    /// Same format with an alpha component.
    #[inline]
    pub const fn with_alpha(self) -> Self {
        Self {
            alpha: true,
            ..self
        }
    }

    /// Same format without an alpha component.
    #[inline]
    pub const fn without_alpha(self) -> Self {
        Self {
            alpha: false,
            ..self
        }
    }

    /// Same model and alpha with another precision, canonical linearity.
    #[inline]
    pub const fn with_precision(self, precision: Precision) -> Self {
        Self::canonical(self.base, precision, self.alpha)
    }

    /// Color model.
    #[inline]
    pub const fn base_type(&self) -> BaseType {
        self.base
    }

    /// Component precision.
    #[inline]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    /// Whether the last component is alpha.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        self.alpha
    }

    /// Whether color components are stored in linear light.
    #[inline]
    pub const fn is_linear(&self) -> bool {
        self.linear
    }

    /// Number of color components (3 for RGB, 1 for Gray).
    #[inline]
    pub const fn color_components(&self) -> usize {
        match self.base {
            BaseType::Gray => 1,
            _ => 3,
        }
    }

    /// Number of components including alpha.
    #[inline]
    pub const fn components(&self) -> usize {
        self.color_components() + self.alpha as usize
    }

    /// Size of one pixel in bytes.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.components() * self.precision.bytes()
    }

    /// Canonical name, e.g. `R'G'B'A u8` or `YA float`.
    pub fn name(&self) -> String {
        let model = match (self.base, self.linear, self.alpha) {
            (BaseType::Gray, true, false) => "Y",
            (BaseType::Gray, true, true) => "YA",
            (BaseType::Gray, false, false) => "Y'",
            (BaseType::Gray, false, true) => "Y'A",
            (_, true, false) => "RGB",
            (_, true, true) => "RGBA",
            (_, false, false) => "R'G'B'",
            (_, false, true) => "R'G'B'A",
        };
        format!("{} {}", model, self.precision)
    }

    /// Parses a canonical name produced by [`Format::name`].
    ///
    /// ```rust
    /// use picman_core::{Format, Precision};
    ///
    /// let fmt = Format::parse("Y'A u16").unwrap();
    /// assert_eq!(fmt.precision(), Precision::U16);
    /// assert!(fmt.has_alpha());
    /// assert!(Format::parse("CMYK u8").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        let (model, precision) = name
            .trim()
            .rsplit_once(' ')
            .ok_or_else(|| Error::unsupported_format(name))?;
        let precision = Precision::parse(precision).ok_or_else(|| Error::unsupported_format(name))?;
        let (base, linear, alpha) = match model {
            "Y" => (BaseType::Gray, true, false),
            "YA" => (BaseType::Gray, true, true),
            "Y'" => (BaseType::Gray, false, false),
            "Y'A" => (BaseType::Gray, false, true),
            "RGB" => (BaseType::Rgb, true, false),
            "RGBA" => (BaseType::Rgb, true, true),
            "R'G'B'" => (BaseType::Rgb, false, false),
            "R'G'B'A" => (BaseType::Rgb, false, true),
            _ => return Err(Error::unsupported_format(name)),
        };
        Ok(Self {
            base,
            precision,
            alpha,
            linear,
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One component of a format, as used for channel extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentFormat {
    format: Format,
    index: usize,
}

impl ComponentFormat {
    /// Format the component belongs to.
    pub const fn parent(&self) -> Format {
        self.format
    }

    /// Component index within the parent pixel.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Whether this is the alpha component.
    pub const fn is_alpha(&self) -> bool {
        self.format.alpha && self.index == self.format.color_components()
    }

    /// Single-channel format holding this component.
    pub const fn channel_format(&self) -> Format {
        Format {
            base: BaseType::Gray,
            precision: self.format.precision,
            alpha: false,
            linear: self.format.linear || self.is_alpha(),
        }
    }

    /// Component name such as `R' u8` or `A float`.
    pub fn name(&self) -> String {
        let letter = if self.is_alpha() {
            "A"
        } else {
            match (self.format.base, self.index) {
                (BaseType::Gray, _) => "Y",
                (_, 0) => "R",
                (_, 1) => "G",
                _ => "B",
            }
        };
        let prime = if self.format.linear || self.is_alpha() { "" } else { "'" };
        format!("{}{} {}", letter, prime, self.format.precision)
    }

    /// Human readable description, e.g. `Red component`.
    pub fn description(&self) -> &'static str {
        if self.is_alpha() {
            return "Alpha component";
        }
        match (self.format.base, self.index) {
            (BaseType::Gray, _) => "Gray component",
            (_, 0) => "Red component",
            (_, 1) => "Green component",
            _ => "Blue component",
        }
    }
}

/// Registry of the canonical pixel formats.
///
/// Construct one per application context and pass it explicitly; every query
/// is pure and the table is immutable after construction.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    by_name: HashMap<String, Format>,
    canonical: Vec<Format>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Builds the table of all RGB/Gray formats.
    pub fn new() -> Self {
        let mut canonical = Vec::with_capacity(20);
        for base in [BaseType::Rgb, BaseType::Gray] {
            for precision in Precision::ALL {
                for alpha in [false, true] {
                    canonical.push(Format::canonical(base, precision, alpha));
                }
            }
        }

        // Both linearities are addressable by name
        let mut by_name = HashMap::with_capacity(canonical.len() * 2);
        for fmt in &canonical {
            for linear in [false, true] {
                let f = fmt.with_linear(linear);
                by_name.insert(f.name(), f);
            }
        }

        tracing::trace!(formats = canonical.len(), "format registry initialized");
        Self { by_name, canonical }
    }

    /// Canonical format for a base type, precision and alpha flag.
    ///
    /// ```rust
    /// use picman_core::{BaseType, FormatRegistry, Precision};
    ///
    /// let registry = FormatRegistry::new();
    /// let fmt = registry.format_for(BaseType::Gray, Precision::Float, true).unwrap();
    /// assert_eq!(fmt.name(), "YA float");
    /// assert!(registry.format_for(BaseType::Indexed, Precision::U8, false).is_err());
    /// ```
    pub fn format_for(&self, base: BaseType, precision: Precision, with_alpha: bool) -> Result<Format> {
        Format::new(base, precision, with_alpha)
    }

    /// Looks a format up by name.
    pub fn lookup(&self, name: &str) -> Result<Format> {
        self.by_name
            .get(name.trim())
            .copied()
            .ok_or_else(|| Error::unsupported_format(name))
    }

    /// Base type of a format.
    pub fn base_type_of(&self, format: &Format) -> BaseType {
        format.base_type()
    }

    /// Precision of a format.
    pub fn precision_of(&self, format: &Format) -> Precision {
        format.precision()
    }

    /// Whether a format stores linear light.
    pub fn is_linear(&self, format: &Format) -> bool {
        format.is_linear()
    }

    /// Short description shown to users.
    pub fn description(&self, format: &Format) -> &'static str {
        match (format.base_type(), format.has_alpha()) {
            (BaseType::Gray, false) => "Grayscale",
            (BaseType::Gray, true) => "Grayscale-alpha",
            (_, false) => "RGB",
            (_, true) => "RGB-alpha",
        }
    }

    /// Format of one component of the canonical `base` format at `precision`.
    ///
    /// Index 0..color components selects a color channel, the next index the
    /// alpha channel.
    pub fn component_format(&self, base: BaseType, precision: Precision, index: usize) -> Result<ComponentFormat> {
        let format = Format::new(base, precision, true)?;
        if index >= format.components() {
            return Err(Error::unsupported_format(format!(
                "{} component {}",
                format.without_alpha(),
                index
            )));
        }
        Ok(ComponentFormat { format, index })
    }

    /// Format used for selection and layer masks: linear gray without alpha.
    pub fn mask_format(&self, precision: Precision) -> Format {
        Format::canonical(BaseType::Gray, precision, false).with_linear(true)
    }

    /// All canonical formats, RGB first.
    pub fn formats(&self) -> &[Format] {
        &self.canonical
    }
}
