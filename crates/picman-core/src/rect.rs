//! Rectangles for regions, tiles and update notifications.
//!
//! Every place the pixel pipeline talks about "an area of a buffer" uses
//! [`Rect`]: region iteration windows, tile extents, applicator clip areas,
//! undo extents and drawable update notifications.
//!
//! # Coordinate System
//!
//! ```text
//! (0,0) ────────► X
//!   │
//!   │   ┌──────────┐
//!   │   │  Buffer  │
//!   │   │  Region  │
//!   │   └──────────┘
//!   ▼
//!   Y
//! ```
//!
//! Left/top edges are inclusive, right/bottom edges exclusive.
//!
//! # Usage
//!
//! ```rust
//! use picman_core::Rect;
//!
//! let region = Rect::new(10, 20, 100, 50);
//! assert!(region.contains(15, 25));
//!
//! let tile = Rect::new(64, 0, 64, 64);
//! let part = region.intersect(&tile).unwrap();
//! assert_eq!(part, Rect::new(64, 20, 46, 44));
//! ```

/// A rectangle defined by origin (x, y) and dimensions (width, height).
///
/// A rectangle with zero width or height is empty. Empty rectangles never
/// overlap anything, but are contained by any rectangle whose span covers
/// their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Rect {
    /// X coordinate of the left edge (inclusive)
    pub x: u32,
    /// Y coordinate of the top edge (inclusive)
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Creates a new rectangle with the given origin and dimensions.
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle at the origin, covering a whole `width` x `height`
    /// buffer.
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// X coordinate of the right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Y coordinate of the bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Area in pixels.
    #[inline]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if the rectangle has zero area.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns `true` if the point (px, py) is inside this rectangle.
    ///
    /// ```rust
    /// use picman_core::Rect;
    ///
    /// let rect = Rect::new(10, 10, 100, 100);
    /// assert!(rect.contains(10, 10));
    /// assert!(rect.contains(109, 109));
    /// assert!(!rect.contains(110, 110));
    /// ```
    #[inline]
    pub const fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Returns `true` if `other` lies completely inside this rectangle.
    ///
    /// Uses 64-bit edges so rectangles near `u32::MAX` cannot wrap around.
    #[inline]
    pub const fn contains_rect(&self, other: &Rect) -> bool {
        let other_right = other.x as u64 + other.width as u64;
        let other_bottom = other.y as u64 + other.height as u64;
        other.x >= self.x
            && other.y >= self.y
            && other_right <= self.right() as u64
            && other_bottom <= self.bottom() as u64
    }

    /// Returns `true` if the rectangles share at least one pixel.
    #[inline]
    pub const fn overlaps(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Returns the shared area of both rectangles, or `None` when they do not
    /// overlap.
    #[inline]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Bounding box of both rectangles. Empty inputs are ignored.
    ///
    /// ```rust
    /// use picman_core::Rect;
    ///
    /// let a = Rect::new(0, 0, 50, 50);
    /// let b = Rect::new(100, 100, 50, 50);
    /// assert_eq!(a.union(&b), Rect::new(0, 0, 150, 150));
    /// assert_eq!(a.union(&Rect::default()), a);
    /// ```
    #[inline]
    pub fn union(&self, other: &Rect) -> Rect {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Returns this rectangle moved to a new origin, keeping its size.
    #[inline]
    pub const fn with_origin(&self, x: u32, y: u32) -> Rect {
        Rect::new(x, y, self.width, self.height)
    }

    /// Returns this rectangle translated by (dx, dy), or `None` if the new
    /// origin would be negative.
    #[inline]
    pub fn translate(&self, dx: i64, dy: i64) -> Option<Rect> {
        let x = self.x as i64 + dx;
        let y = self.y as i64 + dy;
        if x < 0 || y < 0 || x > u32::MAX as i64 || y > u32::MAX as i64 {
            return None;
        }
        Some(Rect::new(x as u32, y as u32, self.width, self.height))
    }

    /// Clips this rectangle to a `max_width` x `max_height` buffer.
    #[inline]
    pub fn clamp_to(&self, max_width: u32, max_height: u32) -> Option<Rect> {
        self.intersect(&Rect::from_size(max_width, max_height))
    }

    /// Number of `tile_size` tiles touched by this rectangle.
    ///
    /// ```rust
    /// use picman_core::Rect;
    ///
    /// assert_eq!(Rect::from_size(128, 128).tile_count(64), 4);
    /// assert_eq!(Rect::from_size(130, 64).tile_count(64), 3);
    /// assert_eq!(Rect::new(60, 0, 8, 8).tile_count(64), 2);
    /// ```
    pub fn tile_count(&self, tile_size: u32) -> u64 {
        if self.is_empty() || tile_size == 0 {
            return 0;
        }
        let cols = (self.right() - 1) / tile_size - self.x / tile_size + 1;
        let rows = (self.bottom() - 1) / tile_size - self.y / tile_size + 1;
        cols as u64 * rows as u64
    }

    /// Iterates all (x, y) coordinates row by row.
    #[inline]
    pub fn iter_coords(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}
