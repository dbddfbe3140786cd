//! Lockstep region iteration.
//!
//! A [`RegionIter`] walks one or more equally sized regions of possibly
//! different buffers in lockstep. Each step covers the largest portion that
//! stays inside a single tile of every region, so every [`Span`] is a set of
//! contiguous rows inside one tile:
//!
//! ```text
//!  region A (tile 64, offset 0)    region B (tile 64, offset 16)
//!  +--------+--------+              +----+--------+---+
//!  |   1    |   2    |              | 1  |   2    |   |
//!  +--------+--------+      =>      +----+--------+---+
//!  step width = min(distance to next tile edge over all regions)
//! ```
//!
//! Steps run row-major. Spans borrow the iterator and are only valid until
//! the next call to [`RegionIter::next_step`], which releases the tiles of the
//! previous step first. Dropping the iterator releases whatever is still
//! pinned.
//!
//! # Usage
//!
//! ```rust
//! use picman_core::{Format, Rect};
//! use picman_tiles::{Buffer, Context, RegionIter};
//!
//! let ctx = Context::default();
//! let src = Buffer::new(&ctx, 100, 80, Format::RGBA_U8).unwrap();
//! let mut dst = Buffer::new(&ctx, 100, 80, Format::RGBA_U8).unwrap();
//!
//! let mut iter = RegionIter::new();
//! iter.add_read(&src, Rect::from_size(100, 80)).unwrap();
//! iter.add_write(&mut dst, Rect::from_size(100, 80)).unwrap();
//! while let Some(mut step) = iter.next_step().unwrap() {
//!     let (src, dst) = step.pair_mut().unwrap();
//!     for (s, d) in src.rows().zip(dst.rows_mut().unwrap()) {
//!         d.copy_from_slice(s);
//!     }
//! }
//! ```

use picman_core::{Error, Rect, Result};
use tracing::{trace, warn};

use crate::buffer::Buffer;
use crate::cache::{Access, SharedTileCache, TileData, TileId};
use crate::progress::Progress;

enum Target<'a> {
    Read(&'a Buffer),
    Write(&'a mut Buffer),
}

impl Target<'_> {
    fn buffer(&self) -> &Buffer {
        match self {
            Self::Read(b) => b,
            Self::Write(b) => b,
        }
    }
}

struct Region<'a> {
    target: Target<'a>,
    rect: Rect,
    access: Access,
    cache: SharedTileCache,
}

/// Bytes of one region for the current step.
#[derive(Debug)]
pub struct Span<'s> {
    /// Buffer X of the first pixel.
    pub x: u32,
    /// Buffer Y of the first pixel.
    pub y: u32,
    /// Portion width in pixels.
    pub width: u32,
    /// Portion height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub rowstride: usize,
    /// Bytes per pixel.
    pub bpp: usize,
    data: SpanData<'s>,
}

#[derive(Debug)]
enum SpanData<'s> {
    Read(&'s [u8]),
    Write(&'s mut [u8]),
}

impl<'s> Span<'s> {
    /// Bytes of one row of the portion.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bpp
    }

    /// Raw bytes from the first pixel to the end of the last row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        match &self.data {
            SpanData::Read(d) => d,
            SpanData::Write(d) => d,
        }
    }

    /// Raw mutable bytes, `None` for read-only regions.
    #[inline]
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.data {
            SpanData::Read(_) => None,
            SpanData::Write(d) => Some(d),
        }
    }

    /// Whether the region was added for writing.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self.data, SpanData::Write(_))
    }

    /// Row `r` of the portion.
    #[inline]
    pub fn row(&self, r: u32) -> &[u8] {
        let start = r as usize * self.rowstride;
        &self.data()[start..start + self.row_bytes()]
    }

    /// Rows of the portion, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let len = self.row_bytes();
        self.data()
            .chunks(self.rowstride)
            .take(self.height as usize)
            .map(move |r| &r[..len])
    }

    /// Mutable rows of the portion, `None` for read-only regions.
    pub fn rows_mut(&mut self) -> Option<impl Iterator<Item = &mut [u8]>> {
        let len = self.row_bytes();
        let stride = self.rowstride;
        let height = self.height as usize;
        self.data_mut()
            .map(move |d| d.chunks_mut(stride).take(height).map(move |r| &mut r[..len]))
    }
}

/// One lockstep step: a portion of every region.
#[derive(Debug)]
pub struct Step<'s> {
    /// X offset of the portion within the regions.
    pub x: u32,
    /// Y offset of the portion within the regions.
    pub y: u32,
    /// Portion width.
    pub width: u32,
    /// Portion height.
    pub height: u32,
    /// One span per region, in registration order.
    pub spans: Vec<Span<'s>>,
}

impl<'s> Step<'s> {
    /// Span of region `index`.
    pub fn span(&self, index: usize) -> Option<&Span<'s>> {
        self.spans.get(index)
    }

    /// Span of region `index`, mutable.
    pub fn span_mut(&mut self, index: usize) -> Option<&mut Span<'s>> {
        self.spans.get_mut(index)
    }

    /// The first two spans, for the common source/destination case.
    pub fn pair_mut(&mut self) -> Option<(&mut Span<'s>, &mut Span<'s>)> {
        match self.spans.as_mut_slice() {
            [a, b, ..] => Some((a, b)),
            _ => None,
        }
    }

    /// Number of pixels in the portion.
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Lockstep iterator over tiled regions.
pub struct RegionIter<'a> {
    regions: Vec<Region<'a>>,
    /// Tiles pinned for the current step, parallel to `regions`.
    pinned: Vec<Option<(TileId, TileData)>>,
    progress: Option<&'a Progress>,
    x: u32,
    y: u32,
    started: bool,
    finished: bool,
    steps: usize,
    pixels_done: u64,
}

impl Default for RegionIter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegionIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionIter")
            .field("regions", &self.regions.len())
            .field("x", &self.x)
            .field("y", &self.y)
            .field("steps", &self.steps)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'a> RegionIter<'a> {
    /// Creates an iterator without regions.
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            pinned: Vec::new(),
            progress: None,
            x: 0,
            y: 0,
            started: false,
            finished: false,
            steps: 0,
            pixels_done: 0,
        }
    }

    /// Checks cancellation and reports progress between steps.
    pub fn with_progress(mut self, progress: &'a Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn add(&mut self, target: Target<'a>, rect: Rect, access: Access) -> Result<usize> {
        if self.started {
            return Err(Error::other("regions cannot be added after iteration started"));
        }
        let buffer = target.buffer();
        buffer.check_bounds(&rect)?;
        if let Some(first) = self.regions.first() {
            let (w, h) = (first.rect.width, first.rect.height);
            if (rect.width, rect.height) != (w, h) {
                return Err(Error::size_mismatch((w, h), (rect.width, rect.height)));
            }
        }
        let cache = buffer.context().cache().clone();
        self.regions.push(Region {
            target,
            rect,
            access,
            cache,
        });
        self.pinned.push(None);
        Ok(self.regions.len() - 1)
    }

    /// Adds a read-only region. Returns its span index.
    pub fn add_read(&mut self, buffer: &'a Buffer, rect: Rect) -> Result<usize> {
        self.add(Target::Read(buffer), rect, Access::Read)
    }

    /// Adds a write-only region. Existing pixels are loaded so partial
    /// writes keep the rest of each tile.
    pub fn add_write(&mut self, buffer: &'a mut Buffer, rect: Rect) -> Result<usize> {
        self.add(Target::Write(buffer), rect, Access::Write)
    }

    /// Adds a region that is read and written.
    pub fn add_read_write(&mut self, buffer: &'a mut Buffer, rect: Rect) -> Result<usize> {
        self.add(Target::Write(buffer), rect, Access::ReadWrite)
    }

    /// Common region size.
    pub fn size(&self) -> (u32, u32) {
        self.regions
            .first()
            .map_or((0, 0), |r| (r.rect.width, r.rect.height))
    }

    /// Steps completed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of steps a full pass takes.
    pub fn count_steps(&self) -> usize {
        let (w, h) = self.size();
        let mut count = 0;
        let mut y = 0;
        while y < h {
            let ph = self.portion_height(y);
            let mut x = 0;
            while x < w {
                x += self.portion_width(x);
                count += 1;
            }
            y += ph;
        }
        count
    }

    fn portion_width(&self, x: u32) -> u32 {
        let (w, _) = self.size();
        self.regions.iter().fold(w - x, |acc, r| {
            let ts = r.target.buffer().tile_size();
            acc.min(ts - (r.rect.x + x) % ts)
        })
    }

    fn portion_height(&self, y: u32) -> u32 {
        let (_, h) = self.size();
        self.regions.iter().fold(h - y, |acc, r| {
            let ts = r.target.buffer().tile_size();
            acc.min(ts - (r.rect.y + y) % ts)
        })
    }

    fn release_pinned(&mut self) -> Result<()> {
        let mut first_err = None;
        for (slot, region) in self.pinned.iter_mut().zip(&self.regions) {
            if let Some((id, data)) = slot.take() {
                if let Err(e) = region.cache.release(id, data) {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Advances to the next step.
    ///
    /// Returns `Ok(None)` once every portion was visited. Any error ends the
    /// iteration; tiles of earlier steps keep what was written to them.
    pub fn next_step(&mut self) -> Result<Option<Step<'_>>> {
        self.started = true;
        if let Err(e) = self.release_pinned() {
            self.finished = true;
            return Err(e);
        }

        let (w, h) = self.size();
        if self.finished || self.regions.is_empty() || self.y >= h {
            if let (false, Some(progress)) = (self.finished, self.progress) {
                progress.report(1.0);
            }
            self.finished = true;
            return Ok(None);
        }

        if let Some(progress) = self.progress {
            if self.steps > 0 {
                progress.report(self.pixels_done as f64 / (w as u64 * h as u64) as f64);
            }
            if progress.is_cancelled() {
                self.finished = true;
                return Err(Error::Cancelled { steps: self.steps });
            }
        }

        let (x, y) = (self.x, self.y);
        let pw = self.portion_width(x);
        let ph = self.portion_height(y);

        for i in 0..self.regions.len() {
            let region = &self.regions[i];
            let buffer = region.target.buffer();
            let ts = buffer.tile_size();
            let id = buffer.tile_id((region.rect.x + x) / ts, (region.rect.y + y) / ts);
            match region.cache.acquire(id, region.access) {
                Ok(data) => self.pinned[i] = Some((id, data)),
                Err(e) => {
                    self.finished = true;
                    if let Err(release_err) = self.release_pinned() {
                        warn!(error = %release_err, "release after failed acquire");
                    }
                    return Err(e);
                }
            }
        }

        // Advance the cursor for the next call
        self.x += pw;
        if self.x >= w {
            self.x = 0;
            self.y += ph;
        }
        self.steps += 1;
        self.pixels_done += pw as u64 * ph as u64;
        trace!(step = self.steps, x, y, width = pw, height = ph, "region step");

        let mut spans = Vec::with_capacity(self.regions.len());
        for (region, slot) in self.regions.iter().zip(self.pinned.iter_mut()) {
            let Some((_, data)) = slot.as_mut() else {
                return Err(Error::other("tile missing for pinned region"));
            };
            let buffer = region.target.buffer();
            let ts = buffer.tile_size();
            let bpp = buffer.bytes_per_pixel();
            let rowstride = buffer.tile_rowstride();
            let bx = region.rect.x + x;
            let by = region.rect.y + y;
            let start = ((by % ts) as usize * ts as usize + (bx % ts) as usize) * bpp;
            let end = start + (ph as usize - 1) * rowstride + pw as usize * bpp;
            let data = match data {
                TileData::Shared(d) => SpanData::Read(&d[start..end]),
                TileData::Owned(d) => SpanData::Write(&mut d[start..end]),
            };
            spans.push(Span {
                x: bx,
                y: by,
                width: pw,
                height: ph,
                rowstride,
                bpp,
                data,
            });
        }

        Ok(Some(Step {
            x,
            y,
            width: pw,
            height: ph,
            spans,
        }))
    }

    /// Runs `f` on every step.
    pub fn for_each(mut self, mut f: impl FnMut(&mut Step<'_>) -> Result<()>) -> Result<usize> {
        while let Some(mut step) = self.next_step()? {
            f(&mut step)?;
        }
        Ok(self.steps)
    }
}

impl Drop for RegionIter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release_pinned() {
            warn!(error = %e, "failed to release tiles on iterator drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, CoreConfig};
    use picman_core::Format;

    fn ctx() -> Context {
        Context::new(CoreConfig::default().with_tile_size(16)).unwrap()
    }

    #[test]
    fn test_step_count_matches_tiles() {
        let ctx = ctx();
        let buf = Buffer::new(&ctx, 40, 33, Format::RGBA_U8).unwrap();
        let mut iter = RegionIter::new();
        iter.add_read(&buf, buf.extent()).unwrap();
        assert_eq!(iter.count_steps(), 3 * 3);
        let steps = iter.for_each(|_| Ok(())).unwrap();
        assert_eq!(steps, 9);
    }

    #[test]
    fn test_steps_stay_inside_tiles() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 64, 64, Format::Y_U8).unwrap();
        let b = Buffer::new(&ctx, 64, 64, Format::Y_U8).unwrap();
        let mut iter = RegionIter::new();
        iter.add_read(&a, Rect::new(0, 0, 40, 40)).unwrap();
        iter.add_read(&b, Rect::new(8, 4, 40, 40)).unwrap();
        let mut covered = 0u64;
        while let Some(step) = iter.next_step().unwrap() {
            for span in &step.spans {
                assert_eq!(span.x / 16, (span.x + span.width - 1) / 16);
                assert_eq!(span.y / 16, (span.y + span.height - 1) / 16);
            }
            covered += step.pixels();
        }
        assert_eq!(covered, 40 * 40);
    }

    #[test]
    fn test_size_mismatch() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
        let b = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
        let mut iter = RegionIter::new();
        iter.add_read(&a, Rect::from_size(10, 10)).unwrap();
        let err = iter.add_read(&b, Rect::from_size(10, 11)).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_out_of_bounds() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
        let mut iter = RegionIter::new();
        let err = iter.add_read(&a, Rect::new(30, 0, 4, 4)).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
    }

    #[test]
    fn test_read_span_not_writable() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 16, 16, Format::Y_U8).unwrap();
        let mut iter = RegionIter::new();
        iter.add_read(&a, a.extent()).unwrap();
        let mut step = iter.next_step().unwrap().unwrap();
        let span = step.span_mut(0).unwrap();
        assert!(!span.is_writable());
        assert!(span.rows_mut().is_none());
    }

    #[test]
    fn test_write_persists() {
        let ctx = ctx();
        let mut a = Buffer::new(&ctx, 20, 20, Format::Y_U8).unwrap();
        {
            let mut iter = RegionIter::new();
            iter.add_write(&mut a, Rect::new(2, 2, 16, 16)).unwrap();
            iter.for_each(|step| {
                for span in &mut step.spans {
                    if let Some(rows) = span.rows_mut() {
                        for row in rows {
                            row.fill(5);
                        }
                    }
                }
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(a.get_pixel(2, 2).unwrap(), vec![5]);
        assert_eq!(a.get_pixel(17, 17).unwrap(), vec![5]);
        assert_eq!(a.get_pixel(1, 1).unwrap(), vec![0]);
        assert_eq!(a.get_pixel(18, 18).unwrap(), vec![0]);
    }

    #[test]
    fn test_drop_releases_pins() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
        {
            let mut iter = RegionIter::new();
            iter.add_read(&a, a.extent()).unwrap();
            let _ = iter.next_step().unwrap();
            assert_eq!(ctx.cache().stats().unwrap().pinned, 1);
        }
        assert_eq!(ctx.cache().stats().unwrap().pinned, 0);
    }

    #[test]
    fn test_cancel_between_steps() {
        let ctx = ctx();
        let a = Buffer::new(&ctx, 64, 16, Format::Y_U8).unwrap();
        let progress = Progress::new();
        let handle = progress.abort_handle();
        let mut iter = RegionIter::new().with_progress(&progress);
        iter.add_read(&a, a.extent()).unwrap();
        assert!(iter.next_step().unwrap().is_some());
        handle.abort();
        let err = iter.next_step().unwrap_err();
        assert!(matches!(err, Error::Cancelled { steps: 1 }));
        assert_eq!(ctx.cache().stats().unwrap().pinned, 0);
    }
}
