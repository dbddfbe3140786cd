//! Tiled pixel buffers.
//!
//! A [`Buffer`] is a 2D raster of one [`Format`], split into square tiles of
//! `tile_size` pixels. Tiles on the right and bottom edge are stored at full
//! size; the pixels beyond the buffer extent are padding and never visible.
//!
//! ```text
//!   tile_size
//!   <------>
//!   +-------+-------+----+..+
//!   | (0,0) | (1,0) |(2,0)  :
//!   +-------+-------+----+..+
//!   | (0,1) | (1,1) |(2,1)  :
//!   +-------+-------+----+..+
//! ```
//!
//! Tile bytes live in the context's [`SharedTileCache`] and the buffer's
//! [`TileStore`](crate::TileStore). Buffers are owned exclusively: they are
//! not `Clone`, [`Buffer::duplicate`] makes an independent deep copy.
//! Reading takes `&self`, writing takes `&mut self`.
//!
//! [`SharedTileCache`]: crate::SharedTileCache

use picman_core::codec::{decode_rgba, encode_rgba};
use picman_core::{Error, Fish, Format, Rect, Result};
use tracing::{debug, trace, warn};

use crate::cache::{Access, TileData, TileId};
use crate::config::{MAX_TILE_SIZE, MIN_TILE_SIZE};
use crate::context::Context;

/// Tiled raster.
#[derive(Debug)]
pub struct Buffer {
    ctx: Context,
    id: u64,
    width: u32,
    height: u32,
    format: Format,
    tile_size: u32,
}

impl Buffer {
    /// Creates a zero-filled buffer using the context's tile size.
    pub fn new(ctx: &Context, width: u32, height: u32, format: Format) -> Result<Self> {
        Self::with_tile_size(ctx, width, height, format, ctx.tile_size())
    }

    /// Creates a zero-filled buffer with an explicit tile size.
    pub fn with_tile_size(
        ctx: &Context,
        width: u32,
        height: u32,
        format: Format,
        tile_size: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_dimensions(width, height, "buffer must not be empty"));
        }
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&tile_size) {
            return Err(Error::invalid_dimensions(
                tile_size,
                tile_size,
                format!("tile size must be within {MIN_TILE_SIZE}..={MAX_TILE_SIZE}"),
            ));
        }

        let id = ctx.next_buffer_id();
        let tile_bytes = tile_size as usize * tile_size as usize * format.bytes_per_pixel();
        let store = ctx.create_store(tile_bytes)?;
        ctx.cache().lock()?.register_buffer(id, tile_bytes, store);
        debug!(id, width, height, format = %format, tile_size, "buffer created");

        Ok(Self {
            ctx: ctx.clone(),
            id,
            width,
            height,
            format,
            tile_size,
        })
    }

    /// Unique id within the context.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bounds as a rectangle at the origin.
    #[inline]
    pub fn extent(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Tile edge length in pixels.
    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Bytes per pixel.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Session the buffer belongs to.
    #[inline]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Bytes per tile row.
    #[inline]
    pub fn tile_rowstride(&self) -> usize {
        self.tile_size as usize * self.bytes_per_pixel()
    }

    /// Tile columns.
    #[inline]
    pub fn tiles_x(&self) -> u32 {
        self.width.div_ceil(self.tile_size)
    }

    /// Tile rows.
    #[inline]
    pub fn tiles_y(&self) -> u32 {
        self.height.div_ceil(self.tile_size)
    }

    /// Cache id of tile (tx, ty).
    #[inline]
    pub fn tile_id(&self, tx: u32, ty: u32) -> TileId {
        TileId::new(self.id, tx, ty)
    }

    /// Visible area of tile (tx, ty), clipped to the buffer.
    pub fn tile_rect(&self, tx: u32, ty: u32) -> Rect {
        let ts = self.tile_size;
        Rect::new(tx * ts, ty * ts, ts, ts)
            .clamp_to(self.width, self.height)
            .unwrap_or_default()
    }

    /// Fails with [`Error::OutOfBounds`] unless `rect` lies inside the buffer.
    pub fn check_bounds(&self, rect: &Rect) -> Result<()> {
        if !self.extent().contains_rect(rect) {
            return Err(Error::out_of_bounds(*rect, self.width, self.height));
        }
        Ok(())
    }

    /// Visits every tile overlapping `rect` with the overlapping part.
    fn for_each_tile(
        &self,
        rect: &Rect,
        access: Access,
        mut f: impl FnMut(Rect, &mut TileData) -> Result<()>,
    ) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let ts = self.tile_size;
        let mut cache = self.ctx.cache().lock()?;
        for ty in rect.y / ts..=(rect.bottom() - 1) / ts {
            for tx in rect.x / ts..=(rect.right() - 1) / ts {
                let Some(part) = self.tile_rect(tx, ty).intersect(rect) else {
                    continue;
                };
                let id = self.tile_id(tx, ty);
                let mut data = cache.acquire(id, access)?;
                let outcome = f(part, &mut data);
                cache.release(id, data)?;
                outcome?;
            }
        }
        Ok(())
    }

    /// Byte offset of pixel (x, y) inside the tile containing it.
    #[inline]
    fn offset_in_tile(&self, x: u32, y: u32) -> usize {
        let ts = self.tile_size;
        ((y % ts) as usize * ts as usize + (x % ts) as usize) * self.bytes_per_pixel()
    }

    /// Copies `rect` out as tightly packed rows.
    pub fn get_rect(&self, rect: Rect) -> Result<Vec<u8>> {
        self.check_bounds(&rect)?;
        let bpp = self.bytes_per_pixel();
        let stride = self.tile_rowstride();
        let out_stride = rect.width as usize * bpp;
        let mut out = vec![0u8; rect.area() as usize * bpp];
        self.for_each_tile(&rect, Access::Read, |part, tile| {
            let tile = tile.as_slice();
            let row_len = part.width as usize * bpp;
            let mut src = self.offset_in_tile(part.x, part.y);
            let mut dst = (part.y - rect.y) as usize * out_stride + (part.x - rect.x) as usize * bpp;
            for _ in 0..part.height {
                out[dst..dst + row_len].copy_from_slice(&tile[src..src + row_len]);
                src += stride;
                dst += out_stride;
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Writes tightly packed rows into `rect`.
    pub fn set_rect(&mut self, rect: Rect, data: &[u8]) -> Result<()> {
        self.check_bounds(&rect)?;
        let bpp = self.bytes_per_pixel();
        let expected = rect.area() as usize * bpp;
        if data.len() != expected {
            return Err(Error::other(format!(
                "set_rect {rect}: got {} bytes, need {expected}",
                data.len()
            )));
        }
        let stride = self.tile_rowstride();
        let in_stride = rect.width as usize * bpp;
        self.for_each_tile(&rect, Access::Write, |part, tile| {
            let tile = checked_out(tile)?;
            let row_len = part.width as usize * bpp;
            let mut dst = self.offset_in_tile(part.x, part.y);
            let mut src = (part.y - rect.y) as usize * in_stride + (part.x - rect.x) as usize * bpp;
            for _ in 0..part.height {
                tile[dst..dst + row_len].copy_from_slice(&data[src..src + row_len]);
                src += in_stride;
                dst += stride;
            }
            Ok(())
        })?;
        trace!(id = self.id, rect = %rect, "rect written");
        Ok(())
    }

    /// Reads one pixel.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Vec<u8>> {
        self.get_rect(Rect::new(x, y, 1, 1))
    }

    /// Writes one pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) -> Result<()> {
        self.set_rect(Rect::new(x, y, 1, 1), pixel)
    }

    /// Reads `width` pixels of row `y` starting at `x`.
    pub fn get_row(&self, x: u32, y: u32, width: u32) -> Result<Vec<u8>> {
        self.get_rect(Rect::new(x, y, width, 1))
    }

    /// Writes `width` pixels of row `y` starting at `x`.
    pub fn set_row(&mut self, x: u32, y: u32, width: u32, data: &[u8]) -> Result<()> {
        self.set_rect(Rect::new(x, y, width, 1), data)
    }

    /// Reads `height` pixels of column `x` starting at `y`.
    pub fn get_col(&self, x: u32, y: u32, height: u32) -> Result<Vec<u8>> {
        self.get_rect(Rect::new(x, y, 1, height))
    }

    /// Writes `height` pixels of column `x` starting at `y`.
    pub fn set_col(&mut self, x: u32, y: u32, height: u32, data: &[u8]) -> Result<()> {
        self.set_rect(Rect::new(x, y, 1, height), data)
    }

    /// Sets every pixel of `rect` to `pixel`.
    pub fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()> {
        self.check_bounds(&rect)?;
        let bpp = self.bytes_per_pixel();
        if pixel.len() != bpp {
            return Err(Error::format_mismatch(
                format!("{} ({bpp} bytes)", self.format),
                format!("{} bytes", pixel.len()),
            ));
        }
        let stride = self.tile_rowstride();
        self.for_each_tile(&rect, Access::Write, |part, tile| {
            let tile = checked_out(tile)?;
            let row_len = part.width as usize * bpp;
            let mut dst = self.offset_in_tile(part.x, part.y);
            for _ in 0..part.height {
                for px in tile[dst..dst + row_len].chunks_exact_mut(bpp) {
                    px.copy_from_slice(pixel);
                }
                dst += stride;
            }
            Ok(())
        })
    }

    /// Sets every pixel to `pixel`.
    pub fn fill(&mut self, pixel: &[u8]) -> Result<()> {
        self.fill_rect(self.extent(), pixel)
    }

    /// Sets every pixel to an RGBA color given in the buffer's own model and
    /// transfer. Gray buffers take the first component.
    pub fn fill_color(&mut self, color: [f32; 4]) -> Result<()> {
        let mut pixel = vec![0u8; self.bytes_per_pixel()];
        encode_rgba(&self.format, &color, &mut pixel);
        self.fill(&pixel)
    }

    /// Reads one pixel as RGBA in the buffer's own model and transfer.
    pub fn sample_color(&self, x: u32, y: u32) -> Result<[f32; 4]> {
        let pixel = self.get_pixel(x, y)?;
        Ok(decode_rgba(&self.format, &pixel))
    }

    /// Copies every tile into `dst`, converting through `fish`.
    fn copy_tiles_into(&self, dst: &Buffer, fish: &Fish) -> Result<()> {
        let pixels = self.tile_size as usize * self.tile_size as usize;
        let mut cache = self.ctx.cache().lock()?;
        for ty in 0..self.tiles_y() {
            for tx in 0..self.tiles_x() {
                let src_id = self.tile_id(tx, ty);
                let dst_id = dst.tile_id(tx, ty);
                let src_data = cache.acquire(src_id, Access::Read)?;
                let mut dst_data = match cache.acquire(dst_id, Access::Write) {
                    Ok(data) => data,
                    Err(e) => {
                        cache.release(src_id, src_data)?;
                        return Err(e);
                    }
                };
                let outcome = checked_out(&mut dst_data)
                    .and_then(|out| fish.convert(src_data.as_slice(), out, pixels));
                cache.release(dst_id, dst_data)?;
                cache.release(src_id, src_data)?;
                outcome?;
            }
        }
        Ok(())
    }

    /// Deep copy with a new id.
    pub fn duplicate(&self) -> Result<Buffer> {
        let copy = Buffer::with_tile_size(&self.ctx, self.width, self.height, self.format, self.tile_size)?;
        self.copy_tiles_into(&copy, &Fish::new(self.format, self.format))?;
        debug!(src = self.id, dst = copy.id, "buffer duplicated");
        Ok(copy)
    }

    /// Copy converted to `format`.
    pub fn convert(&self, format: Format) -> Result<Buffer> {
        let converted = Buffer::with_tile_size(&self.ctx, self.width, self.height, format, self.tile_size)?;
        self.copy_tiles_into(&converted, &Fish::new(self.format, format))?;
        debug!(src = self.id, dst = converted.id, from = %self.format, to = %format, "buffer converted");
        Ok(converted)
    }

    /// Copies `rect` of `src` to (`dst_x`, `dst_y`) of `dst`, converting when
    /// the formats differ.
    pub fn copy_rect(src: &Buffer, rect: Rect, dst: &mut Buffer, dst_x: u32, dst_y: u32) -> Result<()> {
        let target = rect.with_origin(dst_x, dst_y);
        src.check_bounds(&rect)?;
        dst.check_bounds(&target)?;
        let data = src.get_rect(rect)?;
        let fish = Fish::new(src.format, dst.format);
        if fish.is_identity() {
            dst.set_rect(target, &data)
        } else {
            dst.set_rect(target, &fish.convert_vec(&data)?)
        }
    }

    /// Writes dirty resident tiles to the store.
    pub fn flush(&self) -> Result<usize> {
        self.ctx.cache().lock()?.flush_buffer(self.id)
    }
}

/// Mutable bytes of a write-acquired tile.
pub(crate) fn checked_out(data: &mut TileData) -> Result<&mut [u8]> {
    data.as_mut_slice()
        .ok_or_else(|| Error::other("write acquisition returned a shared tile"))
}

impl Drop for Buffer {
    fn drop(&mut self) {
        match self.ctx.cache().lock() {
            Ok(mut cache) => {
                if let Err(e) = cache.drop_buffer(self.id) {
                    warn!(id = self.id, error = %e, "failed to discard buffer tiles");
                }
            }
            Err(e) => warn!(id = self.id, error = %e, "tile cache unavailable on buffer drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use approx::assert_relative_eq;

    fn ctx() -> Context {
        Context::new(CoreConfig::default().with_tile_size(16)).unwrap()
    }

    #[test]
    fn test_new_is_zeroed() {
        let ctx = ctx();
        let buf = Buffer::new(&ctx, 40, 20, Format::RGBA_U8).unwrap();
        assert_eq!(buf.tiles_x(), 3);
        assert_eq!(buf.tiles_y(), 2);
        assert_eq!(buf.get_pixel(39, 19).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_rejected() {
        let ctx = ctx();
        assert!(Buffer::new(&ctx, 0, 10, Format::RGBA_U8).is_err());
        assert!(Buffer::with_tile_size(&ctx, 10, 10, Format::RGBA_U8, 8).is_err());
    }

    #[test]
    fn test_rect_across_tiles() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 40, 40, Format::Y_U8).unwrap();
        let rect = Rect::new(10, 12, 12, 8);
        let data: Vec<u8> = (0..rect.area() as u32).map(|v| v as u8).collect();
        buf.set_rect(rect, &data).unwrap();
        assert_eq!(buf.get_rect(rect).unwrap(), data);
        assert_eq!(buf.get_pixel(10, 12).unwrap(), vec![0]);
        assert_eq!(buf.get_pixel(21, 19).unwrap(), vec![95]);
        assert_eq!(buf.get_pixel(9, 12).unwrap(), vec![0]);
    }

    #[test]
    fn test_row_and_col() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 20, 20, Format::Y_U8).unwrap();
        buf.set_row(0, 5, 20, &[7u8; 20]).unwrap();
        buf.set_col(15, 0, 20, &[9u8; 20]).unwrap();
        let row = buf.get_row(0, 5, 20).unwrap();
        assert_eq!(row[14], 7);
        assert_eq!(row[15], 9);
        assert_eq!(buf.get_col(15, 0, 20).unwrap(), vec![9u8; 20]);
    }

    #[test]
    fn test_out_of_bounds() {
        let ctx = ctx();
        let buf = Buffer::new(&ctx, 20, 20, Format::Y_U8).unwrap();
        let err = buf.get_rect(Rect::new(10, 10, 11, 1)).unwrap_err();
        assert!(err.is_bounds_error());
    }

    #[test]
    fn test_fill_color_and_sample() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 33, 17, Format::RGBA_FLOAT).unwrap();
        buf.fill_color([0.25, 0.5, 0.75, 1.0]).unwrap();
        let c = buf.sample_color(32, 16).unwrap();
        assert_relative_eq!(c[0], 0.25);
        assert_relative_eq!(c[2], 0.75);
    }

    #[test]
    fn test_fill_wrong_pixel_size() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 8, 8, Format::RGBA_U8).unwrap();
        assert!(buf.fill(&[1, 2, 3]).unwrap_err().is_format_error());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 20, 20, Format::RGB_U8).unwrap();
        buf.fill(&[1, 2, 3]).unwrap();
        let mut copy = buf.duplicate().unwrap();
        assert_ne!(copy.id(), buf.id());
        copy.set_pixel(0, 0, &[9, 9, 9]).unwrap();
        assert_eq!(buf.get_pixel(0, 0).unwrap(), vec![1, 2, 3]);
        assert_eq!(copy.get_pixel(19, 19).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_convert() {
        let ctx = ctx();
        let mut buf = Buffer::new(&ctx, 20, 20, Format::Y_U8).unwrap();
        buf.fill(&[200]).unwrap();
        let rgba = buf.convert(Format::RGBA_U8).unwrap();
        assert_eq!(rgba.get_pixel(19, 0).unwrap(), vec![200, 200, 200, 255]);
    }

    #[test]
    fn test_copy_rect_converts() {
        let ctx = ctx();
        let mut src = Buffer::new(&ctx, 20, 20, Format::RGBA_U8).unwrap();
        src.fill(&[255, 255, 255, 255]).unwrap();
        let mut dst = Buffer::new(&ctx, 20, 20, Format::RGB_U8).unwrap();
        Buffer::copy_rect(&src, Rect::new(0, 0, 4, 4), &mut dst, 16, 16).unwrap();
        assert_eq!(dst.get_pixel(19, 19).unwrap(), vec![255, 255, 255]);
        assert_eq!(dst.get_pixel(15, 15).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_drop_releases_cache() {
        let ctx = ctx();
        let id = {
            let mut buf = Buffer::new(&ctx, 20, 20, Format::Y_U8).unwrap();
            buf.fill(&[1]).unwrap();
            buf.id()
        };
        let cache = ctx.cache().lock().unwrap();
        assert!(!cache.has_buffer(id));
        assert_eq!(cache.stats().resident, 0);
    }

    #[test]
    fn test_swap_backed_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::default()
            .with_tile_size(16)
            .with_cache_tiles(2)
            .with_swap_path(dir.path());
        let ctx = Context::new(config).unwrap();
        let mut buf = Buffer::new(&ctx, 64, 16, Format::Y_U8).unwrap();
        for tx in 0..4u32 {
            buf.fill_rect(Rect::new(tx * 16, 0, 16, 16), &[tx as u8 + 1]).unwrap();
        }
        for tx in 0..4u32 {
            assert_eq!(buf.get_pixel(tx * 16 + 3, 7).unwrap(), vec![tx as u8 + 1]);
        }
        assert!(ctx.cache().stats().unwrap().evictions >= 2);
    }
}
