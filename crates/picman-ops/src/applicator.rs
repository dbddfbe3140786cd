//! Merging a source region into a destination buffer.
//!
//! An [`Applicator`] holds the blend settings (mode, opacity, affected
//! channels). Each [`Applicator::apply`] call walks the source, the optional
//! mask and base, and the destination in lockstep with a [`RegionIter`] and
//! writes
//!
//! ```text
//! dst' = mode.composite(base or dst, src, opacity * mask)
//! ```
//!
//! Only the part of the source that lands inside both the destination and
//! the mask is touched; the source origin may sit at negative coordinates.
//! Sources and bases in another format are converted to the destination
//! format first. Pixels whose effective opacity is zero keep their bytes.

use picman_core::codec::{decode_rgba, encode_rgba};
use picman_core::{BaseType, Error, Format, Rect};
use picman_tiles::{Buffer, Progress, RegionIter};
use tracing::{debug, trace};

use crate::mode::LayerMode;
use crate::parallel::for_each_row;
use crate::{OpsError, OpsResult};

/// Blend settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applicator {
    mode: LayerMode,
    opacity: f32,
    affect: [bool; 4],
}

impl Default for Applicator {
    fn default() -> Self {
        Self::new(LayerMode::Normal)
    }
}

/// Inputs of one [`Applicator::apply`] call.
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    src: &'a Buffer,
    src_rect: Rect,
    mask: Option<(&'a Buffer, u32, u32)>,
    base: Option<&'a Buffer>,
    progress: Option<&'a Progress>,
}

impl<'a> ApplyRequest<'a> {
    /// Applies `src_rect` of `src`.
    pub fn new(src: &'a Buffer, src_rect: Rect) -> Self {
        Self {
            src,
            src_rect,
            mask: None,
            base: None,
            progress: None,
        }
    }

    /// Applies the whole of `src`.
    pub fn whole(src: &'a Buffer) -> Self {
        Self::new(src, src.extent())
    }

    /// Scales opacity by a grayscale mask whose region starts at (`x`, `y`).
    ///
    /// The mask lines up with the source region's origin. Where the mask
    /// ends before the source does, the destination is left alone.
    pub fn with_mask(mut self, mask: &'a Buffer, x: u32, y: u32) -> Self {
        self.mask = Some((mask, x, y));
        self
    }

    /// Blends over `base` instead of the destination's current pixels.
    /// The base is read at the destination coordinates.
    pub fn with_base(mut self, base: &'a Buffer) -> Self {
        self.base = Some(base);
        self
    }

    /// Reports progress and checks for cancellation between steps.
    pub fn with_progress(mut self, progress: &'a Progress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Validated, clipped regions of one apply.
struct Plan<'a> {
    area: Rect,
    src_area: Rect,
    mask: Option<(&'a Buffer, Rect)>,
    base: Option<(&'a Buffer, Rect)>,
}

/// Buffer coordinate as a placement offset.
pub(crate) fn signed(v: u32) -> OpsResult<i32> {
    i32::try_from(v).map_err(|_| OpsError::InvalidParameter(format!("coordinate {v} exceeds i32")))
}

/// Clips a `width` x `height` block placed at (`x`, `y`) to `bounds`.
///
/// Returns the covered part of `bounds` and the offset of its origin inside
/// the block, or `None` when nothing overlaps.
pub(crate) fn place(width: u32, height: u32, x: i32, y: i32, bounds: Rect) -> Option<(Rect, u32, u32)> {
    let (x, y) = (i64::from(x), i64::from(y));
    let x0 = x.max(i64::from(bounds.x));
    let y0 = y.max(i64::from(bounds.y));
    let x1 = (x + i64::from(width)).min(i64::from(bounds.right()));
    let y1 = (y + i64::from(height)).min(i64::from(bounds.bottom()));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    let area = Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32);
    Some((area, (x0 - x) as u32, (y0 - y) as u32))
}

struct RowJob<'r> {
    x: u32,
    y: u32,
    src: &'r [u8],
    mask: Option<&'r [u8]>,
    base: Option<&'r [u8]>,
    dst: &'r mut [u8],
}

impl Applicator {
    /// Creates an applicator with full opacity affecting every channel.
    pub fn new(mode: LayerMode) -> Self {
        Self {
            mode,
            opacity: 1.0,
            affect: [true; 4],
        }
    }

    /// Sets opacity, consuming `self`.
    pub fn with_opacity(mut self, opacity: f32) -> OpsResult<Self> {
        self.set_opacity(opacity)?;
        Ok(self)
    }

    /// Layer mode.
    pub fn mode(&self) -> LayerMode {
        self.mode
    }

    /// Changes the layer mode.
    pub fn set_mode(&mut self, mode: LayerMode) {
        self.mode = mode;
    }

    /// Opacity in [0, 1].
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Changes opacity. Values outside [0, 1] are rejected.
    pub fn set_opacity(&mut self, opacity: f32) -> OpsResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(OpsError::InvalidParameter(format!(
                "opacity {opacity} outside [0, 1]"
            )));
        }
        self.opacity = opacity;
        Ok(())
    }

    /// Channels the applicator may change, RGBA order. Gray formats use the
    /// first entry for the gray channel.
    pub fn affect(&self) -> [bool; 4] {
        self.affect
    }

    /// Restricts which channels are written.
    pub fn set_affect(&mut self, affect: [bool; 4]) {
        self.affect = affect;
    }

    /// Destination rectangle an [`apply`](Self::apply) with the same
    /// arguments would process, after every check that can fail before
    /// pixels are touched.
    pub fn affected_area(
        &self,
        request: &ApplyRequest<'_>,
        dst: &Buffer,
        dst_x: i32,
        dst_y: i32,
    ) -> OpsResult<Option<Rect>> {
        Ok(self.plan(request, dst, dst_x, dst_y)?.map(|plan| plan.area))
    }

    fn plan<'a>(
        &self,
        request: &ApplyRequest<'a>,
        dst: &Buffer,
        dst_x: i32,
        dst_y: i32,
    ) -> OpsResult<Option<Plan<'a>>> {
        self.mode.check_format(&dst.format())?;
        request.src.check_bounds(&request.src_rect)?;

        let (mut width, mut height) = (request.src_rect.width, request.src_rect.height);
        if let Some((mask, mx, my)) = request.mask {
            let mask_format = mask.format();
            if mask_format.base_type() != BaseType::Gray {
                return Err(Error::format_mismatch("grayscale mask", mask_format.name()).into());
            }
            width = width.min(mask.width().saturating_sub(mx));
            height = height.min(mask.height().saturating_sub(my));
        }

        let Some((area, sx, sy)) = place(width, height, dst_x, dst_y, dst.extent()) else {
            trace!(dst_x, dst_y, width, height, "applicator target outside destination");
            return Ok(None);
        };
        if self.opacity == 0.0 && request.base.is_none() {
            trace!(?area, "zero opacity, destination untouched");
            return Ok(None);
        }

        let base = match request.base {
            Some(base) => {
                base.check_bounds(&area)?;
                Some((base, area))
            }
            None => None,
        };
        let src = request.src_rect;
        Ok(Some(Plan {
            area,
            src_area: Rect::new(src.x + sx, src.y + sy, area.width, area.height),
            mask: request
                .mask
                .map(|(mask, mx, my)| (mask, Rect::new(mx + sx, my + sy, area.width, area.height))),
            base,
        }))
    }

    /// Merges the request's source into `dst` with the source origin at
    /// (`dst_x`, `dst_y`). The origin may lie outside `dst`; only the
    /// overlapping part is processed.
    ///
    /// Returns the destination rectangle that was processed, or `None` when
    /// nothing could change (no overlap, or zero opacity without a base).
    pub fn apply(
        &self,
        request: ApplyRequest<'_>,
        dst: &mut Buffer,
        dst_x: i32,
        dst_y: i32,
    ) -> OpsResult<Option<Rect>> {
        let Some(plan) = self.plan(&request, dst, dst_x, dst_y)? else {
            return Ok(None);
        };
        let format = dst.format();
        let ctx = dst.context().clone();
        let area = plan.area;
        let unit = Rect::from_size(area.width, area.height);

        let converted_src;
        let (src, src_area) = if request.src.format() == format {
            (request.src, plan.src_area)
        } else {
            converted_src = convert_region(request.src, plan.src_area, format)?;
            (&converted_src, unit)
        };

        let converted_base;
        let base = match plan.base {
            Some((buffer, rect)) if buffer.format() != format => {
                converted_base = convert_region(buffer, rect, format)?;
                Some((&converted_base, unit))
            }
            other => other,
        };

        let mask = plan.mask;
        let mask_format = mask.map(|(buffer, _)| buffer.format());

        debug!(
            mode = %self.mode,
            opacity = self.opacity,
            ?area,
            masked = mask.is_some(),
            based = base.is_some(),
            "applying"
        );

        let mut iter = RegionIter::new();
        if let Some(progress) = request.progress {
            iter = iter.with_progress(progress);
        }
        iter.add_read(src, src_area)?;
        let mask_index = match mask {
            Some((buffer, rect)) => Some(iter.add_read(buffer, rect)?),
            None => None,
        };
        let base_index = match base {
            Some((buffer, rect)) => Some(iter.add_read(buffer, rect)?),
            None => None,
        };
        // Destination goes last so the inputs split off as one slice
        if base.is_some() {
            iter.add_write(dst, area)?;
        } else {
            iter.add_read_write(dst, area)?;
        }

        while let Some(mut step) = iter.next_step()? {
            let Some((dst_span, inputs)) = step.spans.split_last_mut() else {
                return Err(Error::other("applicator step without spans").into());
            };
            let inputs = &*inputs;
            let (x0, y0) = (dst_span.x, dst_span.y);
            let src_span = &inputs[0];
            let mask_span = mask_index.map(|i| &inputs[i]);
            let base_span = base_index.map(|i| &inputs[i]);

            let Some(rows) = dst_span.rows_mut() else {
                return Err(Error::other("destination span is not writable").into());
            };
            let jobs: Vec<RowJob<'_>> = rows
                .enumerate()
                .map(|(r, dst)| {
                    let r = r as u32;
                    RowJob {
                        x: x0,
                        y: y0 + r,
                        src: src_span.row(r),
                        mask: mask_span.map(|s| s.row(r)),
                        base: base_span.map(|s| s.row(r)),
                        dst,
                    }
                })
                .collect();
            for_each_row(&ctx, jobs, |job| self.blend_row(&format, mask_format.as_ref(), job))?;
        }

        Ok(Some(area))
    }

    fn blend_row(&self, format: &Format, mask_format: Option<&Format>, job: RowJob<'_>) {
        let bpp = format.bytes_per_pixel();
        let mask_bpp = mask_format.map_or(0, |f| f.bytes_per_pixel());

        for (i, out) in job.dst.chunks_exact_mut(bpp).enumerate() {
            let px = i * bpp..(i + 1) * bpp;
            let t = match (job.mask, mask_format) {
                (Some(mask), Some(mf)) => {
                    let m = decode_rgba(mf, &mask[i * mask_bpp..(i + 1) * mask_bpp]);
                    self.opacity * m[0].clamp(0.0, 1.0) * m[3]
                }
                _ => self.opacity,
            };

            if t <= 0.0 {
                if let Some(base) = job.base {
                    out.copy_from_slice(&base[px]);
                }
                continue;
            }

            let under = match job.base {
                Some(base) => decode_rgba(format, &base[px.clone()]),
                None => decode_rgba(format, out),
            };
            let src = decode_rgba(format, &job.src[px]);
            let mut blended = self.mode.composite(under, src, t, job.x + i as u32, job.y);
            for c in 0..4 {
                if !self.affect[c] {
                    blended[c] = under[c];
                }
            }
            encode_rgba(format, &blended, out);
        }
    }
}

/// Copies `rect` of `src` into a new buffer of `format`.
pub(crate) fn convert_region(src: &Buffer, rect: Rect, format: Format) -> OpsResult<Buffer> {
    let mut converted =
        Buffer::with_tile_size(src.context(), rect.width, rect.height, format, src.tile_size())?;
    Buffer::copy_rect(src, rect, &mut converted, 0, 0)?;
    debug!(from = %src.format(), to = %format, ?rect, "converted source region");
    Ok(converted)
}
