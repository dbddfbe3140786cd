//! Drawable capabilities.
//!
//! - [`Viewable`]: identity, size and format
//! - [`Drawable`]: owns a pixel buffer and accepts pixel changes
//! - [`Filterable`]: carries a [`FilterStack`] merged into its pixels
//!
//! All mutations take `push_undo` and a description. The undo push happens
//! before any pixel changes and is skipped while the drawable is not attached
//! to an image.

use std::sync::mpsc::Receiver;

use picman_core::{BaseType, Format, Precision, Rect};
use picman_tiles::{Buffer, Progress};

use crate::OpsResult;
use crate::events::DrawableEvent;
use crate::filter::FilterStack;
use crate::mode::LayerMode;

/// Something with a size and a pixel format.
pub trait Viewable {
    /// Unique id within the context.
    fn id(&self) -> u64;

    /// Display name.
    fn name(&self) -> &str;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Pixel format.
    fn format(&self) -> Format;

    /// `(0, 0, width, height)`.
    fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }
}

/// A viewable backed by a pixel buffer.
pub trait Drawable: Viewable {
    /// The backing buffer.
    fn buffer(&self) -> &Buffer;

    /// Position within the image.
    fn offset(&self) -> (i32, i32);

    /// Replaces the backing buffer and moves the drawable to `offset`.
    fn set_buffer(&mut self, push_undo: bool, desc: &str, buffer: Buffer, offset: (i32, i32)) -> OpsResult<()>;

    /// Blends `region` of `buffer` into the drawable at (`base_x`, `base_y`).
    ///
    /// The position may be negative or hang past the edges; only the
    /// overlap is processed. With `base`, the result is `base` blended with
    /// the source and the drawable's own pixels are ignored; the base is
    /// read at the same coordinates as the destination.
    #[allow(clippy::too_many_arguments)]
    fn apply_buffer(
        &mut self,
        buffer: &Buffer,
        region: Rect,
        push_undo: bool,
        desc: &str,
        opacity: f32,
        mode: LayerMode,
        base: Option<&Buffer>,
        base_x: i32,
        base_y: i32,
    ) -> OpsResult<()>;

    /// Replaces pixels at (`x`, `y`) with `region` of `buffer`, weighted by
    /// opacity and an optional mask whose `mask_region` matches `region` in
    /// size. Placement is clipped like [`apply_buffer`](Self::apply_buffer).
    #[allow(clippy::too_many_arguments)]
    fn replace_buffer(
        &mut self,
        buffer: &Buffer,
        region: Rect,
        push_undo: bool,
        desc: &str,
        opacity: f32,
        mask: Option<&Buffer>,
        mask_region: Rect,
        x: i32,
        y: i32,
    ) -> OpsResult<()>;

    /// Exchanges the whole of `buffer` with the same-sized area at
    /// (`x`, `y`), which must lie inside the drawable. Not undoable itself;
    /// undo uses it.
    fn swap_pixels(&mut self, buffer: &mut Buffer, x: i32, y: i32) -> OpsResult<()>;

    /// Notifies observers that `rect` changed.
    fn update(&mut self, rect: Rect);

    /// Converts pixels to another base type and precision, keeping alpha.
    fn convert_type(&mut self, base: BaseType, precision: Precision, push_undo: bool) -> OpsResult<()>;

    /// Registers a change observer.
    fn subscribe(&mut self) -> Receiver<DrawableEvent>;

    /// Whether the format carries alpha.
    fn has_alpha(&self) -> bool {
        self.format().has_alpha()
    }

    /// Current format with an alpha channel.
    fn format_with_alpha(&self) -> Format {
        self.format().with_alpha()
    }

    /// Current format without an alpha channel.
    fn format_without_alpha(&self) -> Format {
        self.format().without_alpha()
    }

    /// Whether pixels are stored with linear transfer.
    fn is_linear(&self) -> bool {
        self.format().is_linear()
    }
}

/// A drawable with non-destructive filters.
pub trait Filterable: Drawable {
    /// Filter stack.
    fn filters(&self) -> &FilterStack;

    /// Filter stack, mutable.
    fn filters_mut(&mut self) -> &mut FilterStack;

    /// Whether any filter is attached.
    fn has_filters(&self) -> bool {
        !self.filters().is_empty()
    }

    /// Renders the filter stack into the pixels and detaches the filters.
    ///
    /// Returns the changed area.
    fn apply_filters(&mut self, push_undo: bool, desc: &str, progress: Option<&Progress>) -> OpsResult<Option<Rect>>;
}
