//! Layers: the drawable of an image stack.

use std::sync::mpsc::Receiver;

use picman_core::{BaseType, Error, Format, Precision, Rect};
use picman_tiles::{Buffer, Context, Progress};
use tracing::{debug, trace};

use crate::applicator::{Applicator, ApplyRequest};
use crate::drawable::{Drawable, Filterable, Viewable};
use crate::events::{DrawableEvent, Observers};
use crate::filter::FilterStack;
use crate::mode::LayerMode;
use crate::undo::UndoHandle;
use crate::{OpsError, OpsResult};

/// A named buffer with an offset, filters, an undo hook and observers.
#[derive(Debug)]
pub struct Layer {
    id: u64,
    name: String,
    buffer: Buffer,
    offset: (i32, i32),
    shadow: Option<Buffer>,
    filters: FilterStack,
    undo: Option<UndoHandle>,
    observers: Observers,
}

impl Layer {
    /// Creates a transparent (zero-filled) layer.
    pub fn new(
        ctx: &Context,
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: Format,
    ) -> OpsResult<Self> {
        let buffer = Buffer::new(ctx, width, height, format)?;
        Ok(Self::from_buffer(name, buffer))
    }

    /// Wraps an existing buffer.
    pub fn from_buffer(name: impl Into<String>, buffer: Buffer) -> Self {
        Self {
            id: buffer.context().next_buffer_id(),
            name: name.into(),
            buffer,
            offset: (0, 0),
            shadow: None,
            filters: FilterStack::new(),
            undo: None,
            observers: Observers::new(),
        }
    }

    /// Context the pixels live in.
    pub fn context(&self) -> &Context {
        self.buffer.context()
    }

    /// Renames the layer.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Moves the layer within the image.
    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.offset = (x, y);
    }

    /// Adds the layer to an image whose history is `undo`.
    pub fn attach(&mut self, undo: UndoHandle) {
        self.undo = Some(undo);
    }

    /// Removes the layer from its image.
    pub fn detach(&mut self) -> Option<UndoHandle> {
        self.undo.take()
    }

    /// Whether the layer belongs to an image.
    pub fn is_attached(&self) -> bool {
        self.undo.is_some()
    }

    fn push_undo(&self, push_undo: bool, desc: &str, rect: Rect) -> OpsResult<()> {
        if !push_undo {
            return Ok(());
        }
        let Some(undo) = &self.undo else {
            trace!(layer = self.id, desc, "not attached, undo skipped");
            return Ok(());
        };
        let mut sink = undo
            .lock()
            .map_err(|_| Error::other("undo sink lock poisoned"))?;
        sink.push(self.id, desc, rect, &self.buffer)
    }

    fn emit(&mut self, event: DrawableEvent) {
        self.observers.emit(event);
    }

    /// Adds an opaque alpha channel if there is none.
    pub fn add_alpha(&mut self, push_undo: bool) -> OpsResult<()> {
        if self.has_alpha() {
            return Ok(());
        }
        self.push_undo(push_undo, "Add Alpha Channel", self.bounds())?;
        self.buffer = self.buffer.convert(self.format_with_alpha())?;
        self.shadow = None;
        self.emit(DrawableEvent::AlphaChanged);
        self.update(self.bounds());
        Ok(())
    }

    /// Scratch buffer of the layer's size and format, for tools that render
    /// beside the pixels before committing with [`Layer::merge_shadow`].
    pub fn shadow_buffer(&mut self) -> OpsResult<&mut Buffer> {
        let fits = |s: &Buffer| s.format() == self.buffer.format() && s.extent() == self.buffer.extent();
        let shadow = match self.shadow.take() {
            Some(shadow) if fits(&shadow) => shadow,
            _ => Buffer::with_tile_size(
                self.buffer.context(),
                self.buffer.width(),
                self.buffer.height(),
                self.buffer.format(),
                self.buffer.tile_size(),
            )?,
        };
        Ok(self.shadow.insert(shadow))
    }

    /// Whether a shadow buffer exists.
    pub fn has_shadow(&self) -> bool {
        self.shadow.is_some()
    }

    /// Copies the shadow buffer into the pixels and frees it.
    pub fn merge_shadow(&mut self, push_undo: bool, desc: &str) -> OpsResult<()> {
        let Some(shadow) = self.shadow.take() else {
            return Err(OpsError::InvalidParameter("no shadow buffer to merge".into()));
        };
        self.push_undo(push_undo, desc, self.bounds())?;
        Buffer::copy_rect(&shadow, shadow.extent(), &mut self.buffer, 0, 0)?;
        debug!(layer = self.id, desc, "shadow merged");
        self.update(self.bounds());
        Ok(())
    }
}

impl Viewable for Layer {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.buffer.width()
    }

    fn height(&self) -> u32 {
        self.buffer.height()
    }

    fn format(&self) -> Format {
        self.buffer.format()
    }
}

impl Drawable for Layer {
    fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    fn offset(&self) -> (i32, i32) {
        self.offset
    }

    fn set_buffer(&mut self, push_undo: bool, desc: &str, buffer: Buffer, offset: (i32, i32)) -> OpsResult<()> {
        self.push_undo(push_undo, desc, self.bounds())?;
        let old = self.buffer.format();
        let new = buffer.format();
        self.buffer = buffer;
        self.offset = offset;
        self.shadow = None;
        debug!(layer = self.id, desc, format = %new, "buffer replaced");

        self.emit(DrawableEvent::BufferChanged);
        if old.has_alpha() != new.has_alpha() {
            self.emit(DrawableEvent::AlphaChanged);
        }
        if old.with_alpha() != new.with_alpha() {
            self.emit(DrawableEvent::FormatChanged);
        }
        self.update(self.bounds());
        Ok(())
    }

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
    ) -> OpsResult<()> {
        let applicator = Applicator::new(mode).with_opacity(opacity)?;
        let mut request = ApplyRequest::new(buffer, region);
        if let Some(base) = base {
            request = request.with_base(base);
        }
        let Some(affected) = applicator.affected_area(&request, &self.buffer, base_x, base_y)? else {
            return Ok(());
        };

        self.push_undo(push_undo, desc, affected)?;
        if let Some(area) = applicator.apply(request, &mut self.buffer, base_x, base_y)? {
            self.update(area);
        }
        Ok(())
    }

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
    ) -> OpsResult<()> {
        let applicator = Applicator::new(LayerMode::Replace).with_opacity(opacity)?;
        let mut request = ApplyRequest::new(buffer, region);
        if let Some(mask) = mask {
            if (mask_region.width, mask_region.height) != (region.width, region.height) {
                return Err(Error::size_mismatch(
                    (region.width, region.height),
                    (mask_region.width, mask_region.height),
                )
                .into());
            }
            mask.check_bounds(&mask_region)?;
            request = request.with_mask(mask, mask_region.x, mask_region.y);
        }
        let Some(affected) = applicator.affected_area(&request, &self.buffer, x, y)? else {
            return Ok(());
        };

        self.push_undo(push_undo, desc, affected)?;
        if let Some(area) = applicator.apply(request, &mut self.buffer, x, y)? {
            self.update(area);
        }
        Ok(())
    }

    fn swap_pixels(&mut self, buffer: &mut Buffer, x: i32, y: i32) -> OpsResult<()> {
        if buffer.format() != self.format() {
            return Err(Error::format_mismatch(self.format().name(), buffer.format().name()).into());
        }
        let (Ok(rx), Ok(ry)) = (u32::try_from(x), u32::try_from(y)) else {
            return Err(OpsError::InvalidParameter(format!("swap origin ({x}, {y}) is negative")));
        };
        let rect = Rect::new(rx, ry, buffer.width(), buffer.height());
        self.buffer.check_bounds(&rect)?;

        let ours = self.buffer.get_rect(rect)?;
        let theirs = buffer.get_rect(buffer.extent())?;
        self.buffer.set_rect(rect, &theirs)?;
        buffer.set_rect(buffer.extent(), &ours)?;
        trace!(layer = self.id, ?rect, "pixels swapped");
        self.update(rect);
        Ok(())
    }

    fn update(&mut self, rect: Rect) {
        if let Some(rect) = rect.intersect(&self.bounds()) {
            self.emit(DrawableEvent::Update(rect));
        }
    }

    fn convert_type(&mut self, base: BaseType, precision: Precision, push_undo: bool) -> OpsResult<()> {
        let current = self.format();
        let target = Format::new(base, precision, current.has_alpha())?;
        if target == current {
            return Ok(());
        }
        self.push_undo(push_undo, "Convert Image", self.bounds())?;
        self.buffer = self.buffer.convert(target)?;
        self.shadow = None;
        debug!(layer = self.id, from = %current, to = %target, "layer converted");
        self.emit(DrawableEvent::FormatChanged);
        self.update(self.bounds());
        Ok(())
    }

    fn subscribe(&mut self) -> Receiver<DrawableEvent> {
        self.observers.subscribe()
    }
}

impl Filterable for Layer {
    fn filters(&self) -> &FilterStack {
        &self.filters
    }

    fn filters_mut(&mut self) -> &mut FilterStack {
        &mut self.filters
    }

    fn apply_filters(&mut self, push_undo: bool, desc: &str, progress: Option<&Progress>) -> OpsResult<Option<Rect>> {
        if self.filters.is_empty() {
            return Ok(None);
        }
        self.push_undo(push_undo, desc, self.bounds())?;
        let changed = self.filters.render(&mut self.buffer, progress)?;
        let merged = self.filters.drain();
        debug!(layer = self.id, filters = merged.len(), ?changed, "filters merged");
        if let Some(rect) = changed {
            self.update(rect);
        }
        Ok(changed)
    }
}
