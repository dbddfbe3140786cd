//! Filter nodes and per-drawable filter stacks.
//!
//! A [`Filter`] pairs a processing [`Operation`] with the [`Applicator`] that
//! merges the operation's output back into the drawable. The operation is
//! created on first use: [`Filter::get_node`] builds it, [`Filter::peek_node`]
//! only looks.
//!
//! Filters move through a small state machine while they sit in a
//! [`FilterStack`]:
//!
//! ```text
//!   Unattached --push--> Attached
//!   Unattached --push_last--> AttachedLast --begin_pass--> Attached
//!   Attached | AttachedLast --remove--> Unattached
//! ```
//!
//! Once a stack holds a last node nothing more can be appended until the next
//! [`FilterStack::begin_pass`].

use std::fmt;

use picman_core::codec::{decode_rgba, encode_rgba};
use picman_core::{Error, Format, Rect, luminance_rec709};
use picman_tiles::{Buffer, Progress, RegionIter};
use tracing::{debug, trace};

use crate::applicator::{Applicator, ApplyRequest, signed};
use crate::{OpsError, OpsResult};

/// A pixel processing node.
pub trait Operation: Send + Sync + fmt::Debug {
    /// Short operation name.
    fn name(&self) -> &str;

    /// Renders `rect` of `input` into a new buffer of `rect`'s size and
    /// `input`'s format.
    fn process(&self, input: &Buffer, rect: Rect) -> OpsResult<Buffer>;
}

/// Solid color output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFill {
    /// RGBA in the input's model and transfer.
    pub color: [f32; 4],
}

impl ColorFill {
    /// Fill with `color`.
    pub fn new(color: [f32; 4]) -> Self {
        Self { color }
    }
}

impl Operation for ColorFill {
    fn name(&self) -> &str {
        "color-fill"
    }

    fn process(&self, input: &Buffer, rect: Rect) -> OpsResult<Buffer> {
        let mut out = output_for(input, rect)?;
        out.fill_color(self.color)?;
        Ok(out)
    }
}

/// Inverts color channels, alpha is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invert;

impl Operation for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn process(&self, input: &Buffer, rect: Rect) -> OpsResult<Buffer> {
        map_pixels(input, rect, |[r, g, b, a]| [1.0 - r, 1.0 - g, 1.0 - b, a])
    }
}

/// Replaces color with its Rec. 709 luminance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Desaturate;

impl Operation for Desaturate {
    fn name(&self) -> &str {
        "desaturate"
    }

    fn process(&self, input: &Buffer, rect: Rect) -> OpsResult<Buffer> {
        map_pixels(input, rect, |[r, g, b, a]| {
            let y = luminance_rec709([r, g, b]);
            [y, y, y, a]
        })
    }
}

/// Pixels of a held buffer, read at the same coordinates.
#[derive(Debug)]
pub struct BufferSource {
    buffer: Buffer,
}

impl BufferSource {
    /// Serves pixels from `buffer`.
    pub fn new(buffer: Buffer) -> Self {
        Self { buffer }
    }

    /// The held buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

impl Operation for BufferSource {
    fn name(&self) -> &str {
        "buffer-source"
    }

    fn process(&self, input: &Buffer, rect: Rect) -> OpsResult<Buffer> {
        let mut out = output_for(input, rect)?;
        Buffer::copy_rect(&self.buffer, rect, &mut out, 0, 0)?;
        Ok(out)
    }
}

fn output_for(input: &Buffer, rect: Rect) -> OpsResult<Buffer> {
    input.check_bounds(&rect)?;
    Ok(Buffer::with_tile_size(
        input.context(),
        rect.width,
        rect.height,
        input.format(),
        input.tile_size(),
    )?)
}

fn map_pixels(input: &Buffer, rect: Rect, f: impl Fn([f32; 4]) -> [f32; 4]) -> OpsResult<Buffer> {
    let mut out = output_for(input, rect)?;
    let format: Format = input.format();
    let bpp = format.bytes_per_pixel();

    let mut iter = RegionIter::new();
    iter.add_read(input, rect)?;
    iter.add_write(&mut out, Rect::from_size(rect.width, rect.height))?;
    while let Some(mut step) = iter.next_step()? {
        let Some((src, dst)) = step.pair_mut() else {
            return Err(Error::other("operation step without spans").into());
        };
        let src = &*src;
        let Some(rows) = dst.rows_mut() else {
            return Err(Error::other("operation output is not writable").into());
        };
        for (r, row) in rows.enumerate() {
            let in_row = src.row(r as u32);
            for (px, out_px) in in_row.chunks_exact(bpp).zip(row.chunks_exact_mut(bpp)) {
                encode_rgba(&format, &f(decode_rgba(&format, px)), out_px);
            }
        }
    }
    drop(iter);
    Ok(out)
}

/// Attachment state of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Not part of a stack.
    #[default]
    Unattached,
    /// Part of a stack.
    Attached,
    /// Part of a stack and closing the current pass.
    AttachedLast,
}

type NodeFactory = Box<dyn Fn() -> Box<dyn Operation> + Send + Sync>;

/// A named operation plus the applicator merging its output.
pub struct Filter {
    name: String,
    factory: NodeFactory,
    node: Option<Box<dyn Operation>>,
    applicator: Applicator,
    state: NodeState,
    active: bool,
    region: Option<Rect>,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("node", &self.node)
            .field("applicator", &self.applicator)
            .field("state", &self.state)
            .field("active", &self.active)
            .field("region", &self.region)
            .finish()
    }
}

impl Filter {
    /// Creates a filter whose node is built by `factory` on first use.
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Operation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Box::new(factory),
            node: None,
            applicator: Applicator::default(),
            state: NodeState::Unattached,
            active: true,
            region: None,
        }
    }

    /// Creates a filter building its node from a copy of `operation`.
    pub fn from_operation<O>(name: impl Into<String>, operation: O) -> Self
    where
        O: Operation + Clone + 'static,
    {
        Self::new(name, move || -> Box<dyn Operation> { Box::new(operation.clone()) })
    }

    /// Filter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current attachment state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Blend settings.
    pub fn applicator(&self) -> &Applicator {
        &self.applicator
    }

    /// Blend settings, mutable.
    pub fn applicator_mut(&mut self) -> &mut Applicator {
        &mut self.applicator
    }

    /// Replaces the blend settings, consuming `self`.
    pub fn with_applicator(mut self, applicator: Applicator) -> Self {
        self.applicator = applicator;
        self
    }

    /// Whether the filter takes part in rendering.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the filter.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Area the filter is limited to, `None` for the whole drawable.
    pub fn region(&self) -> Option<Rect> {
        self.region
    }

    /// Limits the filter to `region`.
    pub fn set_region(&mut self, region: Option<Rect>) {
        self.region = region;
    }

    /// The operation node, created on first call.
    pub fn get_node(&mut self) -> &dyn Operation {
        let factory = &self.factory;
        let node = self.node.get_or_insert_with(|| {
            trace!("creating filter node");
            factory()
        });
        &**node
    }

    /// The operation node if it was created.
    pub fn peek_node(&self) -> Option<&dyn Operation> {
        self.node.as_deref()
    }
}

/// Ordered filters of one drawable.
#[derive(Debug, Default)]
pub struct FilterStack {
    filters: Vec<Filter>,
}

impl FilterStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters, bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Filter called `name`.
    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Filter called `name`, mutable.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Filter> {
        self.filters.iter_mut().find(|f| f.name == name)
    }

    /// Whether the current pass is closed by a last node.
    pub fn has_last(&self) -> bool {
        self.filters.iter().any(|f| f.state == NodeState::AttachedLast)
    }

    /// Appends `filter`.
    pub fn push(&mut self, filter: Filter) -> OpsResult<()> {
        self.attach(filter, NodeState::Attached)
    }

    /// Appends `filter` as the last node of the current pass.
    pub fn push_last(&mut self, filter: Filter) -> OpsResult<()> {
        self.attach(filter, NodeState::AttachedLast)
    }

    fn attach(&mut self, mut filter: Filter, state: NodeState) -> OpsResult<()> {
        if filter.state != NodeState::Unattached {
            return Err(OpsError::InvalidNodeState(format!(
                "filter '{}' is already attached",
                filter.name
            )));
        }
        if self.has_last() {
            return Err(OpsError::InvalidNodeState(format!(
                "cannot append '{}' after the last node of this pass",
                filter.name
            )));
        }
        filter.state = state;
        debug!(name = %filter.name, ?state, "filter attached");
        self.filters.push(filter);
        Ok(())
    }

    /// Starts a new pass: the last node becomes an ordinary attached node.
    pub fn begin_pass(&mut self) {
        for filter in &mut self.filters {
            if filter.state == NodeState::AttachedLast {
                filter.state = NodeState::Attached;
            }
        }
    }

    /// Detaches and returns the filter called `name`.
    pub fn remove(&mut self, name: &str) -> Option<Filter> {
        let pos = self.filters.iter().position(|f| f.name == name)?;
        let mut filter = self.filters.remove(pos);
        filter.state = NodeState::Unattached;
        debug!(name, "filter detached");
        Some(filter)
    }

    /// Detaches every filter, returning them bottom to top.
    pub fn drain(&mut self) -> Vec<Filter> {
        let mut filters: Vec<Filter> = self.filters.drain(..).collect();
        for filter in &mut filters {
            filter.state = NodeState::Unattached;
        }
        filters
    }

    /// Runs every active filter over `buffer`, bottom to top, merging each
    /// output back through the filter's applicator.
    ///
    /// Returns the union of the changed areas.
    pub fn render(&mut self, buffer: &mut Buffer, progress: Option<&Progress>) -> OpsResult<Option<Rect>> {
        let mut changed: Option<Rect> = None;
        for filter in self.filters.iter_mut().filter(|f| f.active) {
            let extent = buffer.extent();
            let rect = match filter.region {
                Some(region) => region.intersect(&extent),
                None => Some(extent),
            };
            let Some(rect) = rect else {
                trace!(name = %filter.name, "filter region outside drawable");
                continue;
            };

            let applicator = filter.applicator;
            let output = filter.get_node().process(buffer, rect)?;
            let mut request = ApplyRequest::whole(&output);
            if let Some(progress) = progress {
                request = request.with_progress(progress);
            }
            let (x, y) = (signed(rect.x)?, signed(rect.y)?);
            if let Some(area) = applicator.apply(request, buffer, x, y)? {
                changed = Some(changed.map_or(area, |c| c.union(&area)));
            }
            debug!(name = %filter.name, ?rect, "filter rendered");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::LayerMode;
    use approx::assert_relative_eq;
    use picman_tiles::Context;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rgb(ctx: &Context, color: [f32; 4]) -> Buffer {
        let mut b = Buffer::new(ctx, 70, 40, Format::RGB_U8).unwrap();
        b.fill_color(color).unwrap();
        b
    }

    #[test]
    fn test_node_created_lazily() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut filter = Filter::new("inv", move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Box::new(Invert) as Box<dyn Operation>
        });
        assert!(filter.peek_node().is_none());
        assert_eq!(filter.get_node().name(), "invert");
        assert_eq!(filter.get_node().name(), "invert");
        assert_eq!(built.load(Ordering::Relaxed), 1);
        assert!(filter.peek_node().is_some());
    }

    #[test]
    fn test_state_machine() {
        let mut stack = FilterStack::new();
        stack.push(Filter::from_operation("a", Invert)).unwrap();
        stack.push_last(Filter::from_operation("b", Desaturate)).unwrap();
        assert!(stack.has_last());
        assert_eq!(stack.get("b").unwrap().state(), NodeState::AttachedLast);

        let err = stack.push(Filter::from_operation("c", Invert)).unwrap_err();
        assert!(matches!(err, OpsError::InvalidNodeState(_)));

        stack.begin_pass();
        assert_eq!(stack.get("b").unwrap().state(), NodeState::Attached);
        stack.push(Filter::from_operation("c", Invert)).unwrap();
        assert_eq!(stack.len(), 3);

        let removed = stack.remove("a").unwrap();
        assert_eq!(removed.state(), NodeState::Unattached);
        assert!(stack.remove("a").is_none());

        let drained = stack.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|f| f.state() == NodeState::Unattached));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_attached_filter_rejected() {
        let mut stack = FilterStack::new();
        stack.push(Filter::from_operation("a", Invert)).unwrap();
        let mut other = FilterStack::new();
        let mut filter = Filter::from_operation("x", Invert);
        filter.state = NodeState::Attached;
        assert!(matches!(other.push(filter), Err(OpsError::InvalidNodeState(_))));
    }

    #[test]
    fn test_invert() {
        let ctx = Context::default();
        let buffer = rgb(&ctx, [1.0, 0.0, 0.2, 1.0]);
        let out = Invert.process(&buffer, Rect::new(60, 30, 10, 10)).unwrap();
        assert_eq!(out.width(), 10);
        assert_eq!(out.get_pixel(9, 9).unwrap(), vec![0, 255, 204]);
    }

    #[test]
    fn test_desaturate() {
        let ctx = Context::default();
        let buffer = rgb(&ctx, [0.0, 1.0, 0.0, 1.0]);
        let out = Desaturate.process(&buffer, buffer.extent()).unwrap();
        let px = out.sample_color(5, 5).unwrap();
        assert_relative_eq!(px[0], px[2]);
        assert_relative_eq!(px[0], 0.7152, epsilon = 0.005);
    }

    #[test]
    fn test_render_merges_through_applicator() {
        let ctx = Context::default();
        let mut buffer = rgb(&ctx, [0.0, 0.0, 1.0, 1.0]);
        let mut stack = FilterStack::new();
        let mut fill = Filter::from_operation("fill", ColorFill::new([1.0, 0.0, 0.0, 1.0]));
        fill.set_region(Some(Rect::new(0, 0, 10, 10)));
        stack.push(fill).unwrap();

        let changed = stack.render(&mut buffer, None).unwrap();
        assert_eq!(changed, Some(Rect::new(0, 0, 10, 10)));
        assert_eq!(buffer.get_pixel(9, 9).unwrap(), vec![255, 0, 0]);
        assert_eq!(buffer.get_pixel(10, 9).unwrap(), vec![0, 0, 255]);
    }

    #[test]
    fn test_render_skips_inactive_and_zero_opacity() {
        let ctx = Context::default();
        let mut buffer = rgb(&ctx, [0.0, 0.0, 1.0, 1.0]);
        let before = buffer.get_rect(buffer.extent()).unwrap();

        let mut stack = FilterStack::new();
        let mut off = Filter::from_operation("off", Invert);
        off.set_active(false);
        stack.push(off).unwrap();
        let app = Applicator::new(LayerMode::Normal).with_opacity(0.0).unwrap();
        stack
            .push(Filter::from_operation("clear", Invert).with_applicator(app))
            .unwrap();

        assert_eq!(stack.render(&mut buffer, None).unwrap(), None);
        assert_eq!(buffer.get_rect(buffer.extent()).unwrap(), before);
        // Inactive filters never build a node
        assert!(stack.get("off").unwrap().peek_node().is_none());
    }

    #[test]
    fn test_buffer_source() {
        let ctx = Context::default();
        let held = rgb(&ctx, [0.0, 1.0, 0.0, 1.0]);
        let input = rgb(&ctx, [0.0, 0.0, 0.0, 1.0]);
        let out = BufferSource::new(held).process(&input, Rect::new(5, 5, 3, 3)).unwrap();
        assert_eq!(out.get_pixel(0, 0).unwrap(), vec![0, 255, 0]);
    }
}
