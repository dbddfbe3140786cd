//! Undo hook.
//!
//! Drawables call an [`UndoSink`] right before they change, handing over the
//! affected rectangle and a read view of the pixels as they still are. The
//! sink decides what to keep. [`SnapshotUndo`] keeps plain region copies and
//! can put them back.

use std::sync::{Arc, Mutex};

use picman_core::{Error, Format, Rect};
use picman_tiles::Buffer;
use tracing::debug;

use crate::OpsResult;
use crate::applicator::signed;
use crate::drawable::Drawable;

/// Receives the prior state of every undoable change.
pub trait UndoSink: Send + std::fmt::Debug {
    /// Called before `rect` of drawable `drawable` changes. `before` is the
    /// drawable's current buffer.
    fn push(&mut self, drawable: u64, desc: &str, rect: Rect, before: &Buffer) -> OpsResult<()>;
}

/// Undo sink shared between an image and its drawables.
pub type UndoHandle = Arc<Mutex<dyn UndoSink>>;

/// One recorded change.
#[derive(Debug, Clone)]
pub struct UndoStep {
    /// Drawable the change belongs to.
    pub drawable: u64,
    /// Human readable description.
    pub description: String,
    /// Affected rectangle in drawable coordinates.
    pub rect: Rect,
    /// Drawable size when the change was recorded.
    pub size: (u32, u32),
    /// Format of `pixels`.
    pub format: Format,
    pixels: Vec<u8>,
}

impl UndoStep {
    /// Saved pixel bytes of `rect`.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Reference sink storing region copies.
#[derive(Debug, Default)]
pub struct SnapshotUndo {
    steps: Vec<UndoStep>,
    limit: Option<usize>,
}

impl SnapshotUndo {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History keeping at most `limit` steps, oldest dropped first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            steps: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Recorded steps, oldest first.
    pub fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reverts the newest step recorded for `drawable`.
    ///
    /// Region steps are swapped back in place; steps recorded before a size
    /// or format change replace the whole buffer. Returns the description of
    /// the reverted step.
    pub fn undo(&mut self, drawable: &mut dyn Drawable) -> OpsResult<Option<String>> {
        let id = drawable.id();
        let Some(pos) = self.steps.iter().rposition(|s| s.drawable == id) else {
            return Ok(None);
        };
        let step = self.steps.remove(pos);

        let ctx = drawable.buffer().context().clone();
        let mut saved = Buffer::new(&ctx, step.rect.width, step.rect.height, step.format)?;
        saved.set_rect(saved.extent(), &step.pixels)?;

        let same_shape =
            step.format == drawable.format() && step.size == (drawable.width(), drawable.height());
        if same_shape {
            drawable.swap_pixels(&mut saved, signed(step.rect.x)?, signed(step.rect.y)?)?;
        } else if step.rect == Rect::from_size(step.size.0, step.size.1) {
            let offset = drawable.offset();
            drawable.set_buffer(false, &step.description, saved, offset)?;
        } else {
            return Err(Error::size_mismatch(step.size, (drawable.width(), drawable.height())).into());
        }
        debug!(drawable = id, desc = %step.description, "undo");
        Ok(Some(step.description))
    }
}

impl UndoSink for SnapshotUndo {
    fn push(&mut self, drawable: u64, desc: &str, rect: Rect, before: &Buffer) -> OpsResult<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let pixels = before.get_rect(rect)?;
        self.steps.push(UndoStep {
            drawable,
            description: desc.to_string(),
            rect,
            size: (before.width(), before.height()),
            format: before.format(),
            pixels,
        });
        if let Some(limit) = self.limit {
            let excess = self.steps.len().saturating_sub(limit);
            self.steps.drain(..excess);
        }
        Ok(())
    }
}
