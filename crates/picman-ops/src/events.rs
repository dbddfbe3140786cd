//! Drawable change notification.

use std::sync::mpsc::{self, Receiver, Sender};

use picman_core::Rect;

/// Something observable happened to a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableEvent {
    /// Pixels in the rectangle changed.
    Update(Rect),
    /// The backing buffer was replaced.
    BufferChanged,
    /// An alpha channel was added or removed.
    AlphaChanged,
    /// Base type, precision or transfer changed.
    FormatChanged,
}

/// Registered observers of one drawable.
///
/// Receivers that were dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct Observers {
    senders: Vec<Sender<DrawableEvent>>,
}

impl Observers {
    /// No observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer.
    pub fn subscribe(&mut self) -> Receiver<DrawableEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    /// Sends `event` to every live observer.
    pub fn emit(&mut self, event: DrawableEvent) {
        self.senders.retain(|tx| tx.send(event).is_ok());
    }

    /// Observers still registered.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
