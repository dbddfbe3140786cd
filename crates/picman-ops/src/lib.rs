//! # picman-ops
//!
//! Compositing and drawables on top of [`picman_tiles`].
//!
//! # Modules
//!
//! - [`mode`] - Layer modes and per-pixel blend formulas
//! - [`applicator`] - Merging a source region into a destination buffer
//! - [`filter`] - Operation nodes, filters and filter stacks
//! - [`drawable`] - Capability traits: viewable, drawable, filterable
//! - [`layer`] - The layer drawable
//! - [`undo`] - Undo hook and a snapshot history
//! - [`events`] - Drawable change notification
//!
//! # Example
//!
//! ```rust
//! use picman_core::{Format, Rect};
//! use picman_ops::{Applicator, ApplyRequest, LayerMode};
//! use picman_tiles::{Buffer, Context};
//!
//! let ctx = Context::default();
//! let mut red = Buffer::new(&ctx, 128, 128, Format::RGB_U8).unwrap();
//! red.fill(&[255, 0, 0]).unwrap();
//! let mut blue = Buffer::new(&ctx, 256, 256, Format::RGB_U8).unwrap();
//! blue.fill(&[0, 0, 255]).unwrap();
//!
//! let area = Applicator::new(LayerMode::Normal)
//!     .apply(ApplyRequest::whole(&red), &mut blue, 64, 64)
//!     .unwrap();
//! assert_eq!(area, Some(Rect::new(64, 64, 128, 128)));
//! assert_eq!(blue.get_pixel(100, 100).unwrap(), vec![255, 0, 0]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
mod parallel;

pub mod applicator;
pub mod drawable;
pub mod events;
pub mod filter;
pub mod layer;
pub mod mode;
pub mod undo;

pub use applicator::{Applicator, ApplyRequest};
pub use drawable::{Drawable, Filterable, Viewable};
pub use error::{OpsError, OpsResult};
pub use events::{DrawableEvent, Observers};
pub use filter::{BufferSource, ColorFill, Desaturate, Filter, FilterStack, Invert, NodeState, Operation};
pub use layer::Layer;
pub use mode::LayerMode;
pub use picman_tiles::{AbortHandle, Progress};
pub use undo::{SnapshotUndo, UndoHandle, UndoSink, UndoStep};
