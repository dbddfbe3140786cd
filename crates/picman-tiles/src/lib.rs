//! # picman-tiles
//!
//! Tiled pixel storage for picman.
//!
//! - [`CoreConfig`] - Tile size, cache budget, swap directory, workers
//! - [`Context`] - Session state: registry, shared cache, buffer ids
//! - [`TileCache`], [`SharedTileCache`] - LRU cache with pinning and write-back
//! - [`TileStore`] - Memory and swap-file backing stores
//! - [`Buffer`] - Tiled raster with pixel, row, column and rect access
//! - [`RegionIter`] - Lockstep tile-by-tile iteration over several regions
//! - [`Progress`] - Progress callback and cooperative cancellation
//!
//! ```rust
//! use picman_core::Format;
//! use picman_tiles::{Buffer, Context, CoreConfig, RegionIter};
//!
//! let ctx = Context::new(CoreConfig::default()).unwrap();
//! let buffer = Buffer::new(&ctx, 200, 100, Format::RGBA_U8).unwrap();
//!
//! let mut iter = RegionIter::new();
//! iter.add_read(&buffer, buffer.extent()).unwrap();
//! assert_eq!(iter.for_each(|_| Ok(())).unwrap(), 4 * 2);
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod cache;
pub mod config;
pub mod context;
pub mod iter;
pub mod progress;
pub mod store;

pub use buffer::Buffer;
pub use cache::{Access, CacheEvent, CacheStats, SharedTileCache, TileCache, TileData, TileId};
pub use config::CoreConfig;
pub use context::Context;
pub use iter::{RegionIter, Span, Step};
pub use progress::{AbortHandle, Progress};
pub use store::{MemoryStore, SwapStore, TileStore};
