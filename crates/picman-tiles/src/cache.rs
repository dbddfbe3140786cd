//! LRU tile cache.
//!
//! Keeps a bounded number of tiles resident in memory and moves the rest to
//! each buffer's [`TileStore`]. Tiles are pinned while acquired:
//!
//! - A read acquisition shares the tile data (`Arc<Vec<u8>>`). Any number of
//!   readers may pin the same tile.
//! - A write acquisition checks the tile out. Its bytes move to the caller
//!   and come back on release, which marks the tile dirty. While checked out
//!   the tile cannot be acquired again.
//!
//! Once more tiles are resident than the budget allows, the least recently
//! used unpinned tile is evicted. Dirty tiles are written to their store
//! before their memory is reclaimed. A pinned tile is never evicted; when
//! every resident tile is pinned, acquisition fails with
//! [`Error::CacheExhausted`].
//!
//! The cache is not internally synchronized. Share it through
//! [`SharedTileCache`], which serializes every call behind one mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use picman_core::{Error, Result};
use tracing::{debug, trace};

use crate::store::TileStore;

/// Identifies one tile of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    /// Owning buffer.
    pub buffer: u64,
    /// Tile column.
    pub tx: u32,
    /// Tile row.
    pub ty: u32,
}

impl TileId {
    /// Creates a tile id.
    pub const fn new(buffer: u64, tx: u32, ty: u32) -> Self {
        Self { buffer, tx, ty }
    }
}

/// How a tile is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Shared, read-only.
    Read,
    /// Exclusive; existing pixels outside the written span survive.
    Write,
    /// Exclusive, read and written.
    ReadWrite,
}

impl Access {
    /// Whether the access checks the tile out.
    #[inline]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Tile bytes handed out by [`TileCache::acquire`].
#[derive(Debug)]
pub enum TileData {
    /// Shared view of a read-pinned tile.
    Shared(Arc<Vec<u8>>),
    /// Checked-out bytes of a write-pinned tile.
    Owned(Vec<u8>),
}

impl TileData {
    /// Tile bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Shared(data) => data.as_slice(),
            Self::Owned(data) => data.as_slice(),
        }
    }

    /// Mutable tile bytes, only for checked-out tiles.
    #[inline]
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Shared(_) => None,
            Self::Owned(data) => Some(data.as_mut_slice()),
        }
    }
}

/// Cache activity, delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Tile became resident (from its store or zero-filled).
    Loaded(TileId),
    /// Dirty tile was written back to its store.
    Flushed(TileId),
    /// Tile left memory.
    Evicted {
        /// Evicted tile.
        tile: TileId,
        /// Whether it had to be flushed first.
        dirty: bool,
    },
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Acquisitions served from memory.
    pub hits: u64,
    /// Acquisitions that loaded a tile.
    pub misses: u64,
    /// Tiles evicted.
    pub evictions: u64,
    /// Tiles written back.
    pub flushes: u64,
    /// Tiles currently resident.
    pub resident: usize,
    /// Resident tiles with at least one pin.
    pub pinned: usize,
}

struct Entry {
    /// `None` while checked out.
    data: Option<Arc<Vec<u8>>>,
    pins: u32,
    dirty: bool,
}

struct BufferSlot {
    store: Box<dyn TileStore>,
    tile_bytes: usize,
}

/// Bounded tile cache.
pub struct TileCache {
    entries: HashMap<TileId, Entry>,
    /// Access order for LRU eviction (front = oldest).
    access_order: VecDeque<TileId>,
    buffers: HashMap<u64, BufferSlot>,
    budget: usize,
    stats: CacheStats,
    observers: Vec<Sender<CacheEvent>>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("budget", &self.budget)
            .field("resident", &self.entries.len())
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

impl TileCache {
    /// Creates a cache holding at most `budget` tiles (at least 1).
    pub fn with_budget(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            access_order: VecDeque::new(),
            buffers: HashMap::new(),
            budget: budget.max(1),
            stats: CacheStats::default(),
            observers: Vec::new(),
        }
    }

    /// Tile-count budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Registers a buffer's backing store.
    pub fn register_buffer(&mut self, buffer: u64, tile_bytes: usize, store: Box<dyn TileStore>) {
        debug!(buffer, tile_bytes, store = store.kind(), "buffer registered");
        self.buffers.insert(buffer, BufferSlot { store, tile_bytes });
    }

    /// Whether a buffer is registered.
    pub fn has_buffer(&self, buffer: u64) -> bool {
        self.buffers.contains_key(&buffer)
    }

    /// Receives every subsequent [`CacheEvent`].
    pub fn subscribe(&mut self) -> Receiver<CacheEvent> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: CacheEvent) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.retain(|tx| tx.send(event).is_ok());
    }

    fn touch(&mut self, id: &TileId) {
        if let Some(pos) = self.access_order.iter().position(|k| k == id) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(*id);
    }

    /// Pins a tile and returns its bytes.
    ///
    /// Loads the tile from its store when it is not resident, zero-filling
    /// tiles the store has never seen. Both write modes load existing data,
    /// since a span rarely covers a whole tile.
    pub fn acquire(&mut self, id: TileId, access: Access) -> Result<TileData> {
        if !self.entries.contains_key(&id) {
            self.load(id)?;
            self.stats.misses += 1;
        } else {
            self.stats.hits += 1;
        }
        self.touch(&id);

        let Some(entry) = self.entries.get_mut(&id) else {
            return Err(Error::other(format!("tile {id:?} vanished after load")));
        };
        let Some(data) = entry.data.take() else {
            return Err(Error::TileBusy {
                buffer: id.buffer,
                tx: id.tx,
                ty: id.ty,
            });
        };

        entry.pins += 1;
        trace!(?id, ?access, pins = entry.pins, "tile acquired");
        if access.is_write() {
            // Readers still holding the old Arc keep their copy
            let owned = Arc::try_unwrap(data).unwrap_or_else(|shared| (*shared).clone());
            Ok(TileData::Owned(owned))
        } else {
            entry.data = Some(Arc::clone(&data));
            Ok(TileData::Shared(data))
        }
    }

    /// Unpins a tile. Checked-out bytes are returned and the tile is marked
    /// dirty.
    pub fn release(&mut self, id: TileId, data: TileData) -> Result<()> {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Err(Error::other(format!("release of non-resident tile {id:?}")));
        };
        if entry.pins == 0 {
            return Err(Error::other(format!("release of unpinned tile {id:?}")));
        }
        entry.pins -= 1;
        if let TileData::Owned(bytes) = data {
            entry.data = Some(Arc::new(bytes));
            entry.dirty = true;
        }
        trace!(?id, pins = entry.pins, dirty = entry.dirty, "tile released");
        Ok(())
    }

    fn load(&mut self, id: TileId) -> Result<()> {
        while self.entries.len() >= self.budget {
            self.evict_lru()?;
        }

        let Some(slot) = self.buffers.get_mut(&id.buffer) else {
            return Err(Error::other(format!("tile {id:?} of unregistered buffer")));
        };
        let mut data = vec![0u8; slot.tile_bytes];
        let stored = slot.store.read_tile(id.tx, id.ty, &mut data)?;
        trace!(?id, stored, "tile loaded");

        self.entries.insert(
            id,
            Entry {
                data: Some(Arc::new(data)),
                pins: 0,
                dirty: false,
            },
        );
        self.emit(CacheEvent::Loaded(id));
        Ok(())
    }

    /// Evicts the least recently used unpinned tile.
    pub fn evict_lru(&mut self) -> Result<TileId> {
        let victim = self
            .access_order
            .iter()
            .position(|id| self.entries.get(id).is_some_and(|e| e.pins == 0 && e.data.is_some()));
        let Some(pos) = victim else {
            debug!(budget = self.budget, resident = self.entries.len(), "tile cache exhausted");
            return Err(Error::CacheExhausted {
                budget: self.budget,
            });
        };
        let Some(id) = self.access_order.remove(pos) else {
            return Err(Error::CacheExhausted {
                budget: self.budget,
            });
        };

        let dirty = self.entries.get(&id).is_some_and(|e| e.dirty);
        if dirty {
            self.flush_tile(id)?;
        }
        self.entries.remove(&id);
        self.stats.evictions += 1;
        debug!(?id, dirty, "tile evicted");
        self.emit(CacheEvent::Evicted { tile: id, dirty });
        Ok(id)
    }

    fn flush_tile(&mut self, id: TileId) -> Result<()> {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Ok(());
        };
        let (Some(data), true) = (entry.data.as_ref(), entry.dirty) else {
            return Ok(());
        };
        let Some(slot) = self.buffers.get_mut(&id.buffer) else {
            return Err(Error::other(format!("flush of tile {id:?} of unregistered buffer")));
        };
        slot.store.write_tile(id.tx, id.ty, data)?;
        entry.dirty = false;
        self.stats.flushes += 1;
        trace!(?id, "tile flushed");
        self.emit(CacheEvent::Flushed(id));
        Ok(())
    }

    /// Writes every dirty, unchecked-out tile of `buffer` to its store.
    pub fn flush_buffer(&mut self, buffer: u64) -> Result<usize> {
        let dirty: Vec<TileId> = self
            .entries
            .iter()
            .filter(|(id, e)| id.buffer == buffer && e.dirty && e.data.is_some())
            .map(|(id, _)| *id)
            .collect();
        for id in &dirty {
            self.flush_tile(*id)?;
        }
        if !dirty.is_empty() {
            debug!(buffer, tiles = dirty.len(), "buffer flushed");
        }
        Ok(dirty.len())
    }

    /// Forgets every tile of `buffer` and discards its store.
    pub fn drop_buffer(&mut self, buffer: u64) -> Result<()> {
        self.entries.retain(|id, _| id.buffer != buffer);
        self.access_order.retain(|id| id.buffer != buffer);
        if let Some(mut slot) = self.buffers.remove(&buffer) {
            slot.store.discard()?;
            debug!(buffer, "buffer dropped from tile cache");
        }
        Ok(())
    }

    /// Flushes and evicts every unpinned tile.
    pub fn clear(&mut self) -> Result<()> {
        let ids: Vec<TileId> = self.access_order.iter().copied().collect();
        for id in ids {
            let evictable = self
                .entries
                .get(&id)
                .is_some_and(|e| e.pins == 0 && e.data.is_some());
            if !evictable {
                continue;
            }
            self.flush_tile(id)?;
            self.entries.remove(&id);
            self.access_order.retain(|k| *k != id);
        }
        Ok(())
    }

    /// Whether a tile is resident.
    pub fn is_resident(&self, id: &TileId) -> bool {
        self.entries.contains_key(id)
    }

    /// Pin count of a resident tile.
    pub fn pins(&self, id: &TileId) -> u32 {
        self.entries.get(id).map_or(0, |e| e.pins)
    }

    /// Whether a resident tile has unflushed changes.
    pub fn is_dirty(&self, id: &TileId) -> bool {
        self.entries.get(id).is_some_and(|e| e.dirty)
    }

    /// Tiles stored for `buffer` outside of memory.
    pub fn stored_tiles(&self, buffer: u64) -> usize {
        self.buffers.get(&buffer).map_or(0, |s| s.store.stored_tiles())
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.entries.len(),
            pinned: self.entries.values().filter(|e| e.pins > 0).count(),
            ..self.stats
        }
    }
}

/// A [`TileCache`] shared between buffers and iterators.
#[derive(Debug, Clone)]
pub struct SharedTileCache(Arc<Mutex<TileCache>>);

impl SharedTileCache {
    /// Wraps a cache.
    pub fn new(cache: TileCache) -> Self {
        Self(Arc::new(Mutex::new(cache)))
    }

    /// Locks the cache.
    pub fn lock(&self) -> Result<MutexGuard<'_, TileCache>> {
        self.0
            .lock()
            .map_err(|_| Error::other("tile cache lock poisoned"))
    }

    /// Acquires a tile under the lock.
    pub fn acquire(&self, id: TileId, access: Access) -> Result<TileData> {
        self.lock()?.acquire(id, access)
    }

    /// Releases a tile under the lock.
    pub fn release(&self, id: TileId, data: TileData) -> Result<()> {
        self.lock()?.release(id, data)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> Result<CacheStats> {
        Ok(self.lock()?.stats())
    }

    /// Subscribes to cache events.
    pub fn subscribe(&self) -> Result<Receiver<CacheEvent>> {
        Ok(self.lock()?.subscribe())
    }

    /// Whether both handles point at the same cache.
    pub fn same_as(&self, other: &SharedTileCache) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
