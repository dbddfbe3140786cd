//! Backing stores for tile data.
//!
//! The tile cache keeps a bounded working set in memory; everything else
//! lives in a [`TileStore`]. Two stores are provided:
//!
//! - [`MemoryStore`] - tiles in a hash map, the default
//! - [`SwapStore`] - tiles in an anonymous temporary file under the
//!   configured swap directory, one fixed-size slot per tile
//!
//! A store that has never seen a tile reports it as absent; the cache then
//! zero-fills it.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use picman_core::{Error, Result};
use tracing::debug;

/// Persistent home of tiles that are not resident in the cache.
pub trait TileStore: Send + fmt::Debug {
    /// Reads tile (tx, ty) into `out`. Returns `false` if the store holds no
    /// data for it, leaving `out` untouched.
    fn read_tile(&mut self, tx: u32, ty: u32, out: &mut [u8]) -> Result<bool>;

    /// Writes tile (tx, ty).
    fn write_tile(&mut self, tx: u32, ty: u32, data: &[u8]) -> Result<()>;

    /// Drops every stored tile.
    fn discard(&mut self) -> Result<()>;

    /// Number of tiles holding data.
    fn stored_tiles(&self) -> usize;

    /// Short store kind, for logging.
    fn kind(&self) -> &'static str;
}

/// Tiles kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tiles: HashMap<(u32, u32), Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileStore for MemoryStore {
    fn read_tile(&mut self, tx: u32, ty: u32, out: &mut [u8]) -> Result<bool> {
        match self.tiles.get(&(tx, ty)) {
            Some(data) => {
                out.copy_from_slice(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn write_tile(&mut self, tx: u32, ty: u32, data: &[u8]) -> Result<()> {
        match self.tiles.get_mut(&(tx, ty)) {
            Some(slot) => slot.copy_from_slice(data),
            None => {
                self.tiles.insert((tx, ty), data.to_vec());
            }
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.tiles.clear();
        Ok(())
    }

    fn stored_tiles(&self) -> usize {
        self.tiles.len()
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Tiles kept in a swap file.
///
/// The file is created with [`tempfile::tempfile_in`], so it is unlinked from
/// the directory immediately and disappears when the store is dropped.
pub struct SwapStore {
    file: File,
    tile_bytes: usize,
    slots: HashMap<(u32, u32), u64>,
    next_slot: u64,
}

impl fmt::Debug for SwapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapStore")
            .field("tile_bytes", &self.tile_bytes)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl SwapStore {
    /// Creates a swap file in `dir` for tiles of `tile_bytes` bytes.
    pub fn new(dir: impl AsRef<Path>, tile_bytes: usize) -> Result<Self> {
        let dir = dir.as_ref();
        if tile_bytes == 0 {
            return Err(Error::other("swap store needs a non-zero tile size"));
        }
        std::fs::create_dir_all(dir)?;
        let file = tempfile::tempfile_in(dir)?;
        debug!(dir = %dir.display(), tile_bytes, "swap store created");
        Ok(Self {
            file,
            tile_bytes,
            slots: HashMap::new(),
            next_slot: 0,
        })
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.tile_bytes {
            return Err(Error::other(format!(
                "swap tile of {} bytes, store expects {}",
                len, self.tile_bytes
            )));
        }
        Ok(())
    }
}

impl TileStore for SwapStore {
    fn read_tile(&mut self, tx: u32, ty: u32, out: &mut [u8]) -> Result<bool> {
        self.check_len(out.len())?;
        let Some(&slot) = self.slots.get(&(tx, ty)) else {
            return Ok(false);
        };
        self.file
            .seek(SeekFrom::Start(slot * self.tile_bytes as u64))?;
        self.file.read_exact(out)?;
        Ok(true)
    }

    fn write_tile(&mut self, tx: u32, ty: u32, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        let slot = match self.slots.get(&(tx, ty)) {
            Some(&slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                self.slots.insert((tx, ty), slot);
                slot
            }
        };
        self.file
            .seek(SeekFrom::Start(slot * self.tile_bytes as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.slots.clear();
        self.next_slot = 0;
        self.file.set_len(0)?;
        Ok(())
    }

    fn stored_tiles(&self) -> usize {
        self.slots.len()
    }

    fn kind(&self) -> &'static str {
        "swap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn TileStore) {
        let mut out = vec![7u8; 16];
        assert!(!store.read_tile(0, 0, &mut out).unwrap());
        assert_eq!(out, vec![7u8; 16]);

        store.write_tile(1, 2, &[3u8; 16]).unwrap();
        store.write_tile(0, 0, &[9u8; 16]).unwrap();
        store.write_tile(1, 2, &[4u8; 16]).unwrap();
        assert_eq!(store.stored_tiles(), 2);

        assert!(store.read_tile(1, 2, &mut out).unwrap());
        assert_eq!(out, vec![4u8; 16]);
        assert!(store.read_tile(0, 0, &mut out).unwrap());
        assert_eq!(out, vec![9u8; 16]);

        store.discard().unwrap();
        assert_eq!(store.stored_tiles(), 0);
        assert!(!store.read_tile(1, 2, &mut out).unwrap());
    }

    #[test]
    fn test_memory_store() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn test_swap_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SwapStore::new(dir.path(), 16).unwrap();
        exercise(&mut store);
    }

    #[test]
    fn test_swap_store_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SwapStore::new(dir.path(), 16).unwrap();
        assert!(store.write_tile(0, 0, &[0u8; 8]).is_err());
    }
}
