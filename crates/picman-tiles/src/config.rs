//! Tile and cache configuration.
//!
//! [`CoreConfig`] carries the memory knobs of the pixel core: tile edge
//! length, tile cache budget, swap directory and worker count. Values come
//! from defaults, an optional YAML file and environment overrides, applied
//! in that order.
//!
//! # Environment Variables
//!
//! - `PICMAN_TILE_SIZE` - Tile edge length in pixels (16..=1024)
//! - `PICMAN_TILE_CACHE_SIZE` - Tile cache budget in bytes
//! - `PICMAN_TILE_CACHE_MB` - Tile cache budget in megabytes
//! - `PICMAN_SWAP_PATH` - Directory for swap-backed tile stores
//! - `PICMAN_NUM_PROCESSORS` - Threads of the context's worker pool
//!
//! Invalid values are ignored with a warning.
//!
//! # YAML
//!
//! ```yaml
//! tile_size: 128
//! tile_cache_size: 67108864
//! swap_path: /var/tmp/picman
//! num_processors: 4
//! ```

use std::env;
use std::path::{Path, PathBuf};

use picman_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default tile edge length.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Smallest accepted tile edge length.
pub const MIN_TILE_SIZE: u32 = 16;

/// Largest accepted tile edge length.
pub const MAX_TILE_SIZE: u32 = 1024;

/// Default tile cache budget: 256 MiB.
pub const DEFAULT_TILE_CACHE_SIZE: u64 = 256 * 1024 * 1024;

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Tile cache budget in bytes.
    pub tile_cache_size: u64,
    /// Explicit tile-count budget, overriding the byte budget.
    pub cache_tiles: Option<usize>,
    /// Directory for swap files. `None` keeps tiles in memory.
    pub swap_path: Option<PathBuf>,
    /// Threads of the worker pool each `Context` owns. Row-parallel
    /// blending runs on that pool, not on rayon's global one.
    pub num_processors: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_cache_size: DEFAULT_TILE_CACHE_SIZE,
            cache_tiles: None,
            swap_path: None,
            num_processors: 1,
        }
    }
}

impl CoreConfig {
    /// Parses a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(Error::Config(format!(
                "tile_size {} outside {}..={}",
                self.tile_size, MIN_TILE_SIZE, MAX_TILE_SIZE
            )));
        }
        if self.num_processors == 0 {
            return Err(Error::Config("num_processors must be at least 1".into()));
        }
        if self.cache_tiles == Some(0) {
            return Err(Error::Config("cache_tiles must be at least 1".into()));
        }
        Ok(())
    }

    /// Applies `PICMAN_*` environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Some(size) = env_parse::<u32>("PICMAN_TILE_SIZE") {
            if (MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&size) {
                self.tile_size = size;
            } else {
                warn!(size, "PICMAN_TILE_SIZE out of range, ignored");
            }
        }
        if let Some(bytes) = env_parse::<u64>("PICMAN_TILE_CACHE_SIZE") {
            self.tile_cache_size = bytes;
        }
        // MB takes precedence over bytes
        if let Some(mb) = env_parse::<u64>("PICMAN_TILE_CACHE_MB") {
            self.tile_cache_size = mb * 1024 * 1024;
        }
        if let Ok(path) = env::var("PICMAN_SWAP_PATH") {
            if path.is_empty() {
                self.swap_path = None;
            } else {
                self.swap_path = Some(PathBuf::from(path));
            }
        }
        if let Some(n) = env_parse::<usize>("PICMAN_NUM_PROCESSORS") {
            if n > 0 {
                self.num_processors = n;
            } else {
                warn!("PICMAN_NUM_PROCESSORS must be at least 1, ignored");
            }
        }
        self
    }

    /// Bytes of one full tile at `bytes_per_pixel`.
    #[inline]
    pub fn tile_bytes(&self, bytes_per_pixel: usize) -> u64 {
        self.tile_size as u64 * self.tile_size as u64 * bytes_per_pixel as u64
    }

    /// Tile-count budget of the cache.
    ///
    /// The byte budget is divided by the size of an RGBA float tile, the
    /// widest canonical pixel, unless `cache_tiles` is set. Never below 1.
    pub fn cache_tiles(&self) -> usize {
        if let Some(n) = self.cache_tiles {
            return n.max(1);
        }
        let per_tile = self.tile_bytes(16).max(1);
        ((self.tile_cache_size / per_tile) as usize).max(1)
    }

    /// Sets the worker pool size.
    pub fn with_num_processors(mut self, threads: usize) -> Self {
        self.num_processors = threads;
        self
    }

    /// Sets an explicit tile-count budget.
    pub fn with_cache_tiles(mut self, tiles: usize) -> Self {
        self.cache_tiles = Some(tiles.max(1));
        self
    }

    /// Sets the tile edge length.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Sets the swap directory.
    pub fn with_swap_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.swap_path = Some(path.into());
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "invalid environment override ignored");
            None
        }
    }
}
