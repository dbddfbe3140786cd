//! Application context.
//!
//! A [`Context`] owns what would otherwise be process-wide state: the
//! format registry, the shared tile cache, the configuration, buffer id
//! allocation and the worker pool. Buffers created against the same context
//! share its cache. Contexts are cheap to clone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use picman_core::{Error, FormatRegistry, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::cache::{SharedTileCache, TileCache};
use crate::config::CoreConfig;
use crate::store::{MemoryStore, SwapStore, TileStore};

#[derive(Debug)]
struct Inner {
    config: CoreConfig,
    registry: FormatRegistry,
    cache: SharedTileCache,
    next_id: AtomicU64,
    pool: OnceLock<ThreadPool>,
}

/// Shared state of one editing session.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::from_valid(CoreConfig::default())
    }
}

impl Context {
    /// Creates a context after validating `config`.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: CoreConfig) -> Self {
        let budget = config.cache_tiles();
        debug!(
            tile_size = config.tile_size,
            cache_tiles = budget,
            swap = config.swap_path.is_some(),
            "context created"
        );
        Self {
            inner: Arc::new(Inner {
                registry: FormatRegistry::new(),
                cache: SharedTileCache::new(TileCache::with_budget(budget)),
                next_id: AtomicU64::new(1),
                pool: OnceLock::new(),
                config,
            }),
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Format registry.
    pub fn registry(&self) -> &FormatRegistry {
        &self.inner.registry
    }

    /// Shared tile cache.
    pub fn cache(&self) -> &SharedTileCache {
        &self.inner.cache
    }

    /// Tile edge length for new buffers.
    pub fn tile_size(&self) -> u32 {
        self.inner.config.tile_size
    }

    /// Allocates a fresh buffer id.
    pub fn next_buffer_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates the backing store for a new buffer.
    pub fn create_store(&self, tile_bytes: usize) -> Result<Box<dyn TileStore>> {
        match &self.inner.config.swap_path {
            Some(dir) => Ok(Box::new(SwapStore::new(dir, tile_bytes)?)),
            None => Ok(Box::new(MemoryStore::new())),
        }
    }

    /// Worker pool with `num_processors` threads, built on first use.
    pub fn pool(&self) -> Result<&ThreadPool> {
        if let Some(pool) = self.inner.pool.get() {
            return Ok(pool);
        }
        let threads = self.inner.config.num_processors;
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("picman-worker-{i}"))
            .build()
            .map_err(|e| Error::other(format!("failed to build worker pool: {e}")))?;
        debug!(threads, "worker pool created");
        Ok(self.inner.pool.get_or_init(|| pool))
    }

    /// Whether both handles refer to the same session.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique() {
        let ctx = Context::default();
        let a = ctx.next_buffer_id();
        let b = ctx.clone().next_buffer_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CoreConfig::default().with_tile_size(5);
        assert!(Context::new(config).is_err());
    }

    #[test]
    fn test_budget_from_config() {
        let ctx = Context::new(CoreConfig::default().with_cache_tiles(3)).unwrap();
        assert_eq!(ctx.cache().lock().unwrap().budget(), 3);
    }

    #[test]
    fn test_pool_sized_from_config() {
        let ctx = Context::new(CoreConfig::default().with_num_processors(3)).unwrap();
        let pool = ctx.pool().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
        assert!(std::ptr::eq(pool, ctx.clone().pool().unwrap()));
        assert_eq!(Context::default().pool().unwrap().current_num_threads(), 1);
    }
}
