//! Two tier tile cache.

use crate::{MemStore, TerrainError, TileStore};
use log::{debug, warn};
use moka::sync::Cache;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Condvar, Mutex, PoisonError,
};
use terrain_rgb::{ElevationGrid, TileKey};

/// Decoded grids in memory, backed by a persistent [`TileStore`].
///
/// Reads check memory first, then the store; a persistent hit is
/// promoted into memory. Inserts land in memory immediately and are
/// written to the store on a background thread, so a read following an
/// insert never depends on the write having completed.
pub struct TileCache {
    memory: Cache<TileKey, Arc<ElevationGrid>>,
    store: Arc<dyn TileStore>,
    writes: Arc<PendingWrites>,
    counters: Arc<Counters>,
}

/// Hit and miss counters for a [`TileCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub write_failures: u64,
}

impl TileCache {
    /// Returns a cache holding at most `memory_bytes` of decoded
    /// samples in memory.
    pub fn new(store: Arc<dyn TileStore>, memory_bytes: u64) -> Self {
        let memory = Cache::builder()
            .weigher(|_key: &TileKey, grid: &Arc<ElevationGrid>| -> u32 {
                u32::try_from(grid.size_in_bytes()).unwrap_or(u32::MAX)
            })
            .max_capacity(memory_bytes)
            .build();
        Self {
            memory,
            store,
            writes: Arc::default(),
            counters: Arc::default(),
        }
    }

    /// Returns a cache whose persistent tier is a [`MemStore`].
    pub fn in_memory(memory_bytes: u64) -> Self {
        Self::new(Arc::new(MemStore::new()), memory_bytes)
    }

    /// Returns the grid for `key` from either tier.
    ///
    /// A persisted entry that fails to parse is removed and reported as
    /// a miss.
    pub fn get(&self, key: TileKey) -> Option<Arc<ElevationGrid>> {
        if let Some(grid) = self.memory.get(&key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(grid);
        }
        match self.load_persisted(key) {
            Some(grid) => {
                self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(key, grid.clone());
                Some(grid)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `grid` under `key`.
    ///
    /// The memory tier is updated before returning. The persistent
    /// write happens in the background; see [`TileCache::flush`].
    pub fn insert(&self, key: TileKey, grid: Arc<ElevationGrid>) {
        self.memory.insert(key, grid.clone());
        self.writes.begin();
        let store = self.store.clone();
        let writes = self.writes.clone();
        let counters = self.counters.clone();
        rayon::spawn(move || {
            if let Err(e) = store.put(key, &grid.to_bytes()) {
                counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("persisting tile {key}: {e}");
            }
            writes.end();
        });
    }

    /// Returns `true` if either tier holds `key`.
    pub fn has_tile(&self, key: TileKey) -> bool {
        self.memory.contains_key(&key) || self.store.exists(key)
    }

    /// Blocks until every background write started so far has
    /// finished.
    pub fn flush(&self) {
        self.writes.wait();
    }

    /// Drops both tiers, leaving an empty persistent store.
    pub fn clear(&self) -> Result<(), TerrainError> {
        self.flush();
        self.memory.invalidate_all();
        self.store.clear()?;
        debug!("cleared tile cache");
        Ok(())
    }

    /// Returns the bytes used by the persistent tier.
    pub fn total_cached_bytes(&self) -> u64 {
        self.store.total_bytes()
    }

    /// Returns the weighted size of the memory tier in bytes.
    pub fn memory_bytes(&self) -> u64 {
        self.memory.run_pending_tasks();
        self.memory.weighted_size()
    }

    pub fn stats(&self) -> CacheStats {
        let Counters {
            memory_hits,
            persistent_hits,
            misses,
            write_failures,
        } = &*self.counters;
        CacheStats {
            memory_hits: memory_hits.load(Ordering::Relaxed),
            persistent_hits: persistent_hits.load(Ordering::Relaxed),
            misses: misses.load(Ordering::Relaxed),
            write_failures: write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Private API.
impl TileCache {
    fn load_persisted(&self, key: TileKey) -> Option<Arc<ElevationGrid>> {
        let bytes = match self.store.get(key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("reading persisted tile {key}: {e}");
                return None;
            }
        };
        match ElevationGrid::from_bytes(&bytes) {
            Ok(grid) => {
                debug!("promoting persisted tile {key}");
                Some(Arc::new(grid))
            }
            Err(e) => {
                warn!("discarding corrupt persisted tile {key}: {e}");
                let _ = self.store.delete(key);
                None
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
}

/// Count of background writes in flight.
#[derive(Default)]
struct PendingWrites {
    count: Mutex<usize>,
    settled: Condvar,
}

impl PendingWrites {
    fn begin(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.settled.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .settled
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
