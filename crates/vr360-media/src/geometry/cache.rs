//! Shared cache of computed remap grids.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use tracing::debug;
use vr360_models::{ProjectionType, Resolution, ViewportConfig};

use super::grid::RemapGrid;
use super::{build_stereographic_map, build_viewport_map};
use crate::error::MediaResult;
use crate::metrics;

/// Default number of grids kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Identity of a grid: source size, projection pair and exact parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GridKey {
    Viewport {
        source: Resolution,
        projection: ProjectionType,
        // f64 bit patterns so the key is hashable and exact
        yaw: u64,
        pitch: u64,
        roll: u64,
        fov: u64,
        output: Resolution,
    },
    Stereographic {
        source: Resolution,
        output: Resolution,
    },
}

impl GridKey {
    pub fn viewport(projection: ProjectionType, viewport: &ViewportConfig, source: Resolution) -> Self {
        GridKey::Viewport {
            source,
            projection,
            yaw: viewport.yaw.to_bits(),
            pitch: viewport.pitch.to_bits(),
            roll: viewport.roll.to_bits(),
            fov: viewport.fov.to_bits(),
            output: Resolution::new(viewport.output_width, viewport.output_height),
        }
    }

    pub fn stereographic(source: Resolution, output: Resolution) -> Self {
        GridKey::Stereographic { source, output }
    }
}

#[derive(Default)]
struct CacheState {
    grids: HashMap<GridKey, Arc<RemapGrid>>,
    order: VecDeque<GridKey>,
}

/// Thread-safe grid cache.
///
/// Lookups take a shared read lock, so concurrent readers never block each
/// other. Misses compute outside the lock; when two threads race on the same
/// key the first insert wins and both get the same grid. Oldest entries are
/// evicted first once `capacity` is reached.
#[derive(Clone)]
pub struct RemapCache {
    state: Arc<RwLock<CacheState>>,
    capacity: usize,
}

impl Default for RemapCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl RemapCache {
    /// Create a cache holding at most `capacity` grids. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            capacity,
        }
    }

    /// Number of cached grids.
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|e| e.into_inner()).grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &GridKey) -> Option<Arc<RemapGrid>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .grids
            .get(key)
            .cloned()
    }

    /// Return the cached grid for `key`, building it with `build` on a miss.
    pub fn get_or_build<F>(&self, key: GridKey, build: F) -> MediaResult<Arc<RemapGrid>>
    where
        F: FnOnce() -> MediaResult<RemapGrid>,
    {
        if let Some(grid) = self.get(&key) {
            metrics::record_cache_hit();
            return Ok(grid);
        }
        metrics::record_cache_miss();

        let grid = Arc::new(build()?);
        if self.capacity == 0 {
            return Ok(grid);
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = state.grids.get(&key) {
            return Ok(existing.clone());
        }

        while state.grids.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.grids.remove(&oldest);
                }
                None => break,
            }
        }

        debug!(key = ?key, "Caching remap grid");
        state.order.push_back(key.clone());
        state.grids.insert(key, grid.clone());
        Ok(grid)
    }

    /// Viewport grid, computed once per distinct parameter set.
    pub fn viewport_grid(
        &self,
        projection: ProjectionType,
        viewport: &ViewportConfig,
        source: Resolution,
    ) -> MediaResult<Arc<RemapGrid>> {
        viewport.validate()?;
        let key = GridKey::viewport(projection, viewport, source);
        self.get_or_build(key, || build_viewport_map(projection, viewport, source))
    }

    /// Little planet grid, computed once per size pair.
    pub fn stereographic_grid(&self, source: Resolution, output: Resolution) -> MediaResult<Arc<RemapGrid>> {
        let key = GridKey::stereographic(source, output);
        self.get_or_build(key, || build_stereographic_map(source, output))
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.grids.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SOURCE: Resolution = Resolution {
        width: 64,
        height: 32,
    };

    #[test]
    fn test_second_lookup_reuses_grid() {
        let cache = RemapCache::new(4);
        let vp = ViewportConfig::looking_at(10.0, 5.0, 90.0, 16, 16);

        let first = cache.viewport_grid(ProjectionType::Equirectangular, &vp, SOURCE).unwrap();
        let second = cache.viewport_grid(ProjectionType::Equirectangular, &vp, SOURCE).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_parameters_get_distinct_entries() {
        let cache = RemapCache::new(4);
        let a = ViewportConfig::looking_at(0.0, 0.0, 90.0, 16, 16);
        let b = ViewportConfig { fov: 60.0, ..a };

        cache.viewport_grid(ProjectionType::Equirectangular, &a, SOURCE).unwrap();
        cache.viewport_grid(ProjectionType::Equirectangular, &b, SOURCE).unwrap();
        cache.stereographic_grid(SOURCE, Resolution::new(16, 16)).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let cache = RemapCache::new(2);
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            build_stereographic_map(SOURCE, Resolution::new(4, 4))
        };

        let k1 = GridKey::stereographic(SOURCE, Resolution::new(1, 1));
        let k2 = GridKey::stereographic(SOURCE, Resolution::new(2, 2));
        let k3 = GridKey::stereographic(SOURCE, Resolution::new(3, 3));

        cache.get_or_build(k1.clone(), build).unwrap();
        cache.get_or_build(k2.clone(), build).unwrap();
        cache.get_or_build(k3.clone(), build).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k3).is_some());
        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_viewport_is_not_cached() {
        let cache = RemapCache::new(4);
        let vp = ViewportConfig::looking_at(0.0, 0.0, 200.0, 16, 16);
        assert!(cache.viewport_grid(ProjectionType::Equirectangular, &vp, SOURCE).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = RemapCache::new(0);
        cache.stereographic_grid(SOURCE, Resolution::new(8, 8)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_share_one_grid() {
        let cache = RemapCache::new(4);
        let vp = ViewportConfig::looking_at(0.0, 0.0, 90.0, 16, 16);
        cache.viewport_grid(ProjectionType::Equirectangular, &vp, SOURCE).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.viewport_grid(ProjectionType::Equirectangular, &vp, SOURCE).unwrap())
            })
            .collect();
        let grids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(grids.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }
}
