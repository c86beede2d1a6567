//! Tile cache keyed by tile and agent bucket
//!
//! The map lock is held only to look up, insert or evict entries. Tile
//! contents are guarded by each item's own lock, so a slow build never
//! blocks access to other tiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use navmesh_common::TileId;
use parking_lot::Mutex;

use crate::cache_item::{GuardedNavMeshCacheItem, NavMeshCacheItem};
use crate::navigator::AgentId;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently cached
    pub size: usize,
    /// Lookups through `get` and `get_or_create`
    pub get: u64,
    /// Lookups that found an existing entry
    pub hit: u64,
    /// Entries evicted
    pub expired: u64,
}

#[derive(Debug)]
struct CacheEntry {
    item: GuardedNavMeshCacheItem,
    last_access: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<TileId, CacheEntry>,
    clock: u64,
}

impl CacheState {
    fn touch(&mut self, id: &TileId) -> Option<GuardedNavMeshCacheItem> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(id).map(|entry| {
            entry.last_access = clock;
            entry.item.clone()
        })
    }
}

/// Owner of every cached tile
///
/// The tile budget is soft: entries that are used by an agent, referenced by
/// a queued job or locked by a worker are never evicted, even when that
/// leaves the cache over budget.
#[derive(Debug)]
pub struct NavMeshCache {
    max_tiles: usize,
    state: Mutex<CacheState>,
    get: AtomicU64,
    hit: AtomicU64,
    expired: AtomicU64,
}

impl NavMeshCache {
    /// Creates a cache holding up to `max_tiles` tiles; 0 means unlimited
    pub fn new(max_tiles: usize) -> Self {
        Self {
            max_tiles,
            state: Mutex::new(CacheState::default()),
            get: AtomicU64::new(0),
            hit: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    /// Returns the entry for `id` without creating it
    pub fn get(&self, id: &TileId) -> Option<GuardedNavMeshCacheItem> {
        self.get.fetch_add(1, Ordering::Relaxed);
        let item = self.state.lock().touch(id)?;
        self.hit.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Returns the entry for `id`, inserting an empty one when absent
    ///
    /// Concurrent callers for the same key receive the same item.
    pub fn get_or_create(&self, id: &TileId) -> GuardedNavMeshCacheItem {
        self.get.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if let Some(item) = state.touch(id) {
            self.hit.fetch_add(1, Ordering::Relaxed);
            return item;
        }

        if self.max_tiles > 0 {
            self.evict_unused(&mut state, self.max_tiles - 1);
        }
        let item = NavMeshCacheItem::guarded();
        let last_access = state.clock;
        state.entries.insert(
            *id,
            CacheEntry {
                item: item.clone(),
                last_access,
            },
        );
        item
    }

    /// Marks `id` as used or no longer used by `agent`
    ///
    /// Marking an absent entry as used creates it. Returns the number of
    /// agents still using the entry. An entry whose set becomes empty stays
    /// cached until budget pressure evicts it.
    pub fn set_used_by(&self, id: &TileId, agent: AgentId, used: bool) -> usize {
        let item = if used {
            Some(self.get_or_create(id))
        } else {
            self.state.lock().entries.get(id).map(|e| e.item.clone())
        };
        item.map_or(0, |item| item.write().set_used_by(agent, used))
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    /// True when `id` is cached and some agent uses it
    pub fn is_used(&self, id: &TileId) -> bool {
        let item = self.state.lock().entries.get(id).map(|e| e.item.clone());
        item.is_some_and(|item| item.read().is_used())
    }

    /// Removes an entry regardless of its users
    pub fn remove(&self, id: &TileId) -> Option<GuardedNavMeshCacheItem> {
        self.state.lock().entries.remove(id).map(|e| e.item)
    }

    /// Evicts unused entries until the cache fits its budget
    pub fn trim(&self) -> usize {
        if self.max_tiles == 0 {
            return 0;
        }
        let mut state = self.state.lock();
        self.evict_unused(&mut state, self.max_tiles)
    }

    /// Snapshot of every entry, ordered by key
    pub fn entries(&self) -> Vec<(TileId, GuardedNavMeshCacheItem)> {
        let mut entries: Vec<_> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|(id, e)| (*id, e.item.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn report_stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            get: self.get.load(Ordering::Relaxed),
            hit: self.hit.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    /// Evicts least recently used evictable entries until at most `target`
    /// remain, returning the number evicted
    fn evict_unused(&self, state: &mut CacheState, target: usize) -> usize {
        let excess = state.entries.len().saturating_sub(target);
        if excess == 0 {
            return 0;
        }

        let mut candidates: Vec<(u64, TileId)> = state
            .entries
            .iter()
            .filter(|(_, entry)| is_evictable(&entry.item))
            .map(|(id, entry)| (entry.last_access, *id))
            .collect();
        candidates.sort_unstable();

        let mut evicted = 0;
        for (_, id) in candidates.into_iter().take(excess) {
            state.entries.remove(&id);
            log::debug!("Evicted navmesh tile {}", id);
            evicted += 1;
        }
        if evicted < excess {
            log::debug!(
                "Navmesh cache over budget: {} tiles, limit {}",
                state.entries.len(),
                self.max_tiles
            );
        }
        self.expired.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }
}

fn is_evictable(item: &GuardedNavMeshCacheItem) -> bool {
    if Arc::strong_count(item) > 1 {
        return false;
    }
    item.try_read().is_some_and(|item| !item.is_used())
}
