use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use navmesh_common::{AgentBounds, TileId};
use navmesh_recast::InputGeometry;

use crate::cache_item::GuardedNavMeshCacheItem;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a build job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Waiting in the queue
    Queued,
    /// Picked by a worker
    InProgress,
    /// Built and published
    Done,
    /// Replaced in the queue by a newer job for the same tile
    Superseded,
    /// Build failed; the tile keeps its previous contents
    Failed,
    /// Built, but a newer job had already published
    Stale,
    /// Dropped from the queue before running
    Cancelled,
}

/// Request to build one tile for one agent bucket
///
/// The job owns its geometry snapshot and a handle to the item it
/// publishes into.
pub struct BuildJob {
    /// Unique id, increasing in creation order
    pub id: u64,
    pub tile: TileId,
    pub agent: AgentBounds,
    pub geometry: InputGeometry,
    /// Lower values are built first
    pub priority: u32,
    /// Geometry revision the snapshot was taken at
    pub revision: u64,
    pub item: GuardedNavMeshCacheItem,
}

impl BuildJob {
    pub fn new(
        tile: TileId,
        agent: AgentBounds,
        geometry: InputGeometry,
        priority: u32,
        revision: u64,
        item: GuardedNavMeshCacheItem,
    ) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            tile,
            agent,
            geometry,
            priority,
            revision,
            item,
        }
    }
}

impl fmt::Debug for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildJob")
            .field("id", &self.id)
            .field("tile", &self.tile)
            .field("agent", &self.agent)
            .field("triangles", &self.geometry.triangle_count())
            .field("priority", &self.priority)
            .field("revision", &self.revision)
            .finish()
    }
}
