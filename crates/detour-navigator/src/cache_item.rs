//! Per-tile cache entries and the lock that guards them

use std::collections::BTreeSet;
use std::sync::Arc;

use navmesh_common::Result;
use navmesh_recast::NavMeshTileData;
use parking_lot::RwLock;

use crate::navigator::AgentId;

/// A built tile in decoded and encoded form
///
/// Both halves are immutable and shared, so readers can keep a payload alive
/// after releasing the item lock.
#[derive(Debug, Clone)]
pub struct TilePayload {
    pub data: Arc<NavMeshTileData>,
    pub bytes: Arc<[u8]>,
}

impl TilePayload {
    pub fn new(data: NavMeshTileData) -> Result<Self> {
        let bytes = data.to_bytes()?;
        Ok(Self {
            data: Arc::new(data),
            bytes: bytes.into(),
        })
    }

    /// Decodes a payload from its tile bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let data = NavMeshTileData::from_bytes(&bytes)?;
        Ok(Self {
            data: Arc::new(data),
            bytes: bytes.into(),
        })
    }
}

/// Result of offering a build result to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The payload replaced the previous one
    Applied { version: u64 },
    /// A newer job already published; the payload was dropped
    Stale { built_job: u64 },
}

/// Navmesh of one tile for one agent bucket
///
/// Items are updated in place and never replaced, so a handle obtained from
/// the cache stays valid across rebuilds.
#[derive(Debug, Default)]
pub struct NavMeshCacheItem {
    payload: Option<TilePayload>,
    version: u64,
    built_job: u64,
    requested_revision: u64,
    built_revision: u64,
    used_by: BTreeSet<AgentId>,
}

/// Shared handle to a cache item
pub type GuardedNavMeshCacheItem = Arc<RwLock<NavMeshCacheItem>>;

impl NavMeshCacheItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guarded() -> GuardedNavMeshCacheItem {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn payload(&self) -> Option<&TilePayload> {
        self.payload.as_ref()
    }

    pub fn tile(&self) -> Option<&NavMeshTileData> {
        self.payload.as_ref().map(|p| p.data.as_ref())
    }

    /// Encoded tile, empty until the first build
    pub fn bytes(&self) -> &[u8] {
        self.payload.as_ref().map_or(&[][..], |p| &p.bytes[..])
    }

    pub fn is_built(&self) -> bool {
        self.payload.is_some()
    }

    /// Number of published builds; 0 means never built
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Id of the job whose output is published
    pub fn built_job(&self) -> u64 {
        self.built_job
    }

    /// Geometry revision of the latest job scheduled for this tile
    pub fn requested_revision(&self) -> u64 {
        self.requested_revision
    }

    /// Geometry revision of the published payload
    pub fn built_revision(&self) -> u64 {
        self.built_revision
    }

    pub fn used_by(&self) -> &BTreeSet<AgentId> {
        &self.used_by
    }

    pub fn is_used(&self) -> bool {
        !self.used_by.is_empty()
    }

    /// Adds or removes an agent, returning the number of users left
    pub(crate) fn set_used_by(&mut self, agent: AgentId, used: bool) -> usize {
        if used {
            self.used_by.insert(agent);
        } else {
            self.used_by.remove(&agent);
        }
        self.used_by.len()
    }

    pub(crate) fn mark_requested(&mut self, revision: u64) {
        self.requested_revision = self.requested_revision.max(revision);
    }

    /// Forgets a request whose job was dropped before running
    pub(crate) fn cancel_request(&mut self) {
        self.requested_revision = self.built_revision;
    }

    /// Publishes the output of job `job_id`
    ///
    /// Jobs are numbered in creation order, so an older job finishing after
    /// a newer one is discarded instead of rolling the tile back.
    pub fn publish(&mut self, job_id: u64, revision: u64, payload: TilePayload) -> PublishOutcome {
        if job_id <= self.built_job {
            return PublishOutcome::Stale {
                built_job: self.built_job,
            };
        }
        self.payload = Some(payload);
        self.built_job = job_id;
        self.built_revision = revision;
        self.version += 1;
        PublishOutcome::Applied {
            version: self.version,
        }
    }

    /// Installs a payload loaded from disk into a never-built item
    pub(crate) fn restore(&mut self, payload: TilePayload, version: u64) -> bool {
        if self.is_built() {
            return false;
        }
        self.payload = Some(payload);
        self.version = version;
        true
    }
}
