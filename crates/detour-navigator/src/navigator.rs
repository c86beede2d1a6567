//! Orchestrator translating world events into tile builds
//!
//! The navigator runs on the simulation thread. It tracks which tiles each
//! agent needs, remembers a geometry revision per tile, and turns geometry
//! changes and agent movement into [`BuildJob`]s for the background
//! [`AsyncTileUpdater`]. Readers go through [`Navigator::query`] or the
//! shared [`NavMeshCache`] and never wait for a build.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use glam::{Vec2, Vec3};
use navmesh_common::{
    AgentBounds, AgentBucket, AgentBucketTable, Bounds, CellGridBounds, Error, Result, TileId,
    TilePosition, TileRange,
};
use navmesh_recast::{RecastConfig, TileBuilder};

use crate::cache::{CacheStats, NavMeshCache};
use crate::cache_item::{GuardedNavMeshCacheItem, TilePayload};
use crate::config::NavigatorSettings;
use crate::geometry::GeometrySource;
use crate::io::{read_cache_file, write_cache_file, CachedTile, Lz4Compressor};
use crate::jobs::{BuildJob, JobState, UpdaterStats};
use crate::updater::{AsyncTileUpdater, TileBuild};

/// Identifier of a simulated agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent #{}", self.0)
    }
}

/// Published state of a tile
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub tile: TileId,
    pub version: u64,
    pub payload: TilePayload,
}

/// Outcome of [`Navigator::load_cache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// A geometry change, clipped to the active grid
#[derive(Debug, Clone, Copy)]
struct DirtyRegion {
    range: TileRange,
    revision: u64,
}

#[derive(Debug)]
struct AgentState {
    bucket: AgentBucket,
    position: Vec3,
    /// Tiles within the preload radius
    tiles: BTreeSet<TilePosition>,
}

/// Navmesh authority for one world
pub struct Navigator {
    settings: NavigatorSettings,
    tile_world_size: f32,
    geometry: Arc<dyn GeometrySource>,
    cache: Arc<NavMeshCache>,
    updater: AsyncTileUpdater,
    buckets: AgentBucketTable,
    agents: HashMap<AgentId, AgentState>,
    /// Changed regions; a region covered by a newer one is dropped
    dirty: Vec<DirtyRegion>,
    revision: u64,
    active_grid: Option<CellGridBounds>,
}

impl Navigator {
    /// Validates `settings` and starts the build workers
    pub fn new(settings: NavigatorSettings, geometry: Arc<dyn GeometrySource>) -> Result<Self> {
        let builder = TileBuilder::new(settings.recast.clone())?;
        Self::with_builder(settings, geometry, Arc::new(builder))
    }

    /// Like [`Navigator::new`], building tiles with `builder`
    pub fn with_builder(
        settings: NavigatorSettings,
        geometry: Arc<dyn GeometrySource>,
        builder: Arc<dyn TileBuild>,
    ) -> Result<Self> {
        settings.validate()?;
        let mut buckets = AgentBucketTable::new();
        for bounds in &settings.agent_buckets {
            buckets.register(*bounds)?;
        }
        let updater = AsyncTileUpdater::new(
            builder,
            settings.resolved_worker_threads(),
            settings.min_update_interval,
        )?;

        Ok(Self {
            tile_world_size: settings.recast.tile_world_size(),
            cache: Arc::new(NavMeshCache::new(settings.cache.max_tiles)),
            settings,
            geometry,
            updater,
            buckets,
            agents: HashMap::new(),
            dirty: Vec::new(),
            revision: 0,
            active_grid: None,
        })
    }

    pub fn settings(&self) -> &NavigatorSettings {
        &self.settings
    }

    /// Shared cache, for readers on other threads
    pub fn cache(&self) -> &Arc<NavMeshCache> {
        &self.cache
    }

    pub fn agent_buckets(&self) -> &AgentBucketTable {
        &self.buckets
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Tiles currently used by an agent
    pub fn agent_tiles(&self, id: AgentId) -> Option<Vec<TileId>> {
        let agent = self.agents.get(&id)?;
        Some(
            agent
                .tiles
                .iter()
                .map(|&position| TileId {
                    position,
                    agent: agent.bucket,
                })
                .collect(),
        )
    }

    /// Geometry revision counter, bumped by every `update_geometry`
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Revision of the latest geometry change affecting `position`
    pub fn dirty_revision(&self, position: &TilePosition) -> u64 {
        self.dirty
            .iter()
            .filter(|region| region.range.contains(position))
            .map(|region| region.revision)
            .max()
            .unwrap_or(0)
    }

    /// Number of remembered geometry change regions
    pub fn dirty_region_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn stats(&self) -> UpdaterStats {
        self.updater.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.report_stats()
    }

    /// Registers an agent and marks the tiles around it as used
    pub fn add_agent(&mut self, id: AgentId, bounds: AgentBounds, position: Vec3) -> Result<()> {
        if self.agents.contains_key(&id) {
            return Err(Error::Configuration(format!("{} is already registered", id)));
        }
        let bucket = self.register_bucket(&bounds)?;
        self.agents.insert(
            id,
            AgentState {
                bucket,
                position,
                tiles: BTreeSet::new(),
            },
        );
        self.refresh_agent_tiles(id);
        self.reprioritize_jobs();
        Ok(())
    }

    /// Moves an agent, updating which tiles it uses
    pub fn update_agent_position(&mut self, id: AgentId, position: Vec3) -> Result<()> {
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or_else(|| Error::Configuration(format!("{} is not registered", id)))?;
        let previous = TilePosition::from_world(agent.position, self.tile_world_size);
        agent.position = position;
        self.refresh_agent_tiles(id);
        if TilePosition::from_world(position, self.tile_world_size) != previous {
            self.reprioritize_jobs();
        }
        Ok(())
    }

    /// Unregisters an agent, cancelling builds nobody else waits for
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        let Some(agent) = self.agents.remove(&id) else {
            return false;
        };
        let released: Vec<TileId> = agent
            .tiles
            .iter()
            .map(|&position| TileId {
                position,
                agent: agent.bucket,
            })
            .filter(|key| self.cache.set_used_by(key, id, false) == 0)
            .collect();
        self.cancel_jobs(|key| released.contains(key));
        self.reprioritize_jobs();
        true
    }

    /// Schedules rebuilds of the tiles overlapping `changed`
    ///
    /// Every tile whose build input may include the region is marked dirty.
    /// Builds are queued only for tiles that are cached, inside the active
    /// grid and within `max_tiles_distance` of an agent; the others rebuild
    /// when an agent first needs them. Returns the number of jobs posted.
    pub fn update_geometry(&mut self, changed: &Bounds) -> usize {
        self.revision += 1;
        let revision = self.revision;

        let mut range = TileRange::covering(
            &changed.expanded_xz(self.max_border_width()),
            self.tile_world_size,
        );
        if let Some(grid) = &self.active_grid {
            range = range.intersection(&grid.range());
        }
        if range.is_empty() {
            return 0;
        }
        self.dirty.retain(|region| !range.contains_range(&region.range));
        self.dirty.push(DirtyRegion { range, revision });

        // Only tiles near an agent can be scheduled, so the walk stays
        // bounded however large the change is.
        let nearby: BTreeSet<TilePosition> = self
            .agents
            .values()
            .flat_map(|agent| {
                let tile = TilePosition::from_world(agent.position, self.tile_world_size);
                TileRange::around_tile(tile, self.settings.max_tiles_distance)
                    .intersection(&range)
                    .iter()
            })
            .collect();

        let mut scheduled = 0;
        for position in nearby {
            for (bucket, _) in self.buckets.iter() {
                let key = TileId {
                    position,
                    agent: bucket,
                };
                if !self.cache.contains(&key) {
                    continue;
                }
                let item = self.cache.get_or_create(&key);
                if self.schedule(key, item, revision) {
                    scheduled += 1;
                }
            }
        }
        log::debug!(
            "Geometry revision {} touched {} tiles, {} builds queued",
            revision,
            range.len(),
            scheduled
        );
        scheduled
    }

    /// Sets the loaded region and cancels queued builds outside it
    pub fn set_active_grid(&mut self, grid: CellGridBounds) -> usize {
        self.active_grid = Some(grid);
        let cancelled = self.cancel_jobs(|key| !grid.contains(&key.position));

        let used: Vec<TileId> = self
            .agents
            .values()
            .flat_map(|agent| {
                agent.tiles.iter().map(move |&position| TileId {
                    position,
                    agent: agent.bucket,
                })
            })
            .collect();
        for key in used {
            self.schedule_if_dirty(key);
        }
        cancelled
    }

    pub fn active_grid(&self) -> Option<CellGridBounds> {
        self.active_grid
    }

    /// Bucket key of the tile at `position` for an agent of `bounds`
    pub fn tile_id(&self, position: TilePosition, bounds: &AgentBounds) -> Option<TileId> {
        let agent = self.find_bucket(bounds)?;
        Some(TileId { position, agent })
    }

    /// Latest published navmesh of a tile, if it has been built
    pub fn query(&self, position: TilePosition, bounds: &AgentBounds) -> Option<TileSnapshot> {
        let tile = self.tile_id(position, bounds)?;
        let item = self.cache.get(&tile)?;
        let item = item.read();
        let payload = item.payload()?.clone();
        Some(TileSnapshot {
            tile,
            version: item.version(),
            payload,
        })
    }

    /// True when the tile is built at `required_version` or later
    pub fn is_up_to_date(
        &self,
        position: TilePosition,
        bounds: &AgentBounds,
        required_version: u64,
    ) -> bool {
        self.query(position, bounds)
            .is_some_and(|snapshot| snapshot.version >= required_version)
    }

    /// Blocks until no build is queued or running
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.updater.wait_until_idle(timeout)
    }

    /// Writes every built tile to `path`, returning the number saved
    pub fn save_cache(&self, path: impl AsRef<Path>) -> Result<usize> {
        let tiles: Vec<CachedTile> = self
            .cache
            .entries()
            .into_iter()
            .filter_map(|(tile, item)| {
                let item = item.read();
                let payload = item.payload()?.clone();
                Some(CachedTile {
                    tile,
                    version: item.version(),
                    payload,
                })
            })
            .collect();
        write_cache_file(
            path.as_ref(),
            &self.settings.recast,
            self.buckets.as_slice(),
            &tiles,
            &Lz4Compressor,
        )?;
        log::info!(
            "Saved {} navmesh tiles to {}",
            tiles.len(),
            path.as_ref().display()
        );
        Ok(tiles.len())
    }

    /// Loads tiles saved by [`Navigator::save_cache`] into never-built entries
    ///
    /// Tiles keep their saved version. Agent buckets are matched by bounds,
    /// so the file's bucket order does not need to match this navigator's.
    pub fn load_cache(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let contents = read_cache_file(path.as_ref(), &self.settings.recast, &Lz4Compressor)?;
        let remap: Vec<Option<AgentBucket>> = contents
            .agents
            .iter()
            .map(|bounds| self.import_bucket(bounds))
            .collect();

        let mut report = LoadReport {
            loaded: 0,
            skipped: contents.skipped,
        };
        let budget = self.settings.cache.max_tiles;
        for cached in contents.tiles {
            let Some(agent) = remap.get(usize::from(cached.tile.agent.0)).copied().flatten()
            else {
                report.skipped += 1;
                continue;
            };
            let key = TileId {
                position: cached.tile.position,
                agent,
            };
            // Loaded tiles are unused, so inserting past the budget would
            // only evict earlier ones.
            if budget > 0 && self.cache.len() >= budget && !self.cache.contains(&key) {
                report.skipped += 1;
                continue;
            }
            let item = self.cache.get_or_create(&key);
            if item.write().restore(cached.payload, cached.version) {
                report.loaded += 1;
            } else {
                report.skipped += 1;
            }
        }
        log::info!(
            "Loaded {} navmesh tiles from {}, skipped {}",
            report.loaded,
            path.as_ref().display(),
            report.skipped
        );
        Ok(report)
    }

    /// Stops the build workers; queued builds are discarded
    pub fn shutdown(&mut self) {
        self.updater.stop();
    }

    fn find_bucket(&self, bounds: &AgentBounds) -> Option<AgentBucket> {
        if self.settings.agent_buckets.is_empty() {
            return self.buckets.find(bounds);
        }
        self.buckets
            .iter()
            .find(|(_, bucket)| bounds.fits_within(bucket))
            .map(|(bucket, _)| bucket)
    }

    fn register_bucket(&mut self, bounds: &AgentBounds) -> Result<AgentBucket> {
        if !self.settings.agent_buckets.is_empty() {
            bounds.validate()?;
            return self.find_bucket(bounds).ok_or_else(|| {
                Error::Configuration(format!(
                    "agent with radius {} and height {} fits no bucket",
                    bounds.radius, bounds.height
                ))
            });
        }
        RecastConfig::for_tile(&self.settings.recast, bounds, TilePosition::default())?
            .validate()?;
        self.buckets.register(*bounds)
    }

    /// Bucket for tiles saved with `bounds`
    fn import_bucket(&mut self, bounds: &AgentBounds) -> Option<AgentBucket> {
        if self.settings.agent_buckets.is_empty() {
            self.buckets.register(*bounds).ok()
        } else {
            self.buckets.find(bounds)
        }
    }

    fn refresh_agent_tiles(&mut self, id: AgentId) {
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let wanted: BTreeSet<TilePosition> = TileRange::around(
            agent.position,
            self.settings.preload_radius,
            self.tile_world_size,
        )
        .iter()
        .collect();
        let bucket = agent.bucket;
        let entered: Vec<TilePosition> = wanted.difference(&agent.tiles).copied().collect();
        let left: Vec<TilePosition> = agent.tiles.difference(&wanted).copied().collect();
        agent.tiles = wanted;

        let released: Vec<TileId> = left
            .into_iter()
            .map(|position| TileId {
                position,
                agent: bucket,
            })
            .filter(|key| self.cache.set_used_by(key, id, false) == 0)
            .collect();
        if !released.is_empty() {
            self.cancel_jobs(|key| released.contains(key));
        }

        for position in entered {
            let key = TileId {
                position,
                agent: bucket,
            };
            self.cache.set_used_by(&key, id, true);
            self.schedule_if_dirty(key);
        }
    }

    /// Queues a build when the tile changed since its last request
    fn schedule_if_dirty(&self, key: TileId) -> bool {
        let dirty = self.dirty_revision(&key.position);
        if dirty == 0 || !self.is_schedulable(&key.position) {
            return false;
        }
        let item = self.cache.get_or_create(&key);
        if item.read().requested_revision() >= dirty {
            return false;
        }
        self.schedule(key, item, dirty)
    }

    fn schedule(&self, key: TileId, item: GuardedNavMeshCacheItem, revision: u64) -> bool {
        let Some(agent) = self.buckets.get(key.agent).copied() else {
            return false;
        };
        let bounds = match self.build_bounds(&key.position, &agent) {
            Ok(bounds) => bounds,
            Err(e) => {
                log::warn!("Cannot schedule tile {}: {}", key, e);
                return false;
            }
        };
        let geometry = self.geometry.snapshot(&bounds);
        item.write().mark_requested(revision);

        let priority = self.priority(&key.position);
        let job = BuildJob::new(key, agent, geometry, priority, revision, item);
        self.updater.post(job) != JobState::Cancelled
    }

    /// Horizontal region whose triangles feed the build of a tile
    fn build_bounds(&self, position: &TilePosition, agent: &AgentBounds) -> Result<Bounds> {
        let config = RecastConfig::for_tile(&self.settings.recast, agent, *position)?;
        Ok(Bounds::new(
            Vec3::new(config.bmin.x, f32::MIN, config.bmin.z),
            Vec3::new(config.bmax.x, f32::MAX, config.bmax.z),
        ))
    }

    /// Widest tile border over all registered buckets, in world units
    fn max_border_width(&self) -> f32 {
        let recast = &self.settings.recast;
        let radius = self
            .buckets
            .iter()
            .map(|(_, b)| b.radius)
            .fold(0.0f32, f32::max);
        ((radius / recast.cell_size).ceil() + recast.border_padding as f32) * recast.cell_size
    }

    fn is_schedulable(&self, position: &TilePosition) -> bool {
        if let Some(grid) = &self.active_grid {
            if !grid.contains(position) {
                return false;
            }
        }
        self.agents.values().any(|agent| {
            TilePosition::from_world(agent.position, self.tile_world_size).distance(position)
                <= self.settings.max_tiles_distance
        })
    }

    /// Build order of a tile: distance to the nearest agent in falloff steps
    fn priority(&self, position: &TilePosition) -> u32 {
        let center = position.world_center(self.tile_world_size);
        let nearest = self
            .agents
            .values()
            .map(|agent| Vec2::new(agent.position.x, agent.position.z).distance(center))
            .fold(f32::INFINITY, f32::min);
        if nearest.is_finite() {
            (nearest / self.settings.priority_falloff) as u32
        } else {
            u32::MAX
        }
    }

    /// Reorders queued builds after the agents moved
    fn reprioritize_jobs(&self) {
        self.updater.reprioritize(|tile| self.priority(&tile.position));
    }

    fn cancel_jobs<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&TileId) -> bool,
    {
        let cancelled = self.updater.cancel(predicate);
        for job in &cancelled {
            log::debug!("Cancelled queued build of tile {}", job.tile);
            job.item.write().cancel_request();
        }
        cancelled.len()
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("agents", &self.agents.len())
            .field("buckets", &self.buckets.len())
            .field("revision", &self.revision)
            .field("dirty_regions", &self.dirty.len())
            .field("cache", &self.cache.report_stats())
            .field("updater", &self.updater.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ObjectGeometry, ObjectId};
    use navmesh_common::AreaType;
    use navmesh_recast::{InputGeometry, NavMeshTileData};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use web_time::Instant;

    const IDLE: Duration = Duration::from_secs(30);

    fn agent() -> AgentBounds {
        AgentBounds::new(0.5, 2.0)
    }

    fn strip(min_x: f32, max_x: f32) -> InputGeometry {
        let mut geometry = InputGeometry::new();
        geometry.add_mesh(
            &[
                Vec3::new(min_x, 0.0, 0.0),
                Vec3::new(min_x, 0.0, 10.0),
                Vec3::new(max_x, 0.0, 10.0),
                Vec3::new(max_x, 0.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
            AreaType::Ground,
        );
        geometry
    }

    fn world(min_x: f32, max_x: f32) -> Result<Arc<ObjectGeometry>> {
        let world = Arc::new(ObjectGeometry::new());
        world.add_object(ObjectId(1), strip(min_x, max_x))?;
        Ok(world)
    }

    fn settings() -> NavigatorSettings {
        NavigatorSettings::default()
            .with_worker_threads(1)
            .with_preload_radius(1.0)
            .with_min_update_interval(Duration::ZERO)
    }

    fn region(min_x: f32, max_x: f32) -> Bounds {
        Bounds::new(Vec3::new(min_x, 0.0, 0.0), Vec3::new(max_x, 1.0, 10.0))
    }

    /// Holds every build until the gate opens, recording the build order
    struct GatedBuilder {
        inner: TileBuilder,
        open: AtomicBool,
        built: Mutex<Vec<i32>>,
    }

    impl GatedBuilder {
        fn new() -> Result<Arc<Self>> {
            Ok(Arc::new(Self {
                inner: TileBuilder::new(settings().recast)?,
                open: AtomicBool::new(false),
                built: Mutex::new(Vec::new()),
            }))
        }

        fn open(&self) {
            self.open.store(true, Ordering::SeqCst);
        }

        fn built(&self) -> Vec<i32> {
            self.built.lock().clone()
        }
    }

    impl TileBuild for GatedBuilder {
        fn build(&self, job: &BuildJob) -> Result<NavMeshTileData> {
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            self.built.lock().push(job.tile.x());
            self.inner.build(job)
        }
    }

    /// Fails every build the way a voxel overflow would
    struct OverflowBuilder;

    impl TileBuild for OverflowBuilder {
        fn build(&self, _job: &BuildJob) -> Result<NavMeshTileData> {
            Err(Error::NavMeshGeneration("region id overflow".to_string()))
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_agents_snap_to_buckets() -> Result<()> {
        let settings = settings().with_agent_buckets(vec![
            AgentBounds::new(0.5, 2.0),
            AgentBounds::new(1.0, 3.0),
        ]);
        let mut nav = Navigator::new(settings, world(0.0, 10.0)?)?;

        nav.add_agent(AgentId(1), AgentBounds::new(0.4, 1.8), Vec3::new(5.0, 0.0, 5.0))?;
        nav.add_agent(AgentId(2), AgentBounds::new(0.8, 2.5), Vec3::new(5.0, 0.0, 5.0))?;
        let too_wide = nav.add_agent(AgentId(3), AgentBounds::new(2.0, 2.0), Vec3::ZERO);
        assert!(matches!(too_wide, Err(Error::Configuration(_))));

        let tiles = |id| nav.agent_tiles(AgentId(id)).unwrap_or_default();
        assert_eq!(tiles(1), vec![TileId::new(0, 0, AgentBucket(0))]);
        assert_eq!(tiles(2), vec![TileId::new(0, 0, AgentBucket(1))]);
        assert_eq!(nav.agent_buckets().len(), 2);
        assert_eq!(nav.agent_count(), 2);
        Ok(())
    }

    #[test]
    fn test_exact_buckets_register_new_shapes() -> Result<()> {
        let mut nav = Navigator::new(settings(), world(0.0, 10.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::ZERO)?;
        nav.add_agent(AgentId(2), agent(), Vec3::ZERO)?;
        nav.add_agent(AgentId(3), AgentBounds::new(0.6, 2.0), Vec3::ZERO)?;
        assert_eq!(nav.agent_buckets().len(), 2);
        assert_eq!(
            nav.tile_id(TilePosition::new(2, 3), &AgentBounds::new(0.6, 2.0)),
            Some(TileId::new(2, 3, AgentBucket(1)))
        );
        let unknown = AgentBounds::new(0.7, 2.0);
        assert_eq!(nav.tile_id(TilePosition::new(0, 0), &unknown), None);

        let short = nav.add_agent(AgentId(4), AgentBounds::new(0.5, 0.1), Vec3::ZERO);
        assert!(matches!(short, Err(Error::Configuration(_))));
        Ok(())
    }

    #[test]
    fn test_agent_registration_errors() -> Result<()> {
        let mut nav = Navigator::new(settings(), world(0.0, 10.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::ZERO)?;
        assert!(nav.add_agent(AgentId(1), agent(), Vec3::ZERO).is_err());
        assert!(nav.update_agent_position(AgentId(2), Vec3::ZERO).is_err());
        assert!(!nav.remove_agent(AgentId(2)));
        assert!(nav.remove_agent(AgentId(1)));
        assert_eq!(nav.agent_count(), 0);
        Ok(())
    }

    #[test]
    fn test_moving_agent_updates_used_tiles() -> Result<()> {
        let mut nav = Navigator::new(settings(), world(0.0, 10.0)?)?;
        let here = TileId::new(0, 0, AgentBucket(0));
        let there = TileId::new(1, 0, AgentBucket(0));

        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        assert!(nav.cache().is_used(&here));
        assert!(!nav.cache().contains(&there));

        nav.update_agent_position(AgentId(1), Vec3::new(25.0, 0.0, 5.0))?;
        assert!(!nav.cache().is_used(&here));
        assert!(nav.cache().is_used(&there));

        // Near a tile corner the agent uses all four neighbours.
        nav.update_agent_position(AgentId(1), Vec3::new(19.0, 0.0, 19.0))?;
        assert_eq!(nav.agent_tiles(AgentId(1)).map(|t| t.len()), Some(4));
        assert!(nav.cache().is_used(&here));

        nav.remove_agent(AgentId(1));
        assert!(!nav.cache().is_used(&here));
        assert!(!nav.cache().is_used(&there));
        Ok(())
    }

    #[test]
    fn test_geometry_change_builds_used_tile() -> Result<()> {
        let mut nav = Navigator::new(settings(), world(0.0, 10.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        assert_eq!(nav.stats().queued, 0);
        let origin = TilePosition::new(0, 0);
        assert!(nav.query(origin, &agent()).is_none());

        assert_eq!(nav.update_geometry(&region(0.0, 10.0)), 1);
        assert!(nav.wait_until_idle(IDLE));
        let snapshot = nav.query(origin, &agent());
        assert_eq!(snapshot.as_ref().map(|s| s.version), Some(1));
        assert!(snapshot.is_some_and(|s| s.payload.data.poly_count() > 0));
        assert!(nav.is_up_to_date(origin, &agent(), 1));
        assert!(!nav.is_up_to_date(origin, &agent(), 2));

        // Neighbours inside the change's border were marked, not built.
        assert_eq!(nav.dirty_revision(&TilePosition::new(-1, 0)), 1);
        assert_eq!(nav.cache().len(), 1);
        Ok(())
    }

    #[test]
    fn test_removed_agent_cancels_its_queued_builds() -> Result<()> {
        let builder = GatedBuilder::new()?;
        let mut nav = Navigator::with_builder(settings(), world(0.0, 120.0)?, builder.clone())?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        nav.add_agent(AgentId(2), agent(), Vec3::new(105.0, 0.0, 5.0))?;

        assert_eq!(nav.update_geometry(&region(0.0, 10.0)), 1);
        assert!(wait_for(|| nav.stats().in_progress == 1));
        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 1);
        assert_eq!(nav.stats().queued, 1);

        assert!(nav.remove_agent(AgentId(2)));
        let stats = nav.stats();
        assert_eq!((stats.queued, stats.cancelled), (0, 1));
        let far = TileId::new(5, 0, AgentBucket(0));
        let requested = nav
            .cache()
            .get(&far)
            .map(|item| item.read().requested_revision());
        assert_eq!(requested, Some(0));

        builder.open();
        assert!(nav.wait_until_idle(IDLE));
        assert!(nav.is_up_to_date(TilePosition::new(0, 0), &agent(), 1));
        assert!(nav.query(TilePosition::new(5, 0), &agent()).is_none());
        Ok(())
    }

    #[test]
    fn test_active_grid_limits_builds() -> Result<()> {
        let builder = GatedBuilder::new()?;
        let mut nav = Navigator::with_builder(settings(), world(0.0, 120.0)?, builder.clone())?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        nav.add_agent(AgentId(2), agent(), Vec3::new(105.0, 0.0, 5.0))?;

        assert_eq!(nav.update_geometry(&region(0.0, 10.0)), 1);
        assert!(wait_for(|| nav.stats().in_progress == 1));
        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 1);

        let grid = CellGridBounds::new(TilePosition::new(0, 0), 1);
        assert_eq!(nav.set_active_grid(grid), 1);
        assert_eq!(nav.active_grid(), Some(grid));
        assert_eq!(nav.stats().queued, 0);

        // Changes outside the loaded region are ignored entirely.
        let far = TilePosition::new(5, 0);
        let before = nav.dirty_revision(&far);
        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 0);
        assert_eq!(nav.dirty_revision(&far), before);

        // Moving the grid over the agent queues its remembered change.
        builder.open();
        assert_eq!(nav.set_active_grid(CellGridBounds::new(far, 1)), 0);
        assert!(nav.wait_until_idle(IDLE));
        assert!(nav.is_up_to_date(far, &agent(), 1));
        Ok(())
    }

    #[test]
    fn test_distant_changes_wait_for_an_agent() -> Result<()> {
        let settings = settings().with_max_tiles_distance(2);
        let mut nav = Navigator::new(settings, world(0.0, 120.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(105.0, 0.0, 5.0))?;
        nav.update_agent_position(AgentId(1), Vec3::new(5.0, 0.0, 5.0))?;
        let far = TilePosition::new(5, 0);
        assert!(nav.cache().contains(&TileId::new(5, 0, AgentBucket(0))));

        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 0);
        assert_eq!(nav.dirty_revision(&far), 1);

        nav.update_agent_position(AgentId(1), Vec3::new(105.0, 0.0, 5.0))?;
        assert!(nav.wait_until_idle(IDLE));
        assert!(nav.is_up_to_date(far, &agent(), 1));
        assert_eq!(nav.stats().done, 1);
        Ok(())
    }

    #[test]
    fn test_failed_build_waits_for_next_change() -> Result<()> {
        let mut nav =
            Navigator::with_builder(settings(), world(100.0, 110.0)?, Arc::new(OverflowBuilder))?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(105.0, 0.0, 5.0))?;
        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 1);
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(nav.stats().failed, 1);

        let far = TileId::new(5, 0, AgentBucket(0));
        let revisions = |nav: &Navigator| {
            nav.cache()
                .get(&far)
                .map(|item| {
                    let item = item.read();
                    (item.requested_revision(), item.built_revision())
                })
        };
        assert_eq!(revisions(&nav), Some((1, 0)));

        // Leaving and re-entering does not retry the same revision.
        nav.update_agent_position(AgentId(1), Vec3::new(5.0, 0.0, 5.0))?;
        nav.update_agent_position(AgentId(1), Vec3::new(105.0, 0.0, 5.0))?;
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(nav.stats().failed, 1);

        assert_eq!(nav.update_geometry(&region(100.0, 110.0)), 1);
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(nav.stats().failed, 2);
        assert_eq!(revisions(&nav), Some((2, 0)));
        Ok(())
    }
    #[test]
    fn test_queued_builds_follow_the_moving_agent() -> Result<()> {
        let builder = GatedBuilder::new()?;
        let mut nav = Navigator::with_builder(settings(), world(0.0, 160.0)?, builder.clone())?;
        let at_tile = |x: i32| Vec3::new(x as f32 * 19.2 + 9.6, 0.0, 5.0);
        nav.add_agent(AgentId(1), agent(), at_tile(0))?;
        for x in 1..8 {
            nav.update_agent_position(AgentId(1), at_tile(x))?;
        }
        nav.update_agent_position(AgentId(1), at_tile(0))?;
        assert_eq!(nav.cache().len(), 8);

        assert_eq!(nav.update_geometry(&region(0.0, 160.0)), 8);
        assert!(wait_for(|| nav.stats().in_progress == 1));

        nav.update_agent_position(AgentId(1), at_tile(6))?;
        builder.open();
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(builder.built(), vec![0, 6, 5, 7, 4, 3, 2, 1]);
        Ok(())
    }

    #[test]
    fn test_repeated_changes_are_throttled() -> Result<()> {
        let interval = Duration::from_secs(1);
        let settings = settings().with_min_update_interval(interval);
        let mut nav = Navigator::new(settings, world(0.0, 10.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        let origin = TilePosition::new(0, 0);

        // The first build of a tile is never held back.
        let started = Instant::now();
        assert_eq!(nav.update_geometry(&region(0.0, 10.0)), 1);
        assert!(nav.wait_until_idle(IDLE));
        assert!(nav.is_up_to_date(origin, &agent(), 1));

        for _ in 0..5 {
            nav.update_geometry(&region(0.0, 10.0));
        }
        let stats = nav.stats();
        assert_eq!((stats.queued, stats.delayed), (1, 1));

        assert!(nav.wait_until_idle(IDLE));
        assert!(started.elapsed() >= interval);
        assert_eq!(nav.query(origin, &agent()).map(|s| s.version), Some(2));
        assert_eq!(nav.stats().superseded, 4);
        Ok(())
    }

    #[test]
    fn test_huge_change_stays_near_the_agents() -> Result<()> {
        let mut nav = Navigator::new(settings(), world(0.0, 10.0)?)?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        let world_sized = Bounds::new(
            Vec3::new(-20_000.0, 0.0, -20_000.0),
            Vec3::new(20_000.0, 1.0, 20_000.0),
        );

        let started = Instant::now();
        assert_eq!(nav.update_geometry(&world_sized), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(nav.dirty_revision(&TilePosition::new(1000, 1000)), 1);

        // A change inside a remembered one replaces it.
        nav.update_geometry(&world_sized);
        nav.update_geometry(&region(0.0, 10.0));
        assert_eq!(nav.dirty_region_count(), 2);
        assert_eq!(nav.dirty_revision(&TilePosition::new(1000, 1000)), 2);
        assert_eq!(nav.dirty_revision(&TilePosition::new(0, 0)), 3);

        nav.update_geometry(&world_sized);
        assert_eq!(nav.dirty_region_count(), 1);
        assert!(nav.wait_until_idle(IDLE));
        Ok(())
    }

    #[test]
    fn test_load_stops_at_the_tile_budget() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tiles.nmc");
        let mut nav = Navigator::new(settings(), world(0.0, 60.0)?)?;
        for x in 0..3 {
            let position = Vec3::new(x as f32 * 19.2 + 5.0, 0.0, 5.0);
            nav.add_agent(AgentId(x), agent(), position)?;
        }
        assert_eq!(nav.update_geometry(&region(0.0, 60.0)), 3);
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(nav.save_cache(&path)?, 3);

        let mut small = Navigator::new(settings().with_max_tiles(2), world(0.0, 60.0)?)?;
        let report = small.load_cache(&path)?;
        assert_eq!(report, LoadReport { loaded: 2, skipped: 1 });
        assert_eq!(small.cache().len(), 2);
        assert_eq!(small.cache_stats().expired, 0);
        Ok(())
    }
}
