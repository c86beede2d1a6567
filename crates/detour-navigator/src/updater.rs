//! Worker pool that builds queued tiles in the background

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use navmesh_common::{Result, TileId};
use navmesh_recast::{NavMeshTileData, TileBuilder};

use crate::cache_item::{PublishOutcome, TilePayload};
use crate::jobs::{BuildJob, JobQueue, JobState, UpdaterStats};

/// Produces the navmesh of a job's tile
pub trait TileBuild: Send + Sync {
    fn build(&self, job: &BuildJob) -> Result<NavMeshTileData>;
}

impl TileBuild for TileBuilder {
    fn build(&self, job: &BuildJob) -> Result<NavMeshTileData> {
        let built = self.build_tile(&job.geometry, job.tile.position, &job.agent)?;
        Ok(built.data)
    }
}

/// Background tile builder
///
/// Owns a fixed set of OS threads pulling from a shared [`JobQueue`]. A build
/// runs without any cache lock held; only the final publish takes the item's
/// write lock. Dropping the updater discards queued jobs and joins the
/// workers after their current build.
pub struct AsyncTileUpdater {
    queue: Arc<JobQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncTileUpdater {
    /// Starts `threads` workers building with `builder`
    ///
    /// A tile is rebuilt at most once per `min_update_interval`; later
    /// requests wait in the queue until the interval has passed.
    pub fn new(
        builder: Arc<dyn TileBuild>,
        threads: usize,
        min_update_interval: Duration,
    ) -> Result<Self> {
        let queue = Arc::new(JobQueue::with_min_update_interval(min_update_interval));
        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_queue = queue.clone();
            let builder = builder.clone();
            let handle = thread::Builder::new()
                .name(format!("navmesh-worker-{}", index))
                .spawn(move || worker_loop(&worker_queue, builder.as_ref()));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    log::error!("Failed to start navmesh build worker {}: {}", index, e);
                    abort_workers(&queue, workers);
                    return Err(e.into());
                }
            }
        }
        log::info!("Started {} navmesh build workers", threads);
        Ok(Self { queue, workers })
    }

    /// Queues a job, superseding a waiting job for the same tile
    pub fn post(&self, job: BuildJob) -> JobState {
        self.queue.push(job)
    }

    /// Drops queued jobs whose tile matches `predicate`
    pub fn cancel<F>(&self, predicate: F) -> Vec<BuildJob>
    where
        F: FnMut(&TileId) -> bool,
    {
        self.queue.cancel(predicate)
    }

    /// Reorders queued jobs by freshly computed priorities
    pub fn reprioritize<F>(&self, priority: F)
    where
        F: FnMut(&TileId) -> u32,
    {
        self.queue.reprioritize(priority)
    }

    pub fn is_queued(&self, tile: &TileId) -> bool {
        self.queue.is_queued(tile)
    }

    pub fn stats(&self) -> UpdaterStats {
        self.queue.stats()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Blocks until every queued job has been built, or `timeout` elapses
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_until_idle(timeout)
    }

    /// Discards queued jobs and joins the workers
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let discarded = self.queue.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("Navmesh build worker exited with a panic");
            }
        }
        log::info!(
            "Stopped navmesh build workers, {} queued jobs discarded",
            discarded
        );
    }
}

impl Drop for AsyncTileUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Closes the queue and joins workers started before a failed spawn
fn abort_workers(queue: &JobQueue, workers: Vec<JoinHandle<()>>) {
    queue.close();
    for worker in workers {
        if worker.join().is_err() {
            log::warn!("Navmesh build worker exited with a panic");
        }
    }
}

fn worker_loop(queue: &JobQueue, builder: &dyn TileBuild) {
    while let Some(job) = queue.pop() {
        let outcome = run_job(builder, &job);
        queue.finish(&job.tile, outcome);
    }
}

/// Builds one job and publishes its result
///
/// Never panics: a panic inside the builder is caught and reported as
/// `Failed`, leaving the item untouched.
pub(crate) fn run_job(builder: &dyn TileBuild, job: &BuildJob) -> JobState {
    let built = catch_unwind(AssertUnwindSafe(|| TilePayload::new(builder.build(job)?)));

    let payload = match built {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            log::warn!("Failed to build navmesh tile {}: {}", job.tile, e);
            return JobState::Failed;
        }
        Err(_) => {
            log::warn!("Navmesh builder panicked on tile {}", job.tile);
            return JobState::Failed;
        }
    };

    let polygons = payload.data.poly_count();
    let outcome = job.item.write().publish(job.id, job.revision, payload);
    match outcome {
        PublishOutcome::Applied { version } => {
            log::debug!(
                "Built navmesh tile {} version {} ({} polygons, job {})",
                job.tile,
                version,
                polygons,
                job.id
            );
            JobState::Done
        }
        PublishOutcome::Stale { built_job } => {
            log::debug!(
                "Discarded stale build of tile {} from job {}, job {} already published",
                job.tile,
                job.id,
                built_job
            );
            JobState::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_item::NavMeshCacheItem;
    use glam::Vec3;
    use navmesh_common::{AgentBounds, AgentBucket, AreaType, Error};
    use navmesh_recast::{InputGeometry, RecastSettings};

    fn plane(size: f32) -> InputGeometry {
        let mut geometry = InputGeometry::new();
        geometry.add_mesh(
            &[
                Vec3::ZERO,
                Vec3::new(0.0, 0.0, size),
                Vec3::new(size, 0.0, size),
                Vec3::new(size, 0.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
            AreaType::Ground,
        );
        geometry
    }

    fn builder() -> Result<TileBuilder> {
        TileBuilder::new(RecastSettings::default())
    }

    /// Panics on tiles with a negative x, builds everything else
    struct FaultyBuilder(TileBuilder);

    /// Fails every build the way a voxel overflow would
    struct OverflowBuilder;

    impl TileBuild for OverflowBuilder {
        fn build(&self, _job: &BuildJob) -> Result<NavMeshTileData> {
            Err(Error::NavMeshGeneration("region id overflow".to_string()))
        }
    }

    impl TileBuild for FaultyBuilder {
        fn build(&self, job: &BuildJob) -> Result<NavMeshTileData> {
            if job.tile.x() < 0 {
                panic!("corrupt input for tile {}", job.tile);
            }
            self.0.build(job)
        }
    }

    fn job(x: i32, geometry: InputGeometry, item: &crate::GuardedNavMeshCacheItem) -> BuildJob {
        BuildJob::new(
            TileId::new(x, 0, AgentBucket(0)),
            AgentBounds::new(0.5, 2.0),
            geometry,
            0,
            1,
            item.clone(),
        )
    }

    #[test]
    fn test_run_job_publishes() -> Result<()> {
        let item = NavMeshCacheItem::guarded();
        let state = run_job(&builder()?, &job(0, plane(10.0), &item));
        assert_eq!(state, JobState::Done);
        let item = item.read();
        assert_eq!(item.version(), 1);
        assert!(!item.bytes().is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_build_keeps_previous_contents() -> Result<()> {
        let item = NavMeshCacheItem::guarded();
        assert_eq!(run_job(&builder()?, &job(0, plane(10.0), &item)), JobState::Done);
        let before = item.read().bytes().to_vec();

        assert_eq!(
            run_job(&OverflowBuilder, &job(0, plane(10.0), &item)),
            JobState::Failed
        );
        let item = item.read();
        assert_eq!(item.version(), 1);
        assert_eq!(item.bytes(), &before[..]);
        Ok(())
    }

    #[test]
    fn test_empty_geometry_clears_the_tile() -> Result<()> {
        let builder = builder()?;
        let item = NavMeshCacheItem::guarded();
        assert_eq!(run_job(&builder, &job(0, plane(10.0), &item)), JobState::Done);
        assert!(item.read().tile().is_some_and(|t| t.poly_count() > 0));

        assert_eq!(
            run_job(&builder, &job(0, InputGeometry::new(), &item)),
            JobState::Done
        );
        let item = item.read();
        assert_eq!(item.version(), 2);
        assert!(item.tile().is_some_and(|t| t.is_empty()));
        Ok(())
    }

    #[test]
    fn test_stale_job_never_lowers_version() -> Result<()> {
        let builder = builder()?;
        let item = NavMeshCacheItem::guarded();
        let older = job(0, plane(10.0), &item);
        let newer = job(0, plane(8.0), &item);
        assert!(older.id < newer.id);

        assert_eq!(run_job(&builder, &newer), JobState::Done);
        let published = item.read().bytes().to_vec();
        assert_eq!(run_job(&builder, &older), JobState::Stale);

        let item = item.read();
        assert_eq!(item.version(), 1);
        assert_eq!(item.built_job(), newer.id);
        assert_eq!(item.bytes(), &published[..]);
        Ok(())
    }

    #[test]
    fn test_panicking_build_is_contained() -> Result<()> {
        let builder = FaultyBuilder(builder()?);
        let item = NavMeshCacheItem::guarded();
        assert_eq!(run_job(&builder, &job(-1, plane(10.0), &item)), JobState::Failed);
        assert_eq!(item.read().version(), 0);
        Ok(())
    }

    #[test]
    fn test_worker_survives_panic() -> Result<()> {
        let builder = FaultyBuilder(builder()?);
        let updater = AsyncTileUpdater::new(Arc::new(builder), 1, Duration::ZERO)?;
        let broken = NavMeshCacheItem::guarded();
        let healthy = NavMeshCacheItem::guarded();
        updater.post(job(-1, plane(10.0), &broken));
        updater.post(job(0, plane(10.0), &healthy));
        assert!(updater.wait_until_idle(Duration::from_secs(30)));

        let stats = updater.stats();
        assert_eq!((stats.failed, stats.done), (1, 1));
        assert_eq!(broken.read().version(), 0);
        assert_eq!(healthy.read().version(), 1);
        Ok(())
    }

    #[test]
    fn test_partially_started_pool_shuts_down() -> Result<()> {
        let queue = Arc::new(JobQueue::new());
        let builder: Arc<dyn TileBuild> = Arc::new(builder()?);
        let workers: Vec<JoinHandle<()>> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                let builder = builder.clone();
                thread::spawn(move || worker_loop(&queue, builder.as_ref()))
            })
            .collect();
        let item = NavMeshCacheItem::guarded();
        queue.push(job(0, plane(10.0), &item));
        assert!(queue.wait_until_idle(Duration::from_secs(30)));

        queue.push(job(1, plane(10.0), &NavMeshCacheItem::guarded()));
        abort_workers(&queue, workers);
        assert!(queue.is_closed());
        assert!(queue.pop().is_none());
        assert_eq!(item.read().version(), 1);
        Ok(())
    }

    #[test]
    fn test_workers_drain_queue() -> Result<()> {
        let mut updater = AsyncTileUpdater::new(Arc::new(builder()?), 2, Duration::ZERO)?;
        assert_eq!(updater.worker_count(), 2);

        let items: Vec<_> = (0..4).map(|_| NavMeshCacheItem::guarded()).collect();
        for (x, item) in items.iter().enumerate() {
            let mut geometry = plane(10.0);
            let offset = Vec3::new(x as f32 * 19.2, 0.0, 0.0);
            geometry.vertices.iter_mut().for_each(|v| *v += offset);
            assert_eq!(updater.post(job(x as i32, geometry, item)), JobState::Queued);
        }
        assert!(updater.wait_until_idle(Duration::from_secs(30)));

        let stats = updater.stats();
        assert_eq!(stats.done, 4);
        assert_eq!(stats.queued, 0);
        assert!(items.iter().all(|item| item.read().version() == 1));

        updater.stop();
        assert_eq!(updater.post(job(9, plane(1.0), &items[0])), JobState::Cancelled);
        Ok(())
    }
}
