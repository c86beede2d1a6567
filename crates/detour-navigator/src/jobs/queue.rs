use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use navmesh_common::TileId;
use parking_lot::{Condvar, Mutex};
use web_time::Instant;

use super::{BuildJob, JobState};

/// Snapshot of queue and worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterStats {
    /// Jobs waiting to run
    pub queued: usize,
    /// Queued jobs held back by the rebuild interval
    pub delayed: usize,
    /// Jobs being built right now
    pub in_progress: usize,
    pub done: u64,
    pub failed: u64,
    pub superseded: u64,
    pub stale: u64,
    pub cancelled: u64,
}

struct QueuedJob {
    job: BuildJob,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<TileId, QueuedJob>,
    /// `(priority, seq)` ordering of the queued keys
    order: BTreeMap<(u32, u64), TileId>,
    in_progress: HashSet<TileId>,
    /// When each key was last handed to a worker
    last_updates: HashMap<TileId, Instant>,
    next_seq: u64,
    closed: bool,
    stats: UpdaterStats,
}

impl QueueState {
    fn remove(&mut self, tile: &TileId) -> Option<BuildJob> {
        let queued = self.jobs.remove(tile)?;
        self.order.remove(&(queued.job.priority, queued.seq));
        Some(queued.job)
    }

    fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.in_progress.is_empty()
    }

    /// Earliest time a job for `tile` may start
    fn ready_at(&self, tile: &TileId, interval: Duration) -> Option<Instant> {
        self.last_updates.get(tile).map(|last| *last + interval)
    }
}

/// Build queue keyed by tile
///
/// Holds at most one job per key: pushing a job for a queued key replaces
/// the waiting job but keeps its place among equal priorities. Jobs pop in
/// priority order, FIFO within a priority, and a key is never handed to two
/// workers at once. A key is not handed out again until the minimum update
/// interval has passed since its previous build started.
pub struct JobQueue {
    state: Mutex<QueueState>,
    min_update_interval: Duration,
    available: Condvar,
    idle: Condvar,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_min_update_interval(Duration::ZERO)
    }

    /// Queue that holds back repeated builds of a key for `interval`
    pub fn with_min_update_interval(interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            min_update_interval: interval,
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Queues a job, returning `Superseded` when it replaced a waiting job
    /// for the same key and `Cancelled` when the queue is closed
    pub fn push(&self, job: BuildJob) -> JobState {
        let mut state = self.state.lock();
        if state.closed {
            return JobState::Cancelled;
        }

        let tile = job.tile;
        let (seq, outcome) = match state.jobs.remove(&tile) {
            Some(old) => {
                state.order.remove(&(old.job.priority, old.seq));
                state.stats.superseded += 1;
                log::trace!(
                    "Job {} for tile {} superseded by job {}",
                    old.job.id,
                    tile,
                    job.id
                );
                (old.seq, JobState::Superseded)
            }
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                (seq, JobState::Queued)
            }
        };
        log::trace!(
            "Queued job {} for tile {} at priority {}",
            job.id,
            tile,
            job.priority
        );
        state.order.insert((job.priority, seq), tile);
        state.jobs.insert(tile, QueuedJob { job, seq });
        drop(state);
        self.available.notify_one();
        outcome
    }

    /// Blocks until a job is available, returning `None` once closed
    pub fn pop(&self) -> Option<BuildJob> {
        let interval = self.min_update_interval;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if !interval.is_zero() {
                state
                    .last_updates
                    .retain(|_, last| now.duration_since(*last) < interval);
            }

            let mut next = None;
            let mut wake_at: Option<Instant> = None;
            for tile in state.order.values() {
                if state.in_progress.contains(tile) {
                    continue;
                }
                match state.ready_at(tile, interval) {
                    Some(ready) if ready > now => {
                        wake_at = Some(wake_at.map_or(ready, |w| w.min(ready)));
                    }
                    _ => {
                        next = Some(*tile);
                        break;
                    }
                }
            }

            if let Some(tile) = next {
                if let Some(job) = state.remove(&tile) {
                    state.in_progress.insert(tile);
                    if !interval.is_zero() {
                        state.last_updates.insert(tile, now);
                    }
                    log::trace!("Popped job {} for tile {}", job.id, tile);
                    return Some(job);
                }
            }
            match wake_at {
                Some(ready) => {
                    self.available.wait_for(&mut state, ready.duration_since(now));
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Recomputes the priority of every queued job
    ///
    /// Called when the agents move, so the queue keeps building the tiles
    /// closest to where they are now. Jobs keep their place among equal
    /// priorities.
    pub fn reprioritize<F>(&self, mut priority: F)
    where
        F: FnMut(&TileId) -> u32,
    {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.order.clear();
        for (tile, queued) in state.jobs.iter_mut() {
            queued.job.priority = priority(tile);
            state.order.insert((queued.job.priority, queued.seq), *tile);
        }
    }

    /// Records the final state of a popped job
    pub fn finish(&self, tile: &TileId, outcome: JobState) {
        let mut state = self.state.lock();
        state.in_progress.remove(tile);
        match outcome {
            JobState::Done => state.stats.done += 1,
            JobState::Failed => state.stats.failed += 1,
            JobState::Stale => state.stats.stale += 1,
            _ => {}
        }
        let idle = state.is_idle();
        // A job for this key may have been held back while it was building.
        let waiting = state.jobs.contains_key(tile);
        drop(state);
        if waiting {
            self.available.notify_all();
        }
        if idle {
            self.idle.notify_all();
        }
    }

    /// Removes queued jobs whose key matches `predicate`
    pub fn cancel<F>(&self, mut predicate: F) -> Vec<BuildJob>
    where
        F: FnMut(&TileId) -> bool,
    {
        let mut state = self.state.lock();
        let keys: Vec<TileId> = state
            .jobs
            .keys()
            .filter(|k| predicate(*k))
            .copied()
            .collect();
        let cancelled: Vec<BuildJob> = keys.iter().filter_map(|k| state.remove(k)).collect();
        state.stats.cancelled += cancelled.len() as u64;
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_all();
        }
        cancelled
    }

    pub fn is_queued(&self, tile: &TileId) -> bool {
        self.state.lock().jobs.contains_key(tile)
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    pub fn stats(&self) -> UpdaterStats {
        let state = self.state.lock();
        let now = Instant::now();
        let delayed = state
            .jobs
            .keys()
            .filter(|tile| {
                state
                    .ready_at(tile, self.min_update_interval)
                    .is_some_and(|ready| ready > now)
            })
            .count();
        UpdaterStats {
            queued: state.jobs.len(),
            delayed,
            in_progress: state.in_progress.len(),
            ..state.stats
        }
    }

    /// Waits until nothing is queued or building
    ///
    /// Returns false when `timeout` elapsed first.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.idle.wait_for(&mut state, deadline - now);
        }
        true
    }

    /// Discards every queued job and wakes all waiters
    ///
    /// Jobs already popped still run to completion.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let discarded = state.jobs.len();
        state.jobs.clear();
        state.order.clear();
        state.stats.cancelled += discarded as u64;
        drop(state);
        self.available.notify_all();
        self.idle.notify_all();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
