//! Tile build jobs and the keyed priority queue that feeds the workers

mod build_job;
mod queue;

pub use build_job::{BuildJob, JobState};
pub use queue::{JobQueue, UpdaterStats};
