//! Streamed navmesh tiles for a changing world
//!
//! This crate keeps the navmesh of a large world split into tiles and
//! rebuilds them in the background as the world changes. Simulation code
//! talks to a [`Navigator`]: it registers agents, reports their movement and
//! tells the navigator which regions of collision geometry changed. The
//! navigator works out which tiles are affected, snapshots their input
//! triangles and queues [`BuildJob`]s for the [`AsyncTileUpdater`] workers.
//!
//! Built tiles live in a [`NavMeshCache`] keyed by tile and agent bucket.
//! Each entry is a [`NavMeshCacheItem`] behind its own reader/writer lock, so
//! pathfinding threads read published tiles while other tiles build, and a
//! worker swaps in a new version only once it is complete.
//!
//! # Example
//!
//! ```rust,no_run
//! use detour_navigator::{AgentId, Navigator, NavigatorSettings, ObjectGeometry, ObjectId};
//! use glam::Vec3;
//! use navmesh_common::{AgentBounds, AreaType, TilePosition};
//! use navmesh_recast::InputGeometry;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> navmesh_common::Result<()> {
//! let world = Arc::new(ObjectGeometry::new());
//! let mut navigator = Navigator::new(NavigatorSettings::default(), world.clone())?;
//!
//! let agent = AgentBounds::new(0.5, 2.0);
//! navigator.add_agent(AgentId(1), agent, Vec3::new(5.0, 0.0, 5.0))?;
//!
//! let mut floor = InputGeometry::new();
//! floor.add_mesh(
//!     &[
//!         Vec3::new(0.0, 0.0, 0.0),
//!         Vec3::new(0.0, 0.0, 10.0),
//!         Vec3::new(10.0, 0.0, 10.0),
//!         Vec3::new(10.0, 0.0, 0.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//!     AreaType::Ground,
//! );
//! let changed = world.add_object(ObjectId(1), floor)?;
//! navigator.update_geometry(&changed);
//!
//! navigator.wait_until_idle(Duration::from_secs(5));
//! if let Some(tile) = navigator.query(TilePosition::new(0, 0), &agent) {
//!     println!("tile {} version {}", tile.tile, tile.version);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(unused))]

mod cache;
mod cache_item;
mod config;
mod geometry;
pub mod io;
mod jobs;
mod navigator;
mod updater;

#[cfg(test)]
mod navigator_scenario_tests;

pub use cache::{CacheStats, NavMeshCache};
pub use cache_item::{GuardedNavMeshCacheItem, NavMeshCacheItem, PublishOutcome, TilePayload};
pub use config::{CacheSettings, NavigatorSettings};
pub use geometry::{GeometrySource, ObjectGeometry, ObjectId};
pub use jobs::{BuildJob, JobQueue, JobState, UpdaterStats};
pub use navigator::{AgentId, LoadReport, Navigator, TileSnapshot};
pub use updater::{AsyncTileUpdater, TileBuild};
