//! Navigator and cache settings

use std::time::Duration;

use navmesh_common::{AgentBounds, Error, Result, TilePosition};
use navmesh_recast::{RecastConfig, RecastSettings};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Limits of the tile cache
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct CacheSettings {
    /// Tile budget; 0 disables eviction
    pub max_tiles: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_tiles: 512 }
    }
}

impl CacheSettings {
    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = max_tiles;
        self
    }
}

/// Configuration of a [`Navigator`](crate::Navigator)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct NavigatorSettings {
    /// Voxelization settings shared by every tile
    pub recast: RecastSettings,
    pub cache: CacheSettings,
    /// Build threads; 0 uses the available parallelism
    pub worker_threads: usize,
    /// Tiles within this distance of an agent are kept built, in world units
    pub preload_radius: f32,
    /// World distance per priority step when ordering builds
    pub priority_falloff: f32,
    /// Agent shapes that tiles are built for. An agent snaps to the first
    /// bucket it fits in; an empty list builds for exact agent bounds.
    pub agent_buckets: Vec<AgentBounds>,
    /// Geometry changes farther than this many tiles from every agent are not scheduled
    pub max_tiles_distance: i32,
    /// Shortest time between two builds of the same tile
    pub min_update_interval: Duration,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            recast: RecastSettings::default(),
            cache: CacheSettings::default(),
            worker_threads: 0,
            preload_radius: 40.0,
            priority_falloff: 10.0,
            agent_buckets: Vec::new(),
            max_tiles_distance: 32,
            min_update_interval: Duration::from_millis(250),
        }
    }
}

impl NavigatorSettings {
    pub fn with_recast(mut self, recast: RecastSettings) -> Self {
        self.recast = recast;
        self
    }

    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.cache.max_tiles = max_tiles;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_preload_radius(mut self, preload_radius: f32) -> Self {
        self.preload_radius = preload_radius;
        self
    }

    pub fn with_priority_falloff(mut self, priority_falloff: f32) -> Self {
        self.priority_falloff = priority_falloff;
        self
    }

    pub fn with_agent_buckets(mut self, agent_buckets: Vec<AgentBounds>) -> Self {
        self.agent_buckets = agent_buckets;
        self
    }

    pub fn with_max_tiles_distance(mut self, max_tiles_distance: i32) -> Self {
        self.max_tiles_distance = max_tiles_distance;
        self
    }

    pub fn with_min_update_interval(mut self, min_update_interval: Duration) -> Self {
        self.min_update_interval = min_update_interval;
        self
    }

    /// Number of build threads to start
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        self.recast.validate()?;
        if !self.preload_radius.is_finite() || self.preload_radius < 0.0 {
            return Err(Error::Configuration(format!(
                "preload radius must not be negative, got {}",
                self.preload_radius
            )));
        }
        if !(self.priority_falloff > 0.0) || !self.priority_falloff.is_finite() {
            return Err(Error::Configuration(format!(
                "priority falloff must be positive, got {}",
                self.priority_falloff
            )));
        }
        if self.max_tiles_distance < 0 {
            return Err(Error::Configuration(format!(
                "max tiles distance must not be negative, got {}",
                self.max_tiles_distance
            )));
        }
        for bucket in &self.agent_buckets {
            RecastConfig::for_tile(&self.recast, bucket, TilePosition::default())?.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(NavigatorSettings::default().validate().is_ok());
        assert!(NavigatorSettings::default().resolved_worker_threads() >= 1);
    }

    #[test]
    fn test_builders() {
        let settings = NavigatorSettings::default()
            .with_max_tiles(4)
            .with_worker_threads(3)
            .with_preload_radius(1.0)
            .with_min_update_interval(Duration::ZERO)
            .with_agent_buckets(vec![AgentBounds::new(0.5, 2.0)]);
        assert_eq!(settings.cache.max_tiles, 4);
        assert_eq!(settings.resolved_worker_threads(), 3);
        assert_eq!(settings.preload_radius, 1.0);
        assert_eq!(settings.agent_buckets.len(), 1);
        assert!(settings.min_update_interval.is_zero());
    }

    #[test]
    fn test_invalid_settings() {
        let cases = [
            NavigatorSettings::default().with_preload_radius(-1.0),
            NavigatorSettings::default().with_priority_falloff(0.0),
            NavigatorSettings::default().with_max_tiles_distance(-2),
            NavigatorSettings::default().with_agent_buckets(vec![AgentBounds::new(0.5, 0.1)]),
            NavigatorSettings::default()
                .with_recast(RecastSettings::default().with_cell_size(0.0)),
        ];
        for settings in cases {
            assert!(
                matches!(settings.validate(), Err(Error::Configuration(_))),
                "{:?}",
                settings
            );
        }
    }
}
