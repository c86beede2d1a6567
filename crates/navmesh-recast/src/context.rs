//! Build context collecting per-stage timings of a tile build

use std::time::Duration;
use web_time::Instant;

/// Stages of the voxel build pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Rasterization,
    Filtering,
    CompactHeightfield,
    Erosion,
    Regions,
    Contours,
    PolyMesh,
    DetailMesh,
    TileData,
}

impl BuildStage {
    pub const ALL: [BuildStage; 9] = [
        BuildStage::Rasterization,
        BuildStage::Filtering,
        BuildStage::CompactHeightfield,
        BuildStage::Erosion,
        BuildStage::Regions,
        BuildStage::Contours,
        BuildStage::PolyMesh,
        BuildStage::DetailMesh,
        BuildStage::TileData,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuildStage::Rasterization => "rasterization",
            BuildStage::Filtering => "filtering",
            BuildStage::CompactHeightfield => "compact heightfield",
            BuildStage::Erosion => "erosion",
            BuildStage::Regions => "regions",
            BuildStage::Contours => "contours",
            BuildStage::PolyMesh => "poly mesh",
            BuildStage::DetailMesh => "detail mesh",
            BuildStage::TileData => "tile data",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Timings and sizes recorded while building one tile
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    stage_times: [Duration; 9],
    pub input_triangles: usize,
    pub spans: usize,
    pub regions: usize,
    pub contours: usize,
    pub polygons: usize,
    pub vertices: usize,
}

impl BuildStats {
    pub fn stage_time(&self, stage: BuildStage) -> Duration {
        self.stage_times[stage.index()]
    }

    pub fn total_time(&self) -> Duration {
        self.stage_times.iter().sum()
    }
}

/// Times pipeline stages of a single build
#[derive(Debug, Default)]
pub struct BuildContext {
    stats: BuildStats,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` and adds its wall-clock time to `stage`
    pub fn timed<T>(&mut self, stage: BuildStage, f: impl FnOnce(&mut BuildStats) -> T) -> T {
        let start = Instant::now();
        let result = f(&mut self.stats);
        self.stats.stage_times[stage.index()] += start.elapsed();
        result
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Logs the stage timings at debug level and returns the collected stats
    pub fn finish(self, label: &str) -> BuildStats {
        if log::log_enabled!(log::Level::Debug) {
            let stages: Vec<String> = BuildStage::ALL
                .iter()
                .map(|s| format!("{} {:.2?}", s.name(), self.stats.stage_time(*s)))
                .collect();
            log::debug!(
                "Built {}: {} polygons in {:.2?} ({})",
                label,
                self.stats.polygons,
                self.stats.total_time(),
                stages.join(", ")
            );
        }
        self.stats
    }
}
