//! Build settings and the per-tile voxel configuration derived from them

use glam::Vec3;
use navmesh_common::{AgentBounds, Error, Result, TilePosition};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Largest polygon the mesh builder will produce
pub const MAX_VERTS_PER_POLY: usize = 6;

/// World-independent build settings shared by every tile
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct RecastSettings {
    /// The width/depth resolution of the voxel grid (cell size)
    pub cell_size: f32,
    /// The height resolution of the voxel grid (cell height)
    pub cell_height: f32,
    /// The maximum slope in degrees that is considered walkable
    pub max_slope: f32,
    /// The maximum ledge height an agent can step up, in world units
    pub max_climb: f32,
    /// Tile edge length in cells
    pub tile_size: i32,
    /// Cells of padding added around each tile beyond the agent radius
    pub border_padding: i32,
    /// The maximum length of contour edges along walls, in cells (0 disables)
    pub max_edge_len: i32,
    /// The maximum distance a simplified contour may deviate from the raw contour, in cells
    pub max_simplification_error: f32,
    /// Connected walkable islands smaller than this many cells are discarded
    pub min_region_area: i32,
    /// The maximum number of vertices per navmesh polygon
    pub max_verts_per_poly: usize,
}

impl Default for RecastSettings {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            max_slope: 45.0,
            max_climb: 0.9,
            tile_size: 64,
            border_padding: 3,
            max_edge_len: 12,
            max_simplification_error: 1.3,
            min_region_area: 8,
            max_verts_per_poly: MAX_VERTS_PER_POLY,
        }
    }
}

impl RecastSettings {
    /// Edge length of a tile in world units
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }

    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_cell_height(mut self, cell_height: f32) -> Self {
        self.cell_height = cell_height;
        self
    }

    pub fn with_max_slope(mut self, max_slope: f32) -> Self {
        self.max_slope = max_slope;
        self
    }

    pub fn with_max_climb(mut self, max_climb: f32) -> Self {
        self.max_climb = max_climb;
        self
    }

    pub fn with_tile_size(mut self, tile_size: i32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_min_region_area(mut self, min_region_area: i32) -> Self {
        self.min_region_area = min_region_area;
        self
    }

    pub fn with_max_verts_per_poly(mut self, max_verts_per_poly: usize) -> Self {
        self.max_verts_per_poly = max_verts_per_poly;
        self
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if !(self.cell_size > 0.0) || !self.cell_size.is_finite() {
            return Err(Error::Configuration(format!(
                "cell size must be positive, got {}",
                self.cell_size
            )));
        }
        if !(self.cell_height > 0.0) || !self.cell_height.is_finite() {
            return Err(Error::Configuration(format!(
                "cell height must be positive, got {}",
                self.cell_height
            )));
        }
        if !(0.0..=90.0).contains(&self.max_slope) {
            return Err(Error::Configuration(format!(
                "max slope must be within [0, 90] degrees, got {}",
                self.max_slope
            )));
        }
        if !(self.max_climb >= 0.0) {
            return Err(Error::Configuration(format!(
                "max climb must not be negative, got {}",
                self.max_climb
            )));
        }
        if self.tile_size <= 0 {
            return Err(Error::Configuration(format!(
                "tile size must be positive, got {}",
                self.tile_size
            )));
        }
        if self.border_padding < 0 || self.max_edge_len < 0 || self.min_region_area < 0 {
            return Err(Error::Configuration(
                "border padding, edge length and region area must not be negative".to_string(),
            ));
        }
        if !(self.max_simplification_error >= 0.0) {
            return Err(Error::Configuration(format!(
                "simplification error must not be negative, got {}",
                self.max_simplification_error
            )));
        }
        if !(3..=MAX_VERTS_PER_POLY).contains(&self.max_verts_per_poly) {
            return Err(Error::Configuration(format!(
                "vertices per polygon must be within [3, {}], got {}",
                MAX_VERTS_PER_POLY, self.max_verts_per_poly
            )));
        }
        Ok(())
    }
}

/// Voxel-space configuration for building one tile for one agent
#[derive(Debug, Clone)]
pub struct RecastConfig {
    /// The width of the field along the x-axis, border included
    pub width: i32,
    /// The height of the field along the z-axis, border included
    pub height: i32,

    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,

    /// The minimum bounds of the field's AABB, border included
    pub bmin: Vec3,
    /// The maximum bounds of the field's AABB, border included
    pub bmax: Vec3,

    pub walkable_slope_angle: f32,
    /// Minimum floor to ceiling clearance, in cells
    pub walkable_height: i32,
    /// Maximum ledge height that is still traversable, in cells
    pub walkable_climb: i32,
    /// Erosion distance from obstacles, in cells
    pub walkable_radius: i32,

    pub max_edge_len: i32,
    pub max_simplification_error: f32,
    pub min_region_area: i32,
    pub max_verts_per_poly: usize,

    /// Cells of padding around the tile that are voxelized but not meshed
    pub border_size: i32,
}

impl RecastConfig {
    /// Derives the voxel configuration of `tile` for `agent`
    ///
    /// The vertical extent is left at zero; call [`RecastConfig::with_height_range`]
    /// once the input geometry is known.
    pub fn for_tile(
        settings: &RecastSettings,
        agent: &AgentBounds,
        tile: TilePosition,
    ) -> Result<Self> {
        settings.validate()?;
        agent.validate()?;

        let cs = settings.cell_size;
        let ch = settings.cell_height;
        let walkable_radius = (agent.radius / cs).ceil() as i32;
        let border_size = walkable_radius + settings.border_padding;
        let size = settings.tile_size + border_size * 2;

        let origin = tile.world_min(settings.tile_world_size());
        let pad = border_size as f32 * cs;
        let bmin = Vec3::new(origin.x - pad, 0.0, origin.y - pad);
        let bmax = Vec3::new(
            origin.x + settings.tile_world_size() + pad,
            0.0,
            origin.y + settings.tile_world_size() + pad,
        );

        Ok(Self {
            width: size,
            height: size,
            cs,
            ch,
            bmin,
            bmax,
            walkable_slope_angle: settings.max_slope,
            walkable_height: (agent.height / ch).ceil() as i32,
            walkable_climb: (settings.max_climb / ch).floor() as i32,
            walkable_radius,
            max_edge_len: settings.max_edge_len,
            max_simplification_error: settings.max_simplification_error,
            min_region_area: settings.min_region_area,
            max_verts_per_poly: settings.max_verts_per_poly,
            border_size,
        })
    }

    /// Sets the vertical extent of the field
    pub fn with_height_range(mut self, min_y: f32, max_y: f32) -> Self {
        self.bmin.y = min_y;
        self.bmax.y = max_y;
        self
    }

    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::Configuration("invalid grid size".to_string()));
        }
        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(Error::Configuration(
                "invalid cell size or height".to_string(),
            ));
        }
        if self.walkable_height < 3 {
            return Err(Error::Configuration(format!(
                "agent height spans {} cells, at least 3 are required",
                self.walkable_height
            )));
        }
        if self.bmax.y < self.bmin.y {
            return Err(Error::Configuration("inverted height range".to_string()));
        }
        Ok(())
    }
}
