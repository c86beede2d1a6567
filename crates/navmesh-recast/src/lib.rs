//! Voxel navmesh tile builder
//!
//! Builds the navmesh of one tile for one agent shape from a snapshot of
//! input triangles. The pipeline rasterizes the triangles into a heightfield,
//! filters and compacts it, erodes by the agent radius, partitions the
//! walkable surface into regions, traces and simplifies region contours,
//! turns them into convex polygons with detail triangles and finally packs
//! everything into [`NavMeshTileData`].
//!
//! [`TileBuilder::build_tile`] is stateless apart from its settings and can be
//! called from several threads at once.

mod compact_heightfield;
mod config;
mod context;
mod contour;
mod detail_mesh;
mod heightfield;
mod input;
mod polymesh;
mod rasterization;
mod regions;
mod tile_data;

pub use compact_heightfield::{
    CompactCell, CompactHeightfield, CompactSpan, DIR_OFFSET_X, DIR_OFFSET_Z, NOT_CONNECTED,
};
pub use config::{RecastConfig, RecastSettings, MAX_VERTS_PER_POLY};
pub use context::{BuildContext, BuildStage, BuildStats};
pub use contour::{Contour, ContourSet, AREA_BORDER, BORDER_VERTEX, CONTOUR_REG_MASK};
pub use detail_mesh::{PolyMeshDetail, DETAIL_EDGE_BOUNDARY};
pub use heightfield::{Heightfield, Span, MAX_SPAN_HEIGHT, NULL_AREA};
pub use input::InputGeometry;
pub use polymesh::{PolyMesh, MESH_NULL_IDX, PORTAL_FLAG};
pub use rasterization::{classify_triangles, rasterize_triangle, rasterize_triangles};
pub use regions::{build_regions_monotone, BORDER_REG};
pub use tile_data::{NavMeshTileData, Poly, TileHeader, TILE_MAGIC, TILE_VERSION};

use navmesh_common::{AgentBounds, AreaType, Error, Result, TilePosition};

/// Output of a successful tile build
#[derive(Debug, Clone)]
pub struct BuiltTile {
    pub data: NavMeshTileData,
    pub stats: BuildStats,
}

/// Builds navmesh tiles with fixed settings
#[derive(Debug, Clone)]
pub struct TileBuilder {
    settings: RecastSettings,
}

impl TileBuilder {
    /// Creates a builder, rejecting invalid settings
    pub fn new(settings: RecastSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &RecastSettings {
        &self.settings
    }

    /// Builds the navmesh of `tile` for `agent` from `geometry`
    ///
    /// A tile without input triangles or without any walkable polygon builds
    /// to an empty tile. Fails with `InvalidGeometry` for malformed input and
    /// with `NavMeshGeneration` when the voxel pipeline overflows.
    pub fn build_tile(
        &self,
        geometry: &InputGeometry,
        tile: TilePosition,
        agent: &AgentBounds,
    ) -> Result<BuiltTile> {
        geometry.validate()?;
        let header = TileHeader {
            position: tile,
            agent: *agent,
            bounds: Default::default(),
            walkable_height: agent.height,
            walkable_radius: agent.radius,
            walkable_climb: self.settings.max_climb,
            cs: self.settings.cell_size,
            ch: self.settings.cell_height,
        };
        let Some(bounds) = geometry.bounds() else {
            log::debug!("Tile {} has no input triangles", tile);
            return Ok(BuiltTile {
                data: NavMeshTileData::empty(header),
                stats: BuildStats::default(),
            });
        };

        let config = RecastConfig::for_tile(&self.settings, agent, tile)?
            .with_height_range(bounds.min.y, bounds.max.y);
        config.validate()?;

        let mut ctx = BuildContext::new();
        let mut hf = Heightfield::new(
            config.width,
            config.height,
            config.bmin,
            config.bmax,
            config.cs,
            config.ch,
        );
        ctx.timed(BuildStage::Rasterization, |stats| {
            stats.input_triangles = geometry.triangle_count();
            let areas = classify_triangles(geometry, config.walkable_slope_angle);
            rasterize_triangles(&mut hf, geometry, &areas, config.walkable_climb)?;
            stats.spans = hf.span_count();
            Ok::<_, Error>(())
        })?;

        ctx.timed(BuildStage::Filtering, |_| {
            hf.filter_low_hanging_walkable_obstacles(config.walkable_climb);
            hf.filter_ledge_spans(config.walkable_height, config.walkable_climb);
            hf.filter_walkable_low_height_spans(config.walkable_height);
        });

        let mut chf = ctx.timed(BuildStage::CompactHeightfield, |_| {
            CompactHeightfield::build(&hf, config.walkable_height, config.walkable_climb)
        })?;
        drop(hf);

        ctx.timed(BuildStage::Erosion, |_| {
            chf.erode_walkable_area(config.walkable_radius)
        });

        ctx.timed(BuildStage::Regions, |stats| {
            stats.regions =
                build_regions_monotone(&mut chf, config.border_size, config.min_region_area)?;
            Ok::<_, Error>(())
        })?;

        let cset = ctx.timed(BuildStage::Contours, |stats| {
            let cset = ContourSet::build(
                &chf,
                config.max_simplification_error,
                config.max_edge_len,
            )?;
            stats.contours = cset.contours.len();
            Ok::<_, Error>(cset)
        })?;

        let mesh = ctx.timed(BuildStage::PolyMesh, |stats| {
            let mut mesh = PolyMesh::build(&cset, config.max_verts_per_poly)?;
            for (flags, &area) in mesh.flags.iter_mut().zip(&mesh.areas) {
                *flags = AreaType::from_u8(area).map_or(0, |a| a.poly_flags().bits());
            }
            stats.polygons = mesh.poly_count();
            stats.vertices = mesh.verts.len();
            Ok::<_, Error>(mesh)
        })?;

        if mesh.poly_count() == 0 {
            let stats = ctx.finish(&format!("tile {} (empty)", tile));
            return Ok(BuiltTile {
                data: NavMeshTileData::empty(header),
                stats,
            });
        }

        let detail = ctx.timed(BuildStage::DetailMesh, |_| PolyMeshDetail::build(&mesh))?;

        let data = ctx.timed(BuildStage::TileData, |_| {
            NavMeshTileData::from_meshes(header, &mesh, &detail)
        })?;

        let stats = ctx.finish(&format!("tile {}", tile));
        Ok(BuiltTile { data, stats })
    }
}
