//! Serialized navmesh tile data
//!
//! [`NavMeshTileData`] is the finished product of one tile build: polygon
//! vertices in world space, convex polygons with neighbour links, and the
//! detail triangles used for height queries. Its byte form starts with a
//! `DNAV` header and is what the cache stores as a tile payload.

use glam::Vec3;
use navmesh_codec::{
    check_header, format_fields, serialized_size, write_header, BinaryReader, BinaryWriter,
};
use navmesh_common::{AgentBounds, AreaType, Bounds, Error, PolyFlags, Result, TilePosition};

use crate::config::MAX_VERTS_PER_POLY;
use crate::detail_mesh::PolyMeshDetail;
use crate::polymesh::{PolyMesh, MESH_NULL_IDX};

/// Magic of serialized tile data
pub const TILE_MAGIC: [u8; 4] = *b"DNAV";
/// Version of the serialized tile layout
pub const TILE_VERSION: u32 = 1;

const HEADER_SIZE: usize = 8;

/// Placement and build parameters of a tile
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TileHeader {
    pub position: TilePosition,
    pub agent: AgentBounds,
    /// World bounds of the polygon vertices
    pub bounds: Bounds,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub cs: f32,
    pub ch: f32,
}

format_fields!(TileHeader {
    position,
    agent,
    bounds,
    walkable_height,
    walkable_radius,
    walkable_climb,
    cs,
    ch,
});

/// A convex polygon of the tile
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Poly {
    /// Indices into the tile vertices; only the first `vert_count` are used
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per-edge neighbour polygon, portal side or [`MESH_NULL_IDX`]
    pub neighbors: [u16; MAX_VERTS_PER_POLY],
    pub vert_count: u8,
    pub area: AreaType,
    pub flags: PolyFlags,
}

format_fields!(Poly {
    verts,
    neighbors,
    vert_count,
    area,
    flags,
});

impl Poly {
    pub fn vertices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// Built navmesh tile
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavMeshTileData {
    pub header: TileHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<Poly>,
    /// `[vert_base, vert_count, tri_base, tri_count]` per polygon
    pub detail_meshes: Vec<[u32; 4]>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<[u8; 4]>,
}

format_fields!(NavMeshTileData {
    header,
    verts,
    polys,
    detail_meshes,
    detail_verts,
    detail_tris,
});

impl NavMeshTileData {
    /// Assembles tile data from a polygon mesh and its detail mesh
    ///
    /// Polygon flags left at zero by the caller are derived from the area.
    /// A mesh without polygons is an error.
    pub fn from_meshes(
        mut header: TileHeader,
        mesh: &PolyMesh,
        detail: &PolyMeshDetail,
    ) -> Result<Self> {
        if mesh.poly_count() == 0 {
            return Err(Error::NavMeshGeneration(format!(
                "tile {} produced no polygons",
                header.position
            )));
        }

        let verts: Vec<Vec3> = mesh
            .verts
            .iter()
            .map(|&[x, y, z]| {
                mesh.bmin + Vec3::new(x as f32 * mesh.cs, y as f32 * mesh.ch, z as f32 * mesh.cs)
            })
            .collect();

        let mut polys = Vec::with_capacity(mesh.poly_count());
        for i in 0..mesh.poly_count() {
            let area = AreaType::from_u8(mesh.areas[i]).ok_or_else(|| {
                Error::NavMeshGeneration(format!("unknown area id {}", mesh.areas[i]))
            })?;
            let flags = match PolyFlags::from_bits_truncate(mesh.flags[i]) {
                f if f.is_empty() => area.poly_flags(),
                f => f,
            };
            polys.push(Poly {
                verts: mesh.polys[i],
                neighbors: mesh.neighbors[i],
                vert_count: mesh.poly_verts(i).len() as u8,
                area,
                flags,
            });
        }

        header.bounds = Bounds::from_points(verts.iter().copied()).unwrap_or_default();
        Ok(Self {
            header,
            verts,
            polys,
            detail_meshes: detail.meshes.clone(),
            detail_verts: detail.verts.clone(),
            detail_tris: detail.tris.clone(),
        })
    }

    /// Tile without walkable polygons
    ///
    /// Published when a tile's geometry is gone or nothing in it is
    /// walkable, so readers stop seeing the previous ground.
    pub fn empty(header: TileHeader) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }

    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Number of polygon edges linked to another polygon of this tile
    pub fn internal_link_count(&self) -> usize {
        self.polys
            .iter()
            .flat_map(|p| p.neighbors[..p.vert_count as usize].iter())
            .filter(|&&n| n != MESH_NULL_IDX && n & crate::polymesh::PORTAL_FLAG == 0)
            .count()
    }

    /// Total polygon area projected onto the xz-plane
    pub fn walkable_area(&self) -> f32 {
        self.polys
            .iter()
            .map(|p| {
                let v = p.vertices();
                let mut twice_area = 0.0;
                for k in 0..v.len() {
                    let a = self.verts[v[k] as usize];
                    let b = self.verts[v[(k + 1) % v.len()] as usize];
                    twice_area += a.x * b.z - b.x * a.z;
                }
                twice_area.abs() * 0.5
            })
            .sum()
    }

    /// Encodes the tile with its `DNAV` header
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; HEADER_SIZE + serialized_size(self)];
        let mut writer = BinaryWriter::new(&mut buffer);
        write_header(&mut writer, TILE_MAGIC, TILE_VERSION)?;
        navmesh_codec::Format::encode(self, &mut writer)?;
        Ok(buffer)
    }

    /// Decodes a tile written by [`NavMeshTileData::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(bytes);
        check_header(&mut reader, TILE_MAGIC, TILE_VERSION)?;
        Ok(reader.read()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmesh_common::SerializationError;

    fn sample() -> NavMeshTileData {
        let mut verts = [MESH_NULL_IDX; MAX_VERTS_PER_POLY];
        verts[..4].copy_from_slice(&[0, 1, 2, 3]);
        NavMeshTileData {
            header: TileHeader {
                position: TilePosition::new(2, -1),
                agent: AgentBounds::new(0.5, 2.0),
                bounds: Bounds::new(Vec3::ZERO, Vec3::new(2.0, 0.0, 2.0)),
                walkable_height: 2.0,
                walkable_radius: 0.5,
                walkable_climb: 0.8,
                cs: 0.3,
                ch: 0.2,
            },
            verts: vec![
                Vec3::ZERO,
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::new(2.0, 0.0, 2.0),
                Vec3::new(2.0, 0.0, 0.0),
            ],
            polys: vec![Poly {
                verts,
                neighbors: [MESH_NULL_IDX; MAX_VERTS_PER_POLY],
                vert_count: 4,
                area: AreaType::Ground,
                flags: PolyFlags::WALK,
            }],
            detail_meshes: vec![[0, 4, 0, 2]],
            detail_verts: vec![Vec3::ZERO; 4],
            detail_tris: vec![[0, 1, 2, 5], [0, 2, 3, 20]],
        }
    }

    #[test]
    fn test_bytes_round_trip() -> Result<()> {
        let tile = sample();
        let bytes = tile.to_bytes()?;
        assert_eq!(&bytes[..4], b"DNAV");
        assert_eq!(NavMeshTileData::from_bytes(&bytes)?, tile);
        Ok(())
    }

    #[test]
    fn test_truncated_bytes_are_rejected() -> Result<()> {
        let bytes = sample().to_bytes()?;
        let result = NavMeshTileData::from_bytes(&bytes[..bytes.len() - 3]);
        assert!(matches!(
            result,
            Err(Error::Serialization(SerializationError::InsufficientData { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_magic_is_rejected() -> Result<()> {
        let mut bytes = sample().to_bytes()?;
        bytes[0] = b'X';
        assert!(matches!(
            NavMeshTileData::from_bytes(&bytes),
            Err(Error::Serialization(SerializationError::BadMagic))
        ));
        Ok(())
    }

    #[test]
    fn test_empty_tile_keeps_its_header() -> Result<()> {
        let header = sample().header;
        let tile = NavMeshTileData::empty(header);
        assert!(tile.is_empty());
        assert!(!sample().is_empty());
        assert_eq!(tile.walkable_area(), 0.0);
        let decoded = NavMeshTileData::from_bytes(&tile.to_bytes()?)?;
        assert_eq!(decoded.header.position, TilePosition::new(2, -1));
        assert!(decoded.is_empty());
        Ok(())
    }

    #[test]
    fn test_walkable_area() {
        assert!((sample().walkable_area() - 4.0).abs() < 1e-6);
        assert_eq!(sample().internal_link_count(), 0);
    }
}
