//! Per-polygon detail triangles in world space
//!
//! The detail surface of a polygon is a fan over its own vertices, so every
//! detail vertex coincides with a polygon vertex. Triangle edge flags mark
//! the edges that lie on the polygon boundary.

use glam::Vec3;
use navmesh_common::{Error, Result};

use crate::polymesh::PolyMesh;

/// Edge flag value for a detail triangle edge on the polygon boundary
pub const DETAIL_EDGE_BOUNDARY: u8 = 0x01;

/// Detail meshes of every polygon of a [`PolyMesh`]
#[derive(Debug, Clone, Default)]
pub struct PolyMeshDetail {
    /// `[vert_base, vert_count, tri_base, tri_count]` per polygon
    pub meshes: Vec<[u32; 4]>,
    pub verts: Vec<Vec3>,
    /// Local vertex indices plus packed edge flags, two bits per edge
    pub tris: Vec<[u8; 4]>,
}

impl PolyMeshDetail {
    pub fn build(mesh: &PolyMesh) -> Result<Self> {
        let mut detail = Self::default();
        for i in 0..mesh.poly_count() {
            let poly = mesh.poly_verts(i);
            let n = poly.len();
            if n < 3 {
                return Err(Error::NavMeshGeneration(format!(
                    "polygon {} has only {} vertices",
                    i, n
                )));
            }

            let vert_base = detail.verts.len() as u32;
            let tri_base = detail.tris.len() as u32;
            detail.verts.extend(poly.iter().map(|&v| {
                let [x, y, z] = mesh.verts[v as usize];
                mesh.bmin
                    + Vec3::new(
                        x as f32 * mesh.cs,
                        y as f32 * mesh.ch,
                        z as f32 * mesh.cs,
                    )
            }));
            for k in 1..n - 1 {
                detail.tris.push([0, k as u8, (k + 1) as u8, fan_edge_flags(k, n)]);
            }
            detail
                .meshes
                .push([vert_base, n as u32, tri_base, (n - 2) as u32]);
        }
        Ok(detail)
    }
}

/// Edge flags of fan triangle `(0, k, k + 1)` in a polygon of `n` vertices
fn fan_edge_flags(k: usize, n: usize) -> u8 {
    let mut flags = DETAIL_EDGE_BOUNDARY << 2;
    if k == 1 {
        flags |= DETAIL_EDGE_BOUNDARY;
    }
    if k + 1 == n - 1 {
        flags |= DETAIL_EDGE_BOUNDARY << 4;
    }
    flags
}
