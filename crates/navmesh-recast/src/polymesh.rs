//! Convex polygon mesh built from region contours
//!
//! Each contour is triangulated by ear clipping, then triangles are greedily
//! merged into convex polygons of at most `nvp` vertices. Shared edges become
//! neighbour links, and edges on the tile boundary become portal edges.

use std::collections::HashMap;

use glam::Vec3;
use navmesh_common::{Error, Result};

use crate::config::MAX_VERTS_PER_POLY;
use crate::contour::{ContourSet, BORDER_VERTEX};

/// Unused vertex or neighbour slot
pub const MESH_NULL_IDX: u16 = 0xffff;
/// Neighbour flag for edges on the tile boundary; the low bits hold the side
pub const PORTAL_FLAG: u16 = 0x8000;

const DIAGONAL_FLAG: u32 = 0x8000_0000;
const INDEX_MASK: u32 = 0x0fff_ffff;

/// Polygon mesh in cell units
#[derive(Debug, Clone)]
pub struct PolyMesh {
    pub verts: Vec<[u16; 3]>,
    /// Vertex indices of each polygon, padded with [`MESH_NULL_IDX`]
    pub polys: Vec<[u16; MAX_VERTS_PER_POLY]>,
    /// Per-edge neighbour polygon, portal side or [`MESH_NULL_IDX`]
    pub neighbors: Vec<[u16; MAX_VERTS_PER_POLY]>,
    pub regs: Vec<u16>,
    pub areas: Vec<u8>,
    pub flags: Vec<u16>,
    /// Vertices that lie on the tile border
    pub border_verts: Vec<bool>,
    pub nvp: usize,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
    pub max_edge_error: f32,
}

impl PolyMesh {
    /// Builds the polygon mesh of every contour in `cset`
    pub fn build(cset: &ContourSet, nvp: usize) -> Result<Self> {
        if !(3..=MAX_VERTS_PER_POLY).contains(&nvp) {
            return Err(Error::Configuration(format!(
                "vertices per polygon must be within [3, {}], got {}",
                MAX_VERTS_PER_POLY, nvp
            )));
        }

        let mut mesh = Self {
            verts: Vec::new(),
            polys: Vec::new(),
            neighbors: Vec::new(),
            regs: Vec::new(),
            areas: Vec::new(),
            flags: Vec::new(),
            border_verts: Vec::new(),
            nvp,
            bmin: cset.bmin,
            bmax: cset.bmax,
            cs: cset.cs,
            ch: cset.ch,
            border_size: cset.border_size,
            max_edge_error: cset.max_error,
        };
        let mut vertex_lookup: HashMap<(u16, u16), Vec<u16>> = HashMap::new();

        for contour in &cset.contours {
            let n = contour.verts.len();
            if n < 3 {
                continue;
            }

            let mut indices: Vec<u32> = (0..n as u32).collect();
            let (tris, complete) = triangulate(&contour.verts, &mut indices);
            if !complete {
                log::warn!(
                    "Bad triangulation of contour for region {}, kept {} triangles",
                    contour.reg,
                    tris.len()
                );
            }

            let mut mesh_index = Vec::with_capacity(n);
            for v in &contour.verts {
                let index = mesh.add_vertex(&mut vertex_lookup, v[0], v[1], v[2])?;
                if v[3] & BORDER_VERTEX != 0 {
                    mesh.border_verts[index as usize] = true;
                }
                mesh_index.push(index);
            }

            let mut polys: Vec<Vec<u16>> = tris
                .iter()
                .filter(|t| t[0] != t[1] && t[0] != t[2] && t[1] != t[2])
                .map(|t| t.iter().map(|&k| mesh_index[k]).collect())
                .collect();
            if polys.is_empty() {
                continue;
            }

            if nvp > 3 {
                merge_polygons(&mut polys, &mesh.verts, nvp);
            }

            for poly in polys {
                let mut slots = [MESH_NULL_IDX; MAX_VERTS_PER_POLY];
                slots[..poly.len()].copy_from_slice(&poly);
                mesh.polys.push(slots);
                mesh.neighbors.push([MESH_NULL_IDX; MAX_VERTS_PER_POLY]);
                mesh.regs.push(contour.reg);
                mesh.areas.push(contour.area);
                mesh.flags.push(0);
            }
            if mesh.polys.len() > MESH_NULL_IDX as usize - 1 {
                return Err(Error::NavMeshGeneration(format!(
                    "too many polygons: {}",
                    mesh.polys.len()
                )));
            }
        }

        mesh.build_adjacency();
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(cset.width, cset.height);
        }
        Ok(mesh)
    }

    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Vertex indices of polygon `i` without padding
    pub fn poly_verts(&self, i: usize) -> &[u16] {
        let poly = &self.polys[i];
        let n = poly.iter().take_while(|&&v| v != MESH_NULL_IDX).count();
        &poly[..n]
    }

    fn add_vertex(
        &mut self,
        lookup: &mut HashMap<(u16, u16), Vec<u16>>,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<u16> {
        let (x, y, z) = (
            x.clamp(0, 0xffff) as u16,
            y.clamp(0, 0xffff) as u16,
            z.clamp(0, 0xffff) as u16,
        );
        let bucket = lookup.entry((x, z)).or_default();
        if let Some(&existing) = bucket
            .iter()
            .find(|&&i| (self.verts[i as usize][1] as i32 - y as i32).abs() <= 2)
        {
            return Ok(existing);
        }
        if self.verts.len() >= MESH_NULL_IDX as usize {
            return Err(Error::NavMeshGeneration(format!(
                "too many vertices: {}",
                self.verts.len()
            )));
        }
        let index = self.verts.len() as u16;
        self.verts.push([x, y, z]);
        self.border_verts.push(false);
        bucket.push(index);
        Ok(index)
    }

    fn build_adjacency(&mut self) {
        struct Edge {
            polys: [usize; 2],
            poly_edges: [usize; 2],
        }

        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_lookup: HashMap<(u16, u16), usize> = HashMap::new();

        for i in 0..self.polys.len() {
            let verts = self.poly_verts(i).to_vec();
            for (j, &v0) in verts.iter().enumerate() {
                let v1 = verts[(j + 1) % verts.len()];
                if v0 < v1 {
                    edge_lookup.insert((v0, v1), edges.len());
                    edges.push(Edge {
                        polys: [i, i],
                        poly_edges: [j, 0],
                    });
                }
            }
        }

        for i in 0..self.polys.len() {
            let verts = self.poly_verts(i).to_vec();
            for (j, &v0) in verts.iter().enumerate() {
                let v1 = verts[(j + 1) % verts.len()];
                if v0 > v1 {
                    if let Some(&e) = edge_lookup.get(&(v1, v0)) {
                        let edge = &mut edges[e];
                        if edge.polys[0] == edge.polys[1] {
                            edge.polys[1] = i;
                            edge.poly_edges[1] = j;
                        }
                    }
                }
            }
        }

        for edge in &edges {
            if edge.polys[0] != edge.polys[1] {
                self.neighbors[edge.polys[0]][edge.poly_edges[0]] = edge.polys[1] as u16;
                self.neighbors[edge.polys[1]][edge.poly_edges[1]] = edge.polys[0] as u16;
            }
        }
    }

    /// Flags open edges lying on the tile boundary with the side they face
    fn mark_portal_edges(&mut self, width: i32, height: i32) {
        let (w, h) = (width as u16, height as u16);
        for i in 0..self.polys.len() {
            let verts = self.poly_verts(i).to_vec();
            for (j, &a) in verts.iter().enumerate() {
                if self.neighbors[i][j] != MESH_NULL_IDX {
                    continue;
                }
                let va = self.verts[a as usize];
                let vb = self.verts[verts[(j + 1) % verts.len()] as usize];
                let side = if va[0] == 0 && vb[0] == 0 {
                    Some(0)
                } else if va[2] == h && vb[2] == h {
                    Some(1)
                } else if va[0] == w && vb[0] == w {
                    Some(2)
                } else if va[2] == 0 && vb[2] == 0 {
                    Some(3)
                } else {
                    None
                };
                if let Some(side) = side {
                    self.neighbors[i][j] = PORTAL_FLAG | side;
                }
            }
        }
    }
}

fn prev(i: usize, n: usize) -> usize {
    if i >= 1 {
        i - 1
    } else {
        n - 1
    }
}

fn next(i: usize, n: usize) -> usize {
    if i + 1 < n {
        i + 1
    } else {
        0
    }
}

fn area2(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> i32 {
    (b[0] - a[0]) * (c[2] - a[2]) - (c[0] - a[0]) * (b[2] - a[2])
}

fn left(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) < 0
}

fn left_on(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) <= 0
}

fn collinear(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) == 0
}

fn vequal(a: &[i32; 4], b: &[i32; 4]) -> bool {
    a[0] == b[0] && a[2] == b[2]
}

/// Proper intersection of `ab` and `cd`, excluding touching endpoints
fn intersect_prop(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4], d: &[i32; 4]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) != left(a, b, d)) && (left(c, d, a) != left(c, d, b))
}

/// Whether `c` lies on the closed segment `ab`
fn between(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[2] <= c[2] && c[2] <= b[2]) || (a[2] >= c[2] && c[2] >= b[2])
    }
}

fn intersect(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4], d: &[i32; 4]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

fn vert<'a>(verts: &'a [[i32; 4]], indices: &[u32], i: usize) -> &'a [i32; 4] {
    &verts[(indices[i] & INDEX_MASK) as usize]
}

/// Whether the diagonal `ij` crosses no polygon edge
fn diagonalie(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32], loose: bool) -> bool {
    let n = indices.len();
    let d0 = vert(verts, indices, i);
    let d1 = vert(verts, indices, j);
    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vert(verts, indices, k);
        let p1 = vert(verts, indices, k1);
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        let crosses = if loose {
            intersect_prop(d0, d1, p0, p1)
        } else {
            intersect(d0, d1, p0, p1)
        };
        if crosses {
            return false;
        }
    }
    true
}

/// Whether the diagonal `ij` starts inside the polygon's cone at `i`
fn in_cone(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32], loose: bool) -> bool {
    let n = indices.len();
    let pi = vert(verts, indices, i);
    let pj = vert(verts, indices, j);
    let pi1 = vert(verts, indices, next(i, n));
    let pin1 = vert(verts, indices, prev(i, n));

    if left_on(pin1, pi, pi1) {
        if loose {
            return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
        }
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn diagonal(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    in_cone(i, j, verts, indices, false) && diagonalie(i, j, verts, indices, false)
}

fn diagonal_loose(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    in_cone(i, j, verts, indices, true) && diagonalie(i, j, verts, indices, true)
}

/// Ear-clips the polygon `indices` into triangles of contour vertex indices
///
/// Returns `false` as the second value when the outline could not be fully
/// triangulated; the triangles found so far are still returned.
fn triangulate(verts: &[[i32; 4]], indices: &mut Vec<u32>) -> (Vec<[usize; 3]>, bool) {
    let mut tris = Vec::with_capacity(indices.len().saturating_sub(2));

    let n = indices.len();
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, verts, indices) {
            indices[i1] |= DIAGONAL_FLAG;
        }
    }

    while indices.len() > 3 {
        let n = indices.len();
        let ear_length = |i: usize, far: usize| {
            let p0 = vert(verts, indices, i);
            let p2 = vert(verts, indices, far);
            let dx = p2[0] - p0[0];
            let dz = p2[2] - p0[2];
            dx * dx + dz * dz
        };

        let mut best: Option<(i32, usize)> = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1] & DIAGONAL_FLAG != 0 {
                let len = ear_length(i, next(i1, n));
                if best.map_or(true, |(min, _)| len < min) {
                    best = Some((len, i));
                }
            }
        }

        if best.is_none() {
            // Fall back to a looser test that accepts overlapping segments.
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, verts, indices) {
                    let len = ear_length(i, next(i2, n));
                    if best.map_or(true, |(min, _)| len < min) {
                        best = Some((len, i));
                    }
                }
            }
        }

        let Some((_, i)) = best else {
            return (tris, false);
        };

        let mut i1 = next(i, n);
        let i2 = next(i1, n);
        tris.push([
            (indices[i] & INDEX_MASK) as usize,
            (indices[i1] & INDEX_MASK) as usize,
            (indices[i2] & INDEX_MASK) as usize,
        ]);

        indices.remove(i1);
        let n = indices.len();
        if i1 >= n {
            i1 = 0;
        }
        let i = prev(i1, n);

        if diagonal(prev(i, n), i1, verts, indices) {
            indices[i] |= DIAGONAL_FLAG;
        } else {
            indices[i] &= INDEX_MASK;
        }
        if diagonal(i, next(i1, n), verts, indices) {
            indices[i1] |= DIAGONAL_FLAG;
        } else {
            indices[i1] &= INDEX_MASK;
        }
    }

    if indices.len() == 3 {
        tris.push([
            (indices[0] & INDEX_MASK) as usize,
            (indices[1] & INDEX_MASK) as usize,
            (indices[2] & INDEX_MASK) as usize,
        ]);
    }
    (tris, true)
}

fn uleft(a: [u16; 3], b: [u16; 3], c: [u16; 3]) -> bool {
    let (ax, az) = (a[0] as i32, a[2] as i32);
    (b[0] as i32 - ax) * (c[2] as i32 - az) - (c[0] as i32 - ax) * (b[2] as i32 - az) < 0
}

/// Squared length of the edge shared by `pa` and `pb` when merging them
/// keeps the result convex and within `nvp` vertices
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    verts: &[[u16; 3]],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    if na + nb - 2 > nvp {
        return None;
    }

    let ordered = |a: u16, b: u16| if a > b { (b, a) } else { (a, b) };
    let (ea, eb) = (0..na).find_map(|i| {
        let edge_a = ordered(pa[i], pa[(i + 1) % na]);
        (0..nb)
            .find(|&j| ordered(pb[j], pb[(j + 1) % nb]) == edge_a)
            .map(|j| (i, j))
    })?;

    let v = |i: u16| verts[i as usize];
    if !uleft(v(pa[(ea + na - 1) % na]), v(pa[ea]), v(pb[(eb + 2) % nb])) {
        return None;
    }
    if !uleft(v(pb[(eb + nb - 1) % nb]), v(pb[eb]), v(pa[(ea + 2) % na])) {
        return None;
    }

    let a = v(pa[ea]);
    let b = v(pa[(ea + 1) % na]);
    let dx = a[0] as i32 - b[0] as i32;
    let dz = a[2] as i32 - b[2] as i32;
    Some((dx * dx + dz * dz, ea, eb))
}

/// Repeatedly merges the pair of polygons sharing the longest edge
fn merge_polygons(polys: &mut Vec<Vec<u16>>, verts: &[[u16; 3]], nvp: usize) {
    loop {
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polys.len() {
            for k in j + 1..polys.len() {
                if let Some((value, ea, eb)) = poly_merge_value(&polys[j], &polys[k], verts, nvp) {
                    if best.map_or(true, |b| value > b.0) {
                        best = Some((value, j, k, ea, eb));
                    }
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        let a = &polys[pa];
        let b = &polys[pb];
        let (na, nb) = (a.len(), b.len());
        let merged: Vec<u16> = (0..na - 1)
            .map(|i| a[(ea + 1 + i) % na])
            .chain((0..nb - 1).map(|i| b[(eb + 1 + i) % nb]))
            .collect();
        polys[pa] = merged;
        polys.swap_remove(pb);
    }
}
