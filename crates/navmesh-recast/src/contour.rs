//! Region contour tracing and simplification
//!
//! Each region's outline is traced along the span edges, then reduced to a
//! simplified polygon whose vertices stay within `max_error` of the raw
//! outline. Vertices are `[x, y, z, flags]` in cell units.

use glam::Vec3;
use navmesh_common::Result;

use crate::compact_heightfield::{CompactHeightfield, DIR_OFFSET_X, DIR_OFFSET_Z};
use crate::regions::BORDER_REG;

/// Vertex flag: the vertex sits on the tile border and must not be removed
pub const BORDER_VERTEX: i32 = 0x10000;
/// Vertex flag: the edge separates two different area types
pub const AREA_BORDER: i32 = 0x20000;
/// Mask extracting the neighbour region id from vertex flags
pub const CONTOUR_REG_MASK: i32 = 0xffff;

const MAX_WALK_ITERATIONS: usize = 40000;

/// The outline of one region
#[derive(Debug, Clone)]
pub struct Contour {
    /// Simplified vertices
    pub verts: Vec<[i32; 4]>,
    /// Vertices as traced, before simplification
    pub raw_verts: Vec<[i32; 4]>,
    pub reg: u16,
    pub area: u8,
}

/// Contours of every meshable region of a tile
#[derive(Debug, Clone)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    /// Bounds with the border removed
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    /// Width of the field with the border removed
    pub width: i32,
    pub height: i32,
    pub border_size: i32,
    pub max_error: f32,
}

impl ContourSet {
    /// Traces and simplifies the contours of all regions of `chf`
    ///
    /// Wall edges longer than `max_edge_len` cells are split (0 disables).
    pub fn build(chf: &CompactHeightfield, max_error: f32, max_edge_len: i32) -> Result<Self> {
        let border_size = chf.border_size;
        let pad = border_size as f32 * chf.cs;
        let mut cset = Self {
            contours: Vec::new(),
            bmin: chf.bmin + Vec3::new(pad, 0.0, pad),
            bmax: chf.bmax - Vec3::new(pad, 0.0, pad),
            cs: chf.cs,
            ch: chf.ch,
            width: chf.width - border_size * 2,
            height: chf.height - border_size * 2,
            border_size,
            max_error,
        };

        let mut flags = boundary_flags(chf);

        for z in 0..chf.height {
            for x in 0..chf.width {
                let cell = chf.cell(x, z);
                for i in cell.index..cell.index + cell.count {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & BORDER_REG != 0 {
                        continue;
                    }

                    let mut raw = walk_contour(chf, x, z, i, &mut flags);
                    let mut verts = simplify_contour(&raw, max_error, max_edge_len);
                    remove_degenerate_segments(&mut verts);
                    if verts.len() < 3 {
                        continue;
                    }

                    if border_size > 0 {
                        for v in verts.iter_mut().chain(raw.iter_mut()) {
                            v[0] -= border_size;
                            v[2] -= border_size;
                        }
                    }
                    cset.contours.push(Contour {
                        verts,
                        raw_verts: raw,
                        reg,
                        area: chf.areas[i],
                    });
                }
            }
        }

        Ok(cset)
    }
}

/// Per-span bit mask of the directions whose neighbour is in another region
fn boundary_flags(chf: &CompactHeightfield) -> Vec<u8> {
    let mut flags = vec![0u8; chf.span_count()];
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, z);
            for i in cell.index..cell.index + cell.count {
                let reg = chf.spans[i].reg;
                if reg == 0 || reg & BORDER_REG != 0 {
                    continue;
                }
                let mut same = 0u8;
                for dir in 0..4 {
                    let neighbor_reg = chf
                        .neighbor(x, z, i, dir)
                        .map_or(0, |(_, _, ni)| chf.spans[ni].reg);
                    if neighbor_reg == reg {
                        same |= 1 << dir;
                    }
                }
                flags[i] = same ^ 0xf;
            }
        }
    }
    flags
}

/// Height of the corner shared by span `i` and its neighbours in `dir` and
/// the next direction clockwise, plus whether that corner lies where two
/// border regions meet the interior
fn corner_height(chf: &CompactHeightfield, x: i32, z: i32, i: usize, dir: usize) -> (i32, bool) {
    let span = chf.spans[i];
    let dirp = (dir + 1) & 3;
    let tag = |j: usize| chf.spans[j].reg as u32 | (chf.areas[j] as u32) << 16;

    let mut height = span.y as i32;
    let mut regs = [0u32; 4];
    regs[0] = tag(i);

    if let Some((ax, az, ai)) = chf.neighbor(x, z, i, dir) {
        height = height.max(chf.spans[ai].y as i32);
        regs[1] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbor(ax, az, ai, dirp) {
            height = height.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }
    if let Some((ax, az, ai)) = chf.neighbor(x, z, i, dirp) {
        height = height.max(chf.spans[ai].y as i32);
        regs[3] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbor(ax, az, ai, dir) {
            height = height.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }

    let border = BORDER_REG as u32;
    let is_border_vertex = (0..4).any(|j| {
        let a = regs[j];
        let b = regs[(j + 1) & 3];
        let c = regs[(j + 2) & 3];
        let d = regs[(j + 3) & 3];
        let two_same_exteriors = (a & b & border) != 0 && a == b;
        let two_interiors = ((c | d) & border) == 0;
        let interiors_same_area = (c >> 16) == (d >> 16);
        let no_zeros = a != 0 && b != 0 && c != 0 && d != 0;
        two_same_exteriors && two_interiors && interiors_same_area && no_zeros
    });

    (height, is_border_vertex)
}

/// Traces the outline starting at span `i`, clearing visited edge flags
fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut z: i32,
    mut i: usize,
    flags: &mut [u8],
) -> Vec<[i32; 4]> {
    let mut dir = 0;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let start_i = i;
    let area = chf.areas[i];
    let mut points = Vec::new();

    for _ in 0..MAX_WALK_ITERATIONS {
        if flags[i] & (1 << dir) != 0 {
            let (py, is_border_vertex) = corner_height(chf, x, z, i, dir);
            let (px, pz) = match dir {
                0 => (x, z + 1),
                1 => (x + 1, z + 1),
                2 => (x + 1, z),
                _ => (x, z),
            };
            let mut r = 0;
            if let Some((_, _, ai)) = chf.neighbor(x, z, i, dir) {
                r = chf.spans[ai].reg as i32;
                if chf.areas[ai] != area {
                    r |= AREA_BORDER;
                }
            }
            if is_border_vertex {
                r |= BORDER_VERTEX;
            }
            points.push([px, py, pz, r]);
            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 3;
        } else {
            let Some(layer) = chf.spans[i].connection(dir) else {
                log::warn!("Contour walk left the field at ({}, {})", x, z);
                return points;
            };
            x += DIR_OFFSET_X[dir];
            z += DIR_OFFSET_Z[dir];
            i = chf.cell(x, z).index + layer;
            dir = (dir + 3) & 3;
        }
        if start_i == i && start_dir == dir {
            break;
        }
    }
    points
}

/// Squared distance from `(x, z)` to the segment `p..q`
fn distance_pt_seg(x: i32, z: i32, px: i32, pz: i32, qx: i32, qz: i32) -> f32 {
    let pqx = (qx - px) as f32;
    let pqz = (qz - pz) as f32;
    let dx = (x - px) as f32;
    let dz = (z - pz) as f32;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = px as f32 + t * pqx - x as f32;
    let dz = pz as f32 + t * pqz - z as f32;
    dx * dx + dz * dz
}

/// Reduces a raw outline to the vertices needed to stay within `max_error`
///
/// The fourth component of each output vertex is replaced by the flags of
/// the edge that starts at it.
fn simplify_contour(points: &[[i32; 4]], max_error: f32, max_edge_len: i32) -> Vec<[i32; 4]> {
    let pn = points.len();
    if pn == 0 {
        return Vec::new();
    }
    let mut simplified: Vec<[i32; 4]> = Vec::new();

    let has_connections = points.iter().any(|p| p[3] & CONTOUR_REG_MASK != 0);
    if has_connections {
        // Keep every point where the neighbouring region or area changes.
        for (idx, p) in points.iter().enumerate() {
            let next = points[(idx + 1) % pn];
            let different_regs = (p[3] & CONTOUR_REG_MASK) != (next[3] & CONTOUR_REG_MASK);
            let area_borders = (p[3] & AREA_BORDER) != (next[3] & AREA_BORDER);
            if different_regs || area_borders {
                simplified.push([p[0], p[1], p[2], idx as i32]);
            }
        }
    }

    if simplified.is_empty() {
        // Seed with the lower-left and upper-right corners.
        let mut ll = 0;
        let mut ur = 0;
        for (idx, p) in points.iter().enumerate() {
            let l = points[ll];
            if p[0] < l[0] || (p[0] == l[0] && p[2] < l[2]) {
                ll = idx;
            }
            let u = points[ur];
            if p[0] > u[0] || (p[0] == u[0] && p[2] > u[2]) {
                ur = idx;
            }
        }
        let (l, u) = (points[ll], points[ur]);
        simplified.push([l[0], l[1], l[2], ll as i32]);
        simplified.push([u[0], u[1], u[2], ur as i32]);
    }

    // Add the farthest raw point of each segment until the error is small.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();
        let [mut ax, _, mut az, ai] = simplified[i];
        let [mut bx, _, mut bz, bi] = simplified[ii];
        let (ai, bi) = (ai as usize, bi as usize);

        let (mut ci, cinc, endi) = if bx > ax || (bx == ax && bz > az) {
            ((ai + 1) % pn, 1, bi)
        } else {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut az, &mut bz);
            ((bi + pn - 1) % pn, pn - 1, ai)
        };

        let mut max_d = 0.0;
        let mut max_i = None;
        // Only outer walls and area borders are refined.
        if points[ci][3] & CONTOUR_REG_MASK == 0 || points[ci][3] & AREA_BORDER != 0 {
            while ci != endi {
                let d = distance_pt_seg(points[ci][0], points[ci][2], ax, az, bx, bz);
                if d > max_d {
                    max_d = d;
                    max_i = Some(ci);
                }
                ci = (ci + cinc) % pn;
            }
        }

        match max_i {
            Some(m) if max_d > max_error_sq => {
                let p = points[m];
                simplified.insert(i + 1, [p[0], p[1], p[2], m as i32]);
            }
            _ => i += 1,
        }
    }

    // Split long wall and area-border edges.
    if max_edge_len > 0 {
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let [ax, _, az, ai] = simplified[i];
            let [bx, _, bz, bi] = simplified[ii];
            let (ai, bi) = (ai as usize, bi as usize);

            let ci = (ai + 1) % pn;
            let tessellate =
                points[ci][3] & CONTOUR_REG_MASK == 0 || points[ci][3] & AREA_BORDER != 0;

            let mut max_i = None;
            if tessellate {
                let dx = bx - ax;
                let dz = bz - az;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        max_i = Some(if bx > ax || (bx == ax && bz > az) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            match max_i {
                Some(m) => {
                    let p = points[m];
                    simplified.insert(i + 1, [p[0], p[1], p[2], m as i32]);
                }
                None => i += 1,
            }
        }
    }

    for v in &mut simplified {
        let ai = (v[3] as usize + 1) % pn;
        let bi = v[3] as usize;
        v[3] = (points[ai][3] & (CONTOUR_REG_MASK | AREA_BORDER)) | (points[bi][3] & BORDER_VERTEX);
    }
    simplified
}

/// Drops consecutive vertices that coincide in the xz-plane
fn remove_degenerate_segments(verts: &mut Vec<[i32; 4]>) {
    let mut i = 0;
    while i < verts.len() && verts.len() > 1 {
        let ni = (i + 1) % verts.len();
        if verts[i][0] == verts[ni][0] && verts[i][2] == verts[ni][2] {
            verts.remove(i);
        } else {
            i += 1;
        }
    }
}
