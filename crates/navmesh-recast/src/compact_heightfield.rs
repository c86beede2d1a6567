//! Compact heightfield representation
//!
//! The compact heightfield keeps only the open space above walkable spans and
//! records, for every such span, which span it connects to in each of the four
//! axis-aligned neighbour columns.

use glam::Vec3;
use navmesh_common::{Error, Result};

use crate::heightfield::{Heightfield, MAX_SPAN_HEIGHT, NULL_AREA};

/// Connection value meaning "no neighbour in this direction"
pub const NOT_CONNECTED: u8 = 0x3f;

/// Offset in x for each direction
pub const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// Offset in z for each direction
pub const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];

/// A column of the compact heightfield
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    /// Index of the first span of the column
    pub index: usize,
    /// Number of spans in the column
    pub count: usize,
}

/// Open space above a walkable span
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    /// Floor of the open space, in cell heights
    pub y: u16,
    /// Height of the open space, capped at 255
    pub h: u8,
    /// Layer index of the connected span in each direction
    pub con: [u8; 4],
    /// Region id, 0 when not assigned
    pub reg: u16,
}

impl CompactSpan {
    /// Layer index of the neighbour in `dir` within its column
    pub fn connection(&self, dir: usize) -> Option<usize> {
        let con = self.con[dir];
        (con != NOT_CONNECTED).then_some(con as usize)
    }
}

/// Walkable spans with neighbour links, areas and region ids
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    pub width: i32,
    pub height: i32,
    pub walkable_height: i32,
    pub walkable_climb: i32,
    pub border_size: i32,
    /// One more than the largest region id in use
    pub max_regions: u16,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub cells: Vec<CompactCell>,
    pub spans: Vec<CompactSpan>,
    pub areas: Vec<u8>,
}

impl CompactHeightfield {
    /// Builds the compact heightfield from the walkable spans of `hf`
    pub fn build(hf: &Heightfield, walkable_height: i32, walkable_climb: i32) -> Result<Self> {
        if hf.width <= 0 || hf.height <= 0 {
            return Err(Error::NavMeshGeneration(format!(
                "empty heightfield ({} x {})",
                hf.width, hf.height
            )));
        }
        let cell_count = (hf.width * hf.height) as usize;
        let walkable = hf.walkable_span_count();

        let mut chf = Self {
            width: hf.width,
            height: hf.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_regions: 0,
            bmin: hf.bmin,
            bmax: hf.bmax + Vec3::new(0.0, walkable_height as f32 * hf.ch, 0.0),
            cs: hf.cs,
            ch: hf.ch,
            cells: vec![CompactCell::default(); cell_count],
            spans: Vec::with_capacity(walkable),
            areas: Vec::with_capacity(walkable),
        };

        for z in 0..hf.height {
            for x in 0..hf.width {
                let column = hf.column(x, z);
                let cell = &mut chf.cells[(x + z * hf.width) as usize];
                cell.index = chf.spans.len();
                for (k, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let bot = span.smax as i32;
                    let top = column
                        .get(k + 1)
                        .map_or(MAX_SPAN_HEIGHT, |next| next.smin as i32);
                    chf.spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        h: (top - bot).clamp(0, 0xff) as u8,
                        con: [NOT_CONNECTED; 4],
                        reg: 0,
                    });
                    chf.areas.push(span.area);
                    cell.count += 1;
                }
            }
        }

        let mut too_many_layers = 0;
        for z in 0..chf.height {
            for x in 0..chf.width {
                let cell = chf.cell(x, z);
                for i in cell.index..cell.index + cell.count {
                    for dir in 0..4 {
                        let nx = x + DIR_OFFSET_X[dir];
                        let nz = z + DIR_OFFSET_Z[dir];
                        if nx < 0 || nz < 0 || nx >= chf.width || nz >= chf.height {
                            continue;
                        }
                        let span = chf.spans[i];
                        let ncell = chf.cell(nx, nz);
                        for k in ncell.index..ncell.index + ncell.count {
                            let ns = chf.spans[k];
                            let bot = span.y.max(ns.y) as i32;
                            let top = (span.y as i32 + span.h as i32)
                                .min(ns.y as i32 + ns.h as i32);
                            if top - bot < walkable_height
                                || (ns.y as i32 - span.y as i32).abs() > walkable_climb
                            {
                                continue;
                            }
                            let layer = k - ncell.index;
                            if layer >= NOT_CONNECTED as usize {
                                too_many_layers = too_many_layers.max(layer);
                                continue;
                            }
                            chf.spans[i].con[dir] = layer as u8;
                            break;
                        }
                    }
                }
            }
        }

        if too_many_layers > 0 {
            log::warn!(
                "Compact heightfield has too many layers ({}), max {}",
                too_many_layers,
                NOT_CONNECTED - 1
            );
        }
        Ok(chf)
    }

    pub fn cell(&self, x: i32, z: i32) -> CompactCell {
        self.cells[(x + z * self.width) as usize]
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Column coordinates and span index of the neighbour of span `i` in `dir`
    pub fn neighbor(&self, x: i32, z: i32, i: usize, dir: usize) -> Option<(i32, i32, usize)> {
        let layer = self.spans[i].connection(dir)?;
        let nx = x + DIR_OFFSET_X[dir];
        let nz = z + DIR_OFFSET_Z[dir];
        Some((nx, nz, self.cell(nx, nz).index + layer))
    }

    /// Shrinks the walkable area away from obstacles by `radius` cells
    ///
    /// Spans whose chamfer distance to an unwalkable or missing neighbour is
    /// below `2 * radius` are marked unwalkable.
    pub fn erode_walkable_area(&mut self, radius: i32) {
        let mut dist = vec![0xffu8; self.spans.len()];

        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell(x, z);
                for i in cell.index..cell.index + cell.count {
                    if self.areas[i] == NULL_AREA {
                        dist[i] = 0;
                        continue;
                    }
                    let walkable_neighbors = (0..4)
                        .filter_map(|dir| self.neighbor(x, z, i, dir))
                        .filter(|&(_, _, ni)| self.areas[ni] != NULL_AREA)
                        .count();
                    if walkable_neighbors != 4 {
                        dist[i] = 0;
                    }
                }
            }
        }

        // Forward pass: (-1, 0), (-1, -1), (0, -1), (1, -1).
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell(x, z);
                for i in cell.index..cell.index + cell.count {
                    self.relax_distance(&mut dist, x, z, i, 0, 3);
                    self.relax_distance(&mut dist, x, z, i, 3, 2);
                }
            }
        }

        // Backward pass: (1, 0), (1, 1), (0, 1), (-1, 1).
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                let cell = self.cell(x, z);
                for i in cell.index..cell.index + cell.count {
                    self.relax_distance(&mut dist, x, z, i, 2, 1);
                    self.relax_distance(&mut dist, x, z, i, 1, 0);
                }
            }
        }

        let threshold = (radius * 2).min(255);
        for (area, &d) in self.areas.iter_mut().zip(&dist) {
            if (d as i32) < threshold {
                *area = NULL_AREA;
            }
        }
    }

    /// Updates `dist[i]` from the orthogonal neighbour in `dir` and the
    /// diagonal reached from it through `diagonal_dir`
    fn relax_distance(
        &self,
        dist: &mut [u8],
        x: i32,
        z: i32,
        i: usize,
        dir: usize,
        diagonal_dir: usize,
    ) {
        let Some((ax, az, ai)) = self.neighbor(x, z, i, dir) else {
            return;
        };
        let nd = dist[ai].saturating_add(2);
        if nd < dist[i] {
            dist[i] = nd;
        }
        if let Some((_, _, aai)) = self.neighbor(ax, az, ai, diagonal_dir) {
            let nd = dist[aai].saturating_add(3);
            if nd < dist[i] {
                dist[i] = nd;
            }
        }
    }
}
