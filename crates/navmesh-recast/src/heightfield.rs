//! Heightfield representation and span filters
//!
//! The heightfield is the first data structure of the voxel pipeline: a 2D
//! grid of columns, each holding the solid spans produced by rasterizing the
//! input triangles, ordered from bottom to top.

use glam::Vec3;
use navmesh_common::{Error, Result};

/// Largest span height the heightfield can represent
pub const MAX_SPAN_HEIGHT: i32 = 0xffff;

/// Area id of unwalkable spans
pub const NULL_AREA: u8 = 0;

/// A solid vertical segment in a heightfield column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Bottom of the span, in cell heights
    pub smin: u16,
    /// Top of the span, in cell heights
    pub smax: u16,
    /// Area id of the span's top surface
    pub area: u8,
}

/// Grid of span columns
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Width of the heightfield along the x-axis
    pub width: i32,
    /// Height (depth) of the heightfield along the z-axis
    pub height: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    columns: Vec<Vec<Span>>,
}

impl Heightfield {
    /// Creates a new empty heightfield
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Self {
        let cells = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![Vec::new(); cells],
        }
    }

    /// Spans of column `(x, z)` from bottom to top
    pub fn column(&self, x: i32, z: i32) -> &[Span] {
        &self.columns[(x + z * self.width) as usize]
    }

    fn column_mut(&mut self, x: i32, z: i32) -> &mut Vec<Span> {
        &mut self.columns[(x + z * self.width) as usize]
    }

    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Number of spans with a walkable top surface
    pub fn walkable_span_count(&self) -> usize {
        self.columns
            .iter()
            .flatten()
            .filter(|s| s.area != NULL_AREA)
            .count()
    }

    /// Adds a span, merging it with every span it overlaps
    ///
    /// When the merged tops are within `flag_merge_threshold` of each other
    /// the higher area id wins.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_threshold: i32,
    ) -> Result<()> {
        if x < 0 || x >= self.width || z < 0 || z >= self.height {
            return Err(Error::NavMeshGeneration(format!(
                "span position out of bounds: ({}, {})",
                x, z
            )));
        }
        if smin >= smax {
            return Err(Error::NavMeshGeneration(format!(
                "invalid span height: min ({}) >= max ({})",
                smin, smax
            )));
        }

        let column = self.column_mut(x, z);
        let mut new_span = Span { smin, smax, area };
        let mut i = 0;
        while i < column.len() {
            let current = column[i];
            if current.smin > new_span.smax {
                // Current span is entirely above the new one.
                break;
            }
            if current.smax < new_span.smin {
                i += 1;
                continue;
            }

            new_span.smin = new_span.smin.min(current.smin);
            new_span.smax = new_span.smax.max(current.smax);
            if (new_span.smax as i32 - current.smax as i32).abs() <= flag_merge_threshold {
                new_span.area = new_span.area.max(current.area);
            }
            column.remove(i);
        }
        column.insert(i, new_span);
        Ok(())
    }

    /// Lets walkable surfaces extend over low obstacles such as curbs
    ///
    /// An unwalkable span directly above a walkable one becomes walkable when
    /// its top is at most `walkable_climb` above the walkable top.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for column in &mut self.columns {
            let mut previous: Option<Span> = None;
            for span in column.iter_mut() {
                let walkable = span.area != NULL_AREA;
                if let Some(prev) = previous {
                    if !walkable
                        && prev.area != NULL_AREA
                        && span.smax as i32 - prev.smax as i32 <= walkable_climb
                    {
                        span.area = prev.area;
                    }
                }
                // Keep the original walkability so a run of obstacles is not promoted.
                previous = Some(Span {
                    area: if walkable { span.area } else { NULL_AREA },
                    ..*span
                });
            }
        }
    }

    /// Marks spans next to a drop deeper than `walkable_climb` as unwalkable
    ///
    /// Also clears spans whose traversable neighbours differ too much in
    /// height, which catches steep slopes rasterized as stairs.
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        const DIRS: [(i32, i32); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];
        let mut cleared = Vec::new();

        for z in 0..self.height {
            for x in 0..self.width {
                let column = self.column(x, z);
                for (k, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let floor = span.smax as i32;
                    let ceiling = column
                        .get(k + 1)
                        .map_or(MAX_SPAN_HEIGHT, |next| next.smin as i32);

                    let mut lowest_neighbor_floor_difference = MAX_SPAN_HEIGHT;
                    let mut lowest_traversable = floor;
                    let mut highest_traversable = floor;

                    for (dx, dz) in DIRS {
                        let nx = x + dx;
                        let nz = z + dz;
                        if nx < 0 || nz < 0 || nx >= self.width || nz >= self.height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        let neighbor = self.column(nx, nz);
                        // Gap between minus infinity and the first neighbour span.
                        let first_top = neighbor
                            .first()
                            .map_or(MAX_SPAN_HEIGHT, |s| s.smin as i32);
                        if ceiling.min(first_top) - floor >= walkable_height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        for (j, ns) in neighbor.iter().enumerate() {
                            let neighbor_bot = ns.smax as i32;
                            let neighbor_top = neighbor
                                .get(j + 1)
                                .map_or(MAX_SPAN_HEIGHT, |next| next.smin as i32);
                            if ceiling.min(neighbor_top) - floor.max(neighbor_bot)
                                >= walkable_height
                            {
                                let difference = neighbor_bot - floor;
                                lowest_neighbor_floor_difference =
                                    lowest_neighbor_floor_difference.min(difference);
                                if difference.abs() <= walkable_climb {
                                    lowest_traversable = lowest_traversable.min(neighbor_bot);
                                    highest_traversable = highest_traversable.max(neighbor_bot);
                                } else if difference < -walkable_climb {
                                    break;
                                }
                            }
                        }
                    }

                    if lowest_neighbor_floor_difference < -walkable_climb
                        || highest_traversable - lowest_traversable > walkable_climb
                    {
                        cleared.push((x, z, k));
                    }
                }
            }
        }

        for (x, z, k) in cleared {
            self.column_mut(x, z)[k].area = NULL_AREA;
        }
    }

    /// Marks spans without `walkable_height` of clearance above them as unwalkable
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for column in &mut self.columns {
            for k in 0..column.len() {
                let floor = column[k].smax as i32;
                let ceiling = column
                    .get(k + 1)
                    .map_or(MAX_SPAN_HEIGHT, |next| next.smin as i32);
                if ceiling - floor < walkable_height {
                    column[k].area = NULL_AREA;
                }
            }
        }
    }
}
