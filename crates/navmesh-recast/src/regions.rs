//! Monotone region partitioning of the compact heightfield
//!
//! Regions are built row by row: a run of connected spans along x forms a
//! sweep, and a sweep continues the region of the row below when it is the
//! only sweep attached to it. The result has no holes, which keeps contour
//! tracing and triangulation simple.

use navmesh_common::{Error, Result};

use crate::compact_heightfield::CompactHeightfield;
use crate::heightfield::NULL_AREA;

/// Flag set on regions painted into the tile border
pub const BORDER_REG: u16 = 0x8000;

const NULL_NEIGHBOR: u16 = 0xffff;

#[derive(Debug, Clone, Copy, Default)]
struct Sweep {
    id: u16,
    neighbor: u16,
    shared: u32,
}

/// Partitions the walkable spans into monotone regions
///
/// Spans within `border_size` cells of the field edge get border regions,
/// which are never meshed. Islands smaller than `min_region_area` cells that
/// do not touch the border are removed. Returns the number of regions.
pub fn build_regions_monotone(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
) -> Result<usize> {
    let w = chf.width;
    let h = chf.height;
    let mut src_reg = vec![0u16; chf.span_count()];
    let mut id: u16 = 1;

    if border_size > 0 {
        let bw = w.min(border_size);
        let bh = h.min(border_size);
        let rects = [
            (0, bw, 0, h),
            (w - bw, w, 0, h),
            (0, w, 0, bh),
            (0, w, h - bh, h),
        ];
        for (min_x, max_x, min_z, max_z) in rects {
            paint_rect(chf, &mut src_reg, min_x, max_x, min_z, max_z, id | BORDER_REG);
            id += 1;
        }
    }

    let mut prev: Vec<u32> = Vec::new();
    let mut sweeps: Vec<Sweep> = Vec::new();

    for z in border_size..h - border_size {
        prev.clear();
        prev.resize(id as usize + 1, 0);
        sweeps.clear();
        sweeps.push(Sweep::default());
        let mut rid: u16 = 1;

        for x in border_size..w - border_size {
            let cell = chf.cell(x, z);
            for i in cell.index..cell.index + cell.count {
                let area = chf.areas[i];
                if area == NULL_AREA {
                    continue;
                }

                let mut previd = 0;
                if let Some((_, _, ai)) = chf.neighbor(x, z, i, 0) {
                    if src_reg[ai] & BORDER_REG == 0 && chf.areas[ai] == area {
                        previd = src_reg[ai];
                    }
                }
                if previd == 0 {
                    previd = rid;
                    rid += 1;
                    sweeps.push(Sweep::default());
                }

                if let Some((_, _, ai)) = chf.neighbor(x, z, i, 3) {
                    let nr = src_reg[ai];
                    if nr != 0 && nr & BORDER_REG == 0 && chf.areas[ai] == area {
                        let sweep = &mut sweeps[previd as usize];
                        if sweep.neighbor == 0 || sweep.neighbor == nr {
                            sweep.neighbor = nr;
                            sweep.shared += 1;
                            prev[nr as usize] += 1;
                        } else {
                            sweep.neighbor = NULL_NEIGHBOR;
                        }
                    }
                }

                src_reg[i] = previd;
            }
        }

        // A sweep inherits the region below only if nothing else attaches to it.
        for sweep in sweeps.iter_mut().skip(1) {
            if sweep.neighbor != NULL_NEIGHBOR
                && sweep.neighbor != 0
                && prev[sweep.neighbor as usize] == sweep.shared
            {
                sweep.id = sweep.neighbor;
            } else {
                if id >= BORDER_REG - 1 {
                    return Err(Error::NavMeshGeneration(
                        "region id overflow".to_string(),
                    ));
                }
                sweep.id = id;
                id += 1;
            }
        }

        for x in border_size..w - border_size {
            let cell = chf.cell(x, z);
            for i in cell.index..cell.index + cell.count {
                if src_reg[i] > 0 && src_reg[i] < rid {
                    src_reg[i] = sweeps[src_reg[i] as usize].id;
                }
            }
        }
    }

    filter_small_islands(chf, &mut src_reg, id as usize, min_region_area);
    let regions = compact_region_ids(&mut src_reg);

    for (span, reg) in chf.spans.iter_mut().zip(&src_reg) {
        span.reg = *reg;
    }
    chf.border_size = border_size;
    chf.max_regions = regions as u16 + 1;
    Ok(regions)
}

fn paint_rect(
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    min_x: i32,
    max_x: i32,
    min_z: i32,
    max_z: i32,
    reg: u16,
) {
    for z in min_z..max_z {
        for x in min_x..max_x {
            let cell = chf.cell(x, z);
            for i in cell.index..cell.index + cell.count {
                if chf.areas[i] != NULL_AREA {
                    src_reg[i] = reg;
                }
            }
        }
    }
}

fn find_root(parent: &mut [usize], mut r: usize) -> usize {
    while parent[r] != r {
        parent[r] = parent[parent[r]];
        r = parent[r];
    }
    r
}

/// Clears connected groups of same-area regions that are smaller than
/// `min_region_area` and do not touch a border region
fn filter_small_islands(
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    region_count: usize,
    min_region_area: i32,
) {
    let mut parent: Vec<usize> = (0..region_count).collect();
    let mut span_counts = vec![0i64; region_count];
    let mut touches_border = vec![false; region_count];

    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, z);
            for i in cell.index..cell.index + cell.count {
                let r = src_reg[i];
                if r == 0 || r & BORDER_REG != 0 {
                    continue;
                }
                span_counts[r as usize] += 1;
                for dir in 0..4 {
                    let Some((_, _, ni)) = chf.neighbor(x, z, i, dir) else {
                        continue;
                    };
                    let nr = src_reg[ni];
                    if nr & BORDER_REG != 0 {
                        touches_border[r as usize] = true;
                    } else if nr != 0 && nr != r && chf.areas[ni] == chf.areas[i] {
                        let a = find_root(&mut parent, r as usize);
                        let b = find_root(&mut parent, nr as usize);
                        if a != b {
                            parent[a] = b;
                        }
                    }
                }
            }
        }
    }

    let mut island_area = vec![0i64; region_count];
    let mut island_border = vec![false; region_count];
    for r in 1..region_count {
        let root = find_root(&mut parent, r);
        island_area[root] += span_counts[r];
        island_border[root] |= touches_border[r];
    }

    let mut removed = 0;
    for reg in src_reg.iter_mut() {
        if *reg == 0 || *reg & BORDER_REG != 0 {
            continue;
        }
        let root = find_root(&mut parent, *reg as usize);
        if !island_border[root] && island_area[root] < min_region_area as i64 {
            *reg = 0;
            removed += 1;
        }
    }
    if removed > 0 {
        log::trace!("Removed {} spans in small islands", removed);
    }
}

/// Renumbers the surviving regions to `1..=n`, returning `n`
fn compact_region_ids(src_reg: &mut [u16]) -> usize {
    let max_id = src_reg
        .iter()
        .filter(|r| **r & BORDER_REG == 0)
        .map(|r| *r as usize)
        .max()
        .unwrap_or(0);
    let mut remap = vec![0u16; max_id + 1];
    let mut next = 0u16;
    for reg in src_reg.iter_mut() {
        if *reg == 0 || *reg & BORDER_REG != 0 {
            continue;
        }
        let slot = &mut remap[*reg as usize];
        if *slot == 0 {
            next += 1;
            *slot = next;
        }
        *reg = *slot;
    }
    next as usize
}
