//! Triangle classification and rasterization into a heightfield

use glam::Vec3;
use navmesh_common::{AreaType, Result};

use crate::heightfield::{Heightfield, MAX_SPAN_HEIGHT, NULL_AREA};
use crate::input::InputGeometry;

#[derive(Clone, Copy)]
enum Axis {
    X,
    Z,
}

impl Axis {
    fn of(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Area id of each triangle after slope classification
///
/// Triangles steeper than `walkable_slope_angle` become `NULL_AREA`, except
/// water, which is kept whatever its slope. Winding is ignored.
pub fn classify_triangles(geometry: &InputGeometry, walkable_slope_angle: f32) -> Vec<u8> {
    let walkable_threshold = walkable_slope_angle.to_radians().cos();
    (0..geometry.triangle_count())
        .map(|i| {
            let area = geometry.areas[i];
            if area == AreaType::Null {
                return NULL_AREA;
            }
            if area.ignores_slope() {
                return area as u8;
            }
            let [a, b, c] = geometry.triangle(i);
            let normal = (b - a).cross(c - a).normalize_or_zero();
            if normal.y.abs() > walkable_threshold {
                area as u8
            } else {
                NULL_AREA
            }
        })
        .collect()
}

/// Splits a convex polygon by the line `axis == offset`
///
/// Returns the part below the line and the part above it. Vertices exactly
/// on the line go to both parts.
fn divide_poly(input: &[Vec3], offset: f32, axis: Axis) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut below = Vec::with_capacity(input.len() + 2);
    let mut above = Vec::with_capacity(input.len() + 2);
    let delta: Vec<f32> = input.iter().map(|&v| offset - axis.of(v)).collect();

    let n = input.len();
    let mut b = n.wrapping_sub(1);
    for a in 0..n {
        let same_side = (delta[a] >= 0.0) == (delta[b] >= 0.0);
        if !same_side {
            let s = delta[b] / (delta[b] - delta[a]);
            let p = input[b] + (input[a] - input[b]) * s;
            below.push(p);
            above.push(p);
            // Vertices on the dividing line were added above.
            if delta[a] > 0.0 {
                below.push(input[a]);
            } else if delta[a] < 0.0 {
                above.push(input[a]);
            }
        } else {
            if delta[a] >= 0.0 {
                below.push(input[a]);
                if delta[a] != 0.0 {
                    b = a;
                    continue;
                }
            }
            above.push(input[a]);
        }
        b = a;
    }
    (below, above)
}

/// Rasterizes one triangle into the heightfield
pub fn rasterize_triangle(
    hf: &mut Heightfield,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    flag_merge_threshold: i32,
) -> Result<()> {
    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);

    // Skip triangles outside the field.
    if tmin.x > hf.bmax.x || tmax.x < hf.bmin.x || tmin.z > hf.bmax.z || tmax.z < hf.bmin.z {
        return Ok(());
    }

    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;
    let by = hf.bmax.y - hf.bmin.y;
    let w = hf.width;
    let h = hf.height;

    let z0 = (((tmin.z - hf.bmin.z) * ics).floor() as i32).clamp(-1, h - 1);
    let z1 = (((tmax.z - hf.bmin.z) * ics).floor() as i32).clamp(0, h - 1);

    let mut rest = vec![v0, v1, v2];
    for z in z0..=z1 {
        let cell_z = hf.bmin.z + z as f32 * hf.cs;
        let (row, remaining) = divide_poly(&rest, cell_z + hf.cs, Axis::Z);
        rest = remaining;
        if row.len() < 3 || z < 0 {
            continue;
        }

        let (min_x, max_x) = row
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.x), hi.max(v.x)));
        let x0 = ((min_x - hf.bmin.x) * ics).floor() as i32;
        let x1 = ((max_x - hf.bmin.x) * ics).floor() as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut row_rest = row;
        for x in x0..=x1 {
            let cell_x = hf.bmin.x + x as f32 * hf.cs;
            let (cell, remaining) = divide_poly(&row_rest, cell_x + hf.cs, Axis::X);
            row_rest = remaining;
            if cell.len() < 3 || x < 0 {
                continue;
            }

            let (mut span_min, mut span_max) = cell
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
            span_min -= hf.bmin.y;
            span_max -= hf.bmin.y;
            if span_max < 0.0 || span_min > by {
                continue;
            }
            span_min = span_min.max(0.0);
            span_max = span_max.min(by);

            let smin = ((span_min * ich).floor() as i32).clamp(0, MAX_SPAN_HEIGHT);
            let smax = ((span_max * ich).ceil() as i32).clamp(smin + 1, MAX_SPAN_HEIGHT);
            if smin >= smax {
                continue;
            }
            hf.add_span(x, z, smin as u16, smax as u16, area, flag_merge_threshold)?;
        }
    }
    Ok(())
}

/// Rasterizes every triangle with its classified area
pub fn rasterize_triangles(
    hf: &mut Heightfield,
    geometry: &InputGeometry,
    areas: &[u8],
    flag_merge_threshold: i32,
) -> Result<()> {
    for (i, &area) in areas.iter().enumerate() {
        let [a, b, c] = geometry.triangle(i);
        rasterize_triangle(hf, a, b, c, area, flag_merge_threshold)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Heightfield {
        Heightfield::new(
            4,
            4,
            Vec3::ZERO,
            Vec3::new(4.0, 4.0, 4.0),
            1.0,
            0.5,
        )
    }

    #[test]
    fn test_divide_poly_splits_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let (below, above) = divide_poly(&square, 1.0, Axis::X);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }

    #[test]
    fn test_divide_poly_entirely_one_side() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let (below, above) = divide_poly(&tri, 5.0, Axis::Z);
        assert_eq!(below.len(), 3);
        assert!(above.len() < 3);
    }

    #[test]
    fn test_classify_by_slope() {
        let mut geometry = InputGeometry::new();
        // Flat, wound both ways.
        geometry.add_triangle(Vec3::ZERO, Vec3::Z, Vec3::X, AreaType::Ground);
        geometry.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Z, AreaType::Ground);
        // Vertical wall.
        geometry.add_triangle(Vec3::ZERO, Vec3::Y, Vec3::X, AreaType::Ground);
        // Vertical water is still water.
        geometry.add_triangle(Vec3::ZERO, Vec3::Y, Vec3::X, AreaType::Water);
        geometry.add_triangle(Vec3::ZERO, Vec3::Z, Vec3::X, AreaType::Null);

        let areas = classify_triangles(&geometry, 45.0);
        assert_eq!(
            areas,
            vec![
                AreaType::Ground as u8,
                AreaType::Ground as u8,
                NULL_AREA,
                AreaType::Water as u8,
                NULL_AREA
            ]
        );
    }

    #[test]
    fn test_rasterize_flat_quad_fills_cells() -> Result<()> {
        let mut hf = field();
        let a = Vec3::new(0.0, 1.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 2.0);
        let c = Vec3::new(2.0, 1.0, 2.0);
        let d = Vec3::new(2.0, 1.0, 0.0);
        rasterize_triangle(&mut hf, a, b, c, 63, 1)?;
        rasterize_triangle(&mut hf, a, c, d, 63, 1)?;

        for z in 0..2 {
            for x in 0..2 {
                let column = hf.column(x, z);
                assert_eq!(column.len(), 1, "cell ({x}, {z})");
                assert_eq!(column[0].smin, 2);
                assert_eq!(column[0].smax, 3);
                assert_eq!(column[0].area, 63);
            }
        }
        assert!(hf.column(3, 3).is_empty());
        Ok(())
    }

    #[test]
    fn test_rasterize_ignores_outside_triangles() -> Result<()> {
        let mut hf = field();
        rasterize_triangle(
            &mut hf,
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 12.0),
            Vec3::new(12.0, 0.0, 12.0),
            63,
            1,
        )?;
        assert_eq!(hf.span_count(), 0);
        Ok(())
    }

    #[test]
    fn test_rasterize_clips_partially_outside_triangle() -> Result<()> {
        let mut hf = field();
        rasterize_triangle(
            &mut hf,
            Vec3::new(-3.0, 0.0, -3.0),
            Vec3::new(-3.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, -3.0),
            63,
            1,
        )?;
        assert_eq!(hf.column(0, 0).len(), 1);
        assert!(hf.column(2, 2).is_empty());
        Ok(())
    }
}
