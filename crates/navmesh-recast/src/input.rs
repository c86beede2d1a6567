//! Input triangle soup handed to the tile builder

use glam::Vec3;
use navmesh_common::{AreaType, Bounds, Error, Result};

/// Triangles with a per-triangle area classification
///
/// This is an immutable snapshot: a build job keeps its own copy so later
/// world changes cannot affect a build in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputGeometry {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub areas: Vec<AreaType>,
}

impl InputGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a triangle of the given area
    pub fn add_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, area: AreaType) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&[a, b, c]);
        self.triangles.push([base, base + 1, base + 2]);
        self.areas.push(area);
    }

    /// Appends an indexed mesh, classifying all of its triangles as `area`
    pub fn add_mesh(&mut self, vertices: &[Vec3], triangles: &[[u32; 3]], area: AreaType) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.triangles
            .extend(triangles.iter().map(|t| [t[0] + base, t[1] + base, t[2] + base]));
        self.areas
            .extend(std::iter::repeat(area).take(triangles.len()));
    }

    /// Appends another snapshot
    pub fn append(&mut self, other: &InputGeometry) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + base, t[1] + base, t[2] + base]),
        );
        self.areas.extend_from_slice(&other.areas);
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounds of every referenced vertex
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.iter().map(|&i| self.vertices[i as usize])),
        )
    }

    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        let t = self.triangles[index];
        [
            self.vertices[t[0] as usize],
            self.vertices[t[1] as usize],
            self.vertices[t[2] as usize],
        ]
    }

    /// Checks indices, area counts and vertex values
    pub fn validate(&self) -> Result<()> {
        if self.areas.len() != self.triangles.len() {
            return Err(Error::InvalidGeometry(format!(
                "{} triangles but {} area entries",
                self.triangles.len(),
                self.areas.len()
            )));
        }
        let count = self.vertices.len();
        if let Some(t) = self
            .triangles
            .iter()
            .find(|t| t.iter().any(|&i| i as usize >= count))
        {
            return Err(Error::InvalidGeometry(format!(
                "triangle {:?} references a vertex outside 0..{}",
                t, count
            )));
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidGeometry(
                "non-finite vertex coordinate".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_append() {
        let mut a = InputGeometry::new();
        a.add_triangle(Vec3::ZERO, Vec3::Z, Vec3::X, AreaType::Ground);

        let mut b = InputGeometry::new();
        b.add_mesh(
            &[Vec3::ZERO, Vec3::Y, Vec3::ONE, Vec3::X],
            &[[0, 1, 2], [0, 2, 3]],
            AreaType::Water,
        );

        a.append(&b);
        assert_eq!(a.triangle_count(), 3);
        assert_eq!(a.triangles[2], [3, 5, 6]);
        assert_eq!(a.areas, vec![AreaType::Ground, AreaType::Water, AreaType::Water]);
        assert!(a.validate().is_ok());
        assert_eq!(a.triangle(1), [Vec3::ZERO, Vec3::Y, Vec3::ONE]);
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let geometry = InputGeometry {
            vertices: vec![Vec3::ZERO, Vec3::X],
            triangles: vec![[0, 1, 2]],
            areas: vec![AreaType::Ground],
        };
        assert!(matches!(geometry.validate(), Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_rejects_missing_areas() {
        let mut geometry = InputGeometry::new();
        geometry.add_triangle(Vec3::ZERO, Vec3::Z, Vec3::X, AreaType::Ground);
        geometry.areas.clear();
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_bounds_ignore_unreferenced_vertices() {
        let geometry = InputGeometry {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::splat(100.0)],
            triangles: vec![[0, 2, 1]],
            areas: vec![AreaType::Ground],
        };
        let bounds = geometry.bounds().unwrap();
        assert_eq!(bounds.max, Vec3::new(1.0, 0.0, 1.0));
    }
}
