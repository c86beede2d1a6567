//! World geometry supplied to tile builds

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use navmesh_common::{Bounds, Error, Result};
use navmesh_recast::InputGeometry;
use parking_lot::RwLock;

/// Collision geometry provider queried by build jobs
///
/// A snapshot is taken on the simulation thread when a job is scheduled, so
/// later world changes never leak into a build already queued.
pub trait GeometrySource: Send + Sync {
    /// Triangles whose horizontal extent overlaps `bounds`
    fn snapshot(&self, bounds: &Bounds) -> InputGeometry;
}

/// Identifier of an object in [`ObjectGeometry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

#[derive(Debug, Clone)]
struct GeometryObject {
    geometry: InputGeometry,
    bounds: Bounds,
}

impl GeometryObject {
    fn new(geometry: InputGeometry) -> Result<Self> {
        geometry.validate()?;
        let bounds = geometry
            .bounds()
            .ok_or_else(|| Error::InvalidGeometry("object has no triangles".to_string()))?;
        Ok(Self { geometry, bounds })
    }
}

/// Geometry store keyed by object, for worlds that place and move whole meshes
///
/// Every mutation returns the world region whose tiles must be rebuilt, which
/// is what [`Navigator::update_geometry`](crate::Navigator::update_geometry)
/// expects.
#[derive(Debug, Default)]
pub struct ObjectGeometry {
    objects: RwLock<BTreeMap<ObjectId, GeometryObject>>,
    revision: AtomicU64,
}

impl ObjectGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object, replacing any object with the same id
    pub fn add_object(&self, id: ObjectId, geometry: InputGeometry) -> Result<Bounds> {
        let object = GeometryObject::new(geometry)?;
        let mut changed = object.bounds;
        if let Some(old) = self.objects.write().insert(id, object) {
            changed = changed.union(&old.bounds);
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(changed)
    }

    /// Replaces the geometry of an existing object
    ///
    /// Returns the union of the old and new bounds, or `None` when the new
    /// geometry is identical to the old one.
    pub fn update_object(&self, id: ObjectId, geometry: InputGeometry) -> Result<Option<Bounds>> {
        let object = GeometryObject::new(geometry)?;
        let mut objects = self.objects.write();
        let slot = objects
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidGeometry(format!("unknown object {}", id.0)))?;
        if slot.bounds == object.bounds && slot.geometry == object.geometry {
            return Ok(None);
        }
        let changed = slot.bounds.union(&object.bounds);
        *slot = object;
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(Some(changed))
    }

    /// Removes an object, returning the bounds it covered
    pub fn remove_object(&self, id: ObjectId) -> Option<Bounds> {
        let removed = self.objects.write().remove(&id)?;
        self.revision.fetch_add(1, Ordering::AcqRel);
        Some(removed.bounds)
    }

    /// Bounds of an object
    pub fn object_bounds(&self, id: ObjectId) -> Option<Bounds> {
        self.objects.read().get(&id).map(|o| o.bounds)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Number of mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl GeometrySource for ObjectGeometry {
    fn snapshot(&self, bounds: &Bounds) -> InputGeometry {
        let objects = self.objects.read();
        let mut snapshot = InputGeometry::new();
        for object in objects.values().filter(|o| o.bounds.intersects_xz(bounds)) {
            let geometry = &object.geometry;
            for (i, &area) in geometry.areas.iter().enumerate() {
                let [a, b, c] = geometry.triangle(i);
                let tri_bounds = Bounds::new(a.min(b).min(c), a.max(b).max(c));
                if tri_bounds.intersects_xz(bounds) {
                    snapshot.add_triangle(a, b, c, area);
                }
            }
        }
        snapshot
    }
}
