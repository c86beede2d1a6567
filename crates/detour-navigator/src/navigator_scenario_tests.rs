//! End-to-end navigator scenarios
//!
//! Each test drives a navigator the way a game loop would: agents join and
//! move, world objects change, and the navmesh is read back once the build
//! workers settle.

use crate::{AgentId, LoadReport, Navigator, NavigatorSettings, ObjectGeometry, ObjectId};
use glam::Vec3;
use navmesh_common::{AgentBounds, AreaType, Error, Result, TilePosition};
use navmesh_recast::{InputGeometry, RecastSettings};
use std::sync::Arc;
use std::time::Duration;

const IDLE: Duration = Duration::from_secs(60);

fn agent() -> AgentBounds {
    AgentBounds::new(0.5, 2.0)
}

fn patch(min: Vec3, size: f32) -> InputGeometry {
    let mut geometry = InputGeometry::new();
    geometry.add_mesh(
        &[
            min,
            min + Vec3::new(0.0, 0.0, size),
            min + Vec3::new(size, 0.0, size),
            min + Vec3::new(size, 0.0, 0.0),
        ],
        &[[0, 1, 2], [0, 2, 3]],
        AreaType::Ground,
    );
    geometry
}

fn settings() -> NavigatorSettings {
    NavigatorSettings::default()
        .with_worker_threads(2)
        .with_preload_radius(1.0)
}

#[cfg(test)]
mod build_tests {
    use super::*;

    #[test]
    fn test_flat_patch_builds_and_rebuilds() -> Result<()> {
        let world = Arc::new(ObjectGeometry::new());
        let mut nav = Navigator::new(settings(), world.clone())?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        assert_eq!(nav.stats().queued, 0);

        let changed = world.add_object(ObjectId(1), patch(Vec3::ZERO, 10.0))?;
        assert_eq!(nav.update_geometry(&changed), 1);
        assert!(nav.wait_until_idle(IDLE));

        assert_eq!(nav.cache().len(), 1);
        let first = nav.query(TilePosition::new(0, 0), &agent()).expect("built");
        assert_eq!(first.version, 1);
        assert!(!first.payload.bytes.is_empty());
        assert!(first.payload.data.poly_count() > 0);

        nav.update_geometry(&changed);
        assert!(nav.wait_until_idle(IDLE));
        let second = nav.query(TilePosition::new(0, 0), &agent()).expect("built");
        assert_eq!(second.version, 2);
        assert_eq!(first.version, 1);
        Ok(())
    }

    #[test]
    fn test_object_changes_drive_rebuilds() -> Result<()> {
        let world = Arc::new(ObjectGeometry::new());
        let mut nav = Navigator::new(settings(), world.clone())?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        let origin = TilePosition::new(0, 0);

        let placed = world.add_object(ObjectId(7), patch(Vec3::ZERO, 10.0))?;
        nav.update_geometry(&placed);
        assert!(nav.wait_until_idle(IDLE));
        let before = nav.query(origin, &agent()).expect("built");

        // Moving the patch grows the walkable surface.
        let moved = world
            .update_object(ObjectId(7), patch(Vec3::ZERO, 14.0))?
            .expect("geometry changed");
        nav.update_geometry(&moved);
        assert!(nav.wait_until_idle(IDLE));
        let after = nav.query(origin, &agent()).expect("built");
        assert_eq!(after.version, 2);
        assert!(after.payload.data.walkable_area() > before.payload.data.walkable_area());

        assert!(world.update_object(ObjectId(7), patch(Vec3::ZERO, 14.0))?.is_none());

        // With the only object gone the tile is cleared, not left stale.
        let removed = world.remove_object(ObjectId(7)).expect("object present");
        nav.update_geometry(&removed);
        assert!(nav.wait_until_idle(IDLE));
        assert_eq!(nav.stats().failed, 0);
        let cleared = nav.query(origin, &agent()).expect("still cached");
        assert_eq!(cleared.version, 3);
        assert_eq!(cleared.payload.data.poly_count(), 0);
        assert_eq!(cleared.payload.data.walkable_area(), 0.0);
        assert_eq!(
            after.payload.data.header.position,
            cleared.payload.data.header.position
        );
        Ok(())
    }

    #[test]
    fn test_agents_of_different_sizes_get_separate_tiles() -> Result<()> {
        let world = Arc::new(ObjectGeometry::new());
        let mut nav = Navigator::new(settings(), world.clone())?;
        let big = AgentBounds::new(1.2, 2.0);
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        nav.add_agent(AgentId(2), big, Vec3::new(5.0, 0.0, 5.0))?;

        let changed = world.add_object(ObjectId(1), patch(Vec3::ZERO, 10.0))?;
        assert_eq!(nav.update_geometry(&changed), 2);
        assert!(nav.wait_until_idle(IDLE));

        let small = nav.query(TilePosition::new(0, 0), &agent()).expect("built");
        let large = nav.query(TilePosition::new(0, 0), &big).expect("built");
        assert_ne!(small.tile, large.tile);
        assert!(small.payload.data.walkable_area() > large.payload.data.walkable_area());
        Ok(())
    }
}

#[cfg(test)]
mod persistence_tests {
    use super::*;

    fn built_navigator(world: Arc<ObjectGeometry>) -> Result<Navigator> {
        let mut nav = Navigator::new(settings(), world.clone())?;
        nav.add_agent(AgentId(1), agent(), Vec3::new(5.0, 0.0, 5.0))?;
        nav.add_agent(AgentId(2), agent(), Vec3::new(25.0, 0.0, 5.0))?;
        let changed = world.add_object(ObjectId(1), patch(Vec3::ZERO, 30.0))?;
        assert_eq!(nav.update_geometry(&changed), 2);
        assert!(nav.wait_until_idle(IDLE));
        // A second pass leaves the tiles at version 2.
        nav.update_geometry(&changed);
        assert!(nav.wait_until_idle(IDLE));
        Ok(nav)
    }

    #[test]
    fn test_saved_tiles_load_with_their_versions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tiles.nmc");
        let world = Arc::new(ObjectGeometry::new());
        let nav = built_navigator(world.clone())?;
        assert_eq!(nav.save_cache(&path)?, 2);

        let mut restored = Navigator::new(settings(), world)?;
        let report = restored.load_cache(&path)?;
        assert_eq!(report, LoadReport { loaded: 2, skipped: 0 });
        assert_eq!(restored.stats().queued, 0);

        for x in 0..2 {
            let position = TilePosition::new(x, 0);
            let saved = nav.query(position, &agent()).expect("built");
            let loaded = restored.query(position, &agent()).expect("loaded");
            assert_eq!(loaded.version, 2);
            assert_eq!(loaded.payload.bytes, saved.payload.bytes);
        }

        // Built entries are never overwritten by a load.
        let again = restored.load_cache(&path)?;
        assert_eq!(again, LoadReport { loaded: 0, skipped: 2 });
        Ok(())
    }

    #[test]
    fn test_load_remaps_agent_buckets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tiles.nmc");
        let world = Arc::new(ObjectGeometry::new());
        built_navigator(world.clone())?.save_cache(&path)?;

        let buckets = vec![AgentBounds::new(0.3, 1.0), agent()];
        let mut restored = Navigator::new(settings().with_agent_buckets(buckets), world)?;
        let report = restored.load_cache(&path)?;
        assert_eq!(report.loaded, 2);

        let tile = restored.query(TilePosition::new(1, 0), &agent()).expect("loaded");
        assert_eq!(tile.tile.agent.0, 1);
        let tiny = AgentBounds::new(0.2, 1.0);
        assert!(restored.query(TilePosition::new(1, 0), &tiny).is_none());

        // Saved shapes missing from a fixed bucket list are skipped.
        let mut narrow = Navigator::new(
            settings().with_agent_buckets(vec![AgentBounds::new(1.0, 2.0)]),
            Arc::new(ObjectGeometry::new()),
        )?;
        assert_eq!(narrow.load_cache(&path)?, LoadReport { loaded: 0, skipped: 2 });
        Ok(())
    }

    #[test]
    fn test_cache_from_other_settings_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tiles.nmc");
        let world = Arc::new(ObjectGeometry::new());
        built_navigator(world.clone())?.save_cache(&path)?;

        let other = settings().with_recast(RecastSettings::default().with_cell_size(0.25));
        let mut nav = Navigator::new(other, world)?;
        assert!(matches!(nav.load_cache(&path), Err(Error::Persistence(_))));

        let missing = nav.load_cache(dir.path().join("missing.nmc"));
        assert!(matches!(missing, Err(Error::Io(_))));
        Ok(())
    }
}
