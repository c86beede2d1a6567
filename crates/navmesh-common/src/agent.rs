//! Agent shape profiles

use crate::{Error, Result};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Physical size of an agent, which determines how geometry is voxelized
///
/// Equality and hashing compare the exact bit patterns of the fields, so two
/// profiles that differ in any way are distinct cache keys.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct AgentBounds {
    /// Horizontal radius of the agent in world units
    pub radius: f32,
    /// Height of the agent in world units
    pub height: f32,
}

impl AgentBounds {
    pub fn new(radius: f32, height: f32) -> Self {
        Self { radius, height }
    }

    /// Checks that the profile can parameterize a build
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(Error::Configuration(format!(
                "invalid agent radius {}",
                self.radius
            )));
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err(Error::Configuration(format!(
                "invalid agent height {}",
                self.height
            )));
        }
        Ok(())
    }

    /// True when an agent of this profile fits inside `other`
    pub fn fits_within(&self, other: &AgentBounds) -> bool {
        self.radius <= other.radius && self.height <= other.height
    }

    fn key(&self) -> (u32, u32) {
        (self.radius.to_bits(), self.height.to_bits())
    }
}

impl PartialEq for AgentBounds {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AgentBounds {}

impl std::hash::Hash for AgentBounds {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Index of an agent profile in a bucket table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct AgentBucket(pub u16);

/// Registry assigning a stable bucket index to each distinct agent profile
#[derive(Debug, Clone, Default)]
pub struct AgentBucketTable {
    bounds: Vec<AgentBounds>,
}

impl AgentBucketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket of `bounds`, registering it when unseen
    pub fn register(&mut self, bounds: AgentBounds) -> Result<AgentBucket> {
        bounds.validate()?;
        if let Some(bucket) = self.find(&bounds) {
            return Ok(bucket);
        }
        let index = u16::try_from(self.bounds.len())
            .map_err(|_| Error::Configuration("too many agent profiles".to_string()))?;
        self.bounds.push(bounds);
        Ok(AgentBucket(index))
    }

    pub fn find(&self, bounds: &AgentBounds) -> Option<AgentBucket> {
        self.bounds
            .iter()
            .position(|b| b == bounds)
            .map(|i| AgentBucket(i as u16))
    }

    pub fn get(&self, bucket: AgentBucket) -> Option<&AgentBounds> {
        self.bounds.get(bucket.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentBucket, &AgentBounds)> {
        self.bounds
            .iter()
            .enumerate()
            .map(|(i, b)| (AgentBucket(i as u16), b))
    }

    pub fn as_slice(&self) -> &[AgentBounds] {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(AgentBounds::new(0.5, 2.0).validate().is_ok());
        assert!(AgentBounds::new(0.0, 2.0).validate().is_ok());
        assert!(AgentBounds::new(-0.5, 2.0).validate().is_err());
        assert!(AgentBounds::new(0.5, 0.0).validate().is_err());
        assert!(AgentBounds::new(f32::NAN, 2.0).validate().is_err());
    }

    #[test]
    fn test_bucket_table_reuses_buckets() -> Result<()> {
        let mut table = AgentBucketTable::new();
        let a = table.register(AgentBounds::new(0.5, 2.0))?;
        let b = table.register(AgentBounds::new(0.3, 1.0))?;
        let again = table.register(AgentBounds::new(0.5, 2.0))?;

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b), Some(&AgentBounds::new(0.3, 1.0)));
        Ok(())
    }

    #[test]
    fn test_bucket_table_rejects_invalid_bounds() {
        let mut table = AgentBucketTable::new();
        assert!(matches!(
            table.register(AgentBounds::new(0.5, -1.0)),
            Err(Error::Configuration(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_fits_within() {
        let small = AgentBounds::new(0.3, 1.0);
        let large = AgentBounds::new(0.6, 2.0);
        assert!(small.fits_within(&large));
        assert!(!large.fits_within(&small));
    }
}
