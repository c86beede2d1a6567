//! Common value types and errors shared by the navmesh build and cache crates
//!
//! Everything here is plain data: world-space bounds, tile coordinates,
//! agent shape profiles and polygon area types. The tile-grid math that maps
//! world positions and regions onto tiles lives next to the types it produces.

mod agent;
mod area;
mod bounds;
mod tile;

pub use agent::*;
pub use area::*;
pub use bounds::*;
pub use tile::*;

/// Error types for the navmesh subsystem
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input geometry: {0}")]
    InvalidGeometry(String),

    #[error("navigation mesh generation failed: {0}")]
    NavMeshGeneration(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors raised by a tile build rather than by setup or I/O
    pub fn is_build_error(&self) -> bool {
        matches!(self, Error::InvalidGeometry(_) | Error::NavMeshGeneration(_))
    }
}

/// Errors raised by the binary codec
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("insufficient space: need {needed} bytes, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    #[error("insufficient data: need {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("bad magic")]
    BadMagic,

    #[error("bad version: expected {expected}, found {found}")]
    BadVersion { expected: u32, found: u32 },

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result type for navmesh operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_classification() {
        assert!(Error::InvalidGeometry("no triangles".into()).is_build_error());
        assert!(Error::NavMeshGeneration("empty".into()).is_build_error());
        assert!(!Error::Configuration("cell size".into()).is_build_error());
        assert!(!Error::from(SerializationError::BadMagic).is_build_error());
    }

    #[test]
    fn test_serialization_error_message() {
        let err = Error::from(SerializationError::InsufficientData {
            needed: 8,
            available: 3,
        });
        assert_eq!(
            err.to_string(),
            "serialization error: insufficient data: need 8 bytes, 3 available"
        );
    }
}
