//! Polygon area types and the traversal flags derived from them

use bitflags::bitflags;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Area classification of an input triangle and of the polygons built from it
///
/// `Null` marks unwalkable space. The numeric values are stored in built tile
/// data, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum AreaType {
    #[default]
    Null = 0,
    Water = 1,
    Door = 2,
    Pathgrid = 3,
    Ground = 63,
}

impl AreaType {
    /// Decodes an area id, returning `None` for values that do not name an area
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AreaType::Null),
            1 => Some(AreaType::Water),
            2 => Some(AreaType::Door),
            3 => Some(AreaType::Pathgrid),
            63 => Some(AreaType::Ground),
            _ => None,
        }
    }

    pub fn is_walkable(self) -> bool {
        self != AreaType::Null
    }

    /// Water surfaces are kept regardless of the slope of the triangle
    pub fn ignores_slope(self) -> bool {
        self == AreaType::Water
    }

    /// Traversal flags assigned to polygons of this area
    pub fn poly_flags(self) -> PolyFlags {
        match self {
            AreaType::Null => PolyFlags::empty(),
            AreaType::Water => PolyFlags::SWIM,
            AreaType::Door => PolyFlags::WALK | PolyFlags::OPEN_DOOR,
            AreaType::Pathgrid => PolyFlags::WALK | PolyFlags::USE_PATHGRID,
            AreaType::Ground => PolyFlags::WALK,
        }
    }
}

bitflags! {
    /// Traversal abilities required to cross a polygon
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
    pub struct PolyFlags: u16 {
        const WALK = 0x01;
        const SWIM = 0x02;
        const OPEN_DOOR = 0x04;
        const USE_PATHGRID = 0x08;
    }
}
