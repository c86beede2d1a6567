//! Binary navmesh cache file
//!
//! Layout, little endian:
//!
//! ```text
//! "NMCF" u32 version
//! build settings
//! u32 tile count
//! u64 agent count, agent bounds
//! per tile: u32 record length, record
//! record: tile id, u64 version, u64 length, compressed tile bytes
//! ```
//!
//! Records are length-prefixed so that a corrupt record can be skipped
//! without losing the ones after it.

use std::fs;
use std::path::Path;

use navmesh_codec::{
    check_header, decode, encode, format_fields, serialized_size, write_header, BinaryReader,
    BinaryWriter, Format,
};
use navmesh_common::{AgentBounds, Error, Result, SerializationError, TileId};
use navmesh_recast::RecastSettings;

use super::compressor::PayloadCompressor;
use crate::cache_item::TilePayload;

pub const CACHE_FILE_MAGIC: [u8; 4] = *b"NMCF";
pub const CACHE_FILE_VERSION: u32 = 1;

const HEADER_SIZE: usize = 8;

#[derive(Debug, Default, PartialEq)]
struct SettingsRecord {
    cell_size: f32,
    cell_height: f32,
    max_slope: f32,
    max_climb: f32,
    tile_size: i32,
    border_padding: i32,
    max_edge_len: i32,
    max_simplification_error: f32,
    min_region_area: i32,
    max_verts_per_poly: u32,
}

format_fields!(SettingsRecord {
    cell_size,
    cell_height,
    max_slope,
    max_climb,
    tile_size,
    border_padding,
    max_edge_len,
    max_simplification_error,
    min_region_area,
    max_verts_per_poly,
});

impl From<&RecastSettings> for SettingsRecord {
    fn from(s: &RecastSettings) -> Self {
        Self {
            cell_size: s.cell_size,
            cell_height: s.cell_height,
            max_slope: s.max_slope,
            max_climb: s.max_climb,
            tile_size: s.tile_size,
            border_padding: s.border_padding,
            max_edge_len: s.max_edge_len,
            max_simplification_error: s.max_simplification_error,
            min_region_area: s.min_region_area,
            max_verts_per_poly: s.max_verts_per_poly as u32,
        }
    }
}

#[derive(Debug, Default)]
struct Preamble {
    settings: SettingsRecord,
    tile_count: u32,
    agents: Vec<AgentBounds>,
}

format_fields!(Preamble {
    settings,
    tile_count,
    agents,
});

#[derive(Debug, Default)]
struct TileRecord {
    tile: TileId,
    version: u64,
    payload: Vec<u8>,
}

format_fields!(TileRecord {
    tile,
    version,
    payload,
});

/// A built tile as stored on disk
#[derive(Debug, Clone)]
pub struct CachedTile {
    /// Tile key; the agent bucket indexes the file's agent table
    pub tile: TileId,
    pub version: u64,
    pub payload: TilePayload,
}

/// Decoded cache file
#[derive(Debug, Default)]
pub struct CacheFileContents {
    pub agents: Vec<AgentBounds>,
    pub tiles: Vec<CachedTile>,
    /// Records dropped as corrupt or truncated
    pub skipped: usize,
}

/// Serializes `tiles` built with `settings` for the given agent table
pub fn encode_cache<C: PayloadCompressor>(
    settings: &RecastSettings,
    agents: &[AgentBounds],
    tiles: &[CachedTile],
    compressor: &C,
) -> Result<Vec<u8>> {
    let preamble = Preamble {
        settings: SettingsRecord::from(settings),
        tile_count: u32::try_from(tiles.len())
            .map_err(|_| Error::Persistence(format!("too many tiles: {}", tiles.len())))?,
        agents: agents.to_vec(),
    };

    let mut bytes = vec![0u8; HEADER_SIZE + serialized_size(&preamble)];
    {
        let mut writer = BinaryWriter::new(&mut bytes);
        write_header(&mut writer, CACHE_FILE_MAGIC, CACHE_FILE_VERSION)?;
        preamble.encode(&mut writer)?;
    }

    for tile in tiles {
        if usize::from(tile.tile.agent.0) >= agents.len() {
            return Err(Error::Persistence(format!(
                "tile {} references agent {} outside a table of {}",
                tile.tile,
                tile.tile.agent.0,
                agents.len()
            )));
        }
        let record = encode(&TileRecord {
            tile: tile.tile,
            version: tile.version,
            payload: compressor.compress(&tile.payload.bytes),
        })?;
        let len = u32::try_from(record.len())
            .map_err(|_| Error::Persistence(format!("tile {} is too large", tile.tile)))?;
        bytes.extend_from_slice(&encode(&len)?);
        bytes.extend_from_slice(&record);
    }
    Ok(bytes)
}

/// Parses a cache file, skipping records that fail to decode
///
/// The header and settings must match; everything after them is recovered
/// record by record. A truncated tail ends the load.
pub fn decode_cache<C: PayloadCompressor>(
    bytes: &[u8],
    settings: &RecastSettings,
    compressor: &C,
) -> Result<CacheFileContents> {
    let mut reader = BinaryReader::new(bytes);
    check_header(&mut reader, CACHE_FILE_MAGIC, CACHE_FILE_VERSION)?;
    let preamble: Preamble = reader.read()?;
    if preamble.settings != SettingsRecord::from(settings) {
        return Err(Error::Persistence(
            "cache file was built with different settings".to_string(),
        ));
    }

    let count = preamble.tile_count as usize;
    let mut contents = CacheFileContents {
        agents: preamble.agents,
        ..Default::default()
    };
    for index in 0..count {
        let record = reader
            .read::<u32>()
            .and_then(|len| reader.read_bytes(len as usize));
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                log::warn!(
                    "Navmesh cache truncated after {} of {} tiles: {}",
                    index,
                    count,
                    e
                );
                contents.skipped += count - index;
                break;
            }
        };
        match decode_tile(record, &contents.agents, compressor) {
            Ok(tile) => contents.tiles.push(tile),
            Err(e) => {
                log::warn!("Skipping corrupt navmesh cache record {}: {}", index, e);
                contents.skipped += 1;
            }
        }
    }
    Ok(contents)
}

fn decode_tile<C: PayloadCompressor>(
    record: &[u8],
    agents: &[AgentBounds],
    compressor: &C,
) -> Result<CachedTile> {
    let record: TileRecord = decode(record)?;
    let agent = agents
        .get(usize::from(record.tile.agent.0))
        .ok_or_else(|| {
            SerializationError::InvalidValue(format!("agent index {}", record.tile.agent.0))
        })?;
    let payload = TilePayload::from_bytes(compressor.decompress(&record.payload)?)?;
    let header = &payload.data.header;
    if header.position != record.tile.position || header.agent != *agent {
        return Err(Error::Persistence(format!(
            "payload of tile {} belongs to tile {}",
            record.tile, header.position
        )));
    }
    Ok(CachedTile {
        tile: record.tile,
        version: record.version,
        payload,
    })
}

/// Writes a cache file, replacing `path` only once the data is complete
pub fn write_cache_file<C: PayloadCompressor>(
    path: &Path,
    settings: &RecastSettings,
    agents: &[AgentBounds],
    tiles: &[CachedTile],
    compressor: &C,
) -> Result<()> {
    let bytes = encode_cache(settings, agents, tiles, compressor)?;
    let partial = path.with_extension("partial");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, path)?;
    Ok(())
}

pub fn read_cache_file<C: PayloadCompressor>(
    path: &Path,
    settings: &RecastSettings,
    compressor: &C,
) -> Result<CacheFileContents> {
    let bytes = fs::read(path)?;
    decode_cache(&bytes, settings, compressor)
}
