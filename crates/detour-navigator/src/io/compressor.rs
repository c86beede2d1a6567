use navmesh_common::{Error, Result};

/// Compression applied to tile payloads in cache files
pub trait PayloadCompressor {
    fn compress(&self, data: &[u8]) -> Vec<u8>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Largest tile payload accepted from a cache file
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Best case expansion of an LZ4 block
const MAX_LZ4_RATIO: usize = 255;

/// LZ4 block compression with the uncompressed size prepended
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl PayloadCompressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        lz4_flex::compress_prepend_size(data)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let prefix: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::Persistence("compressed payload has no size".to_string()))?;
        let size = u32::from_le_bytes(prefix) as usize;
        let limit = MAX_PAYLOAD_SIZE.min((data.len() - 4).saturating_mul(MAX_LZ4_RATIO));
        if size > limit {
            return Err(Error::Persistence(format!(
                "compressed payload claims {} bytes from {} compressed",
                size,
                data.len() - 4
            )));
        }
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Persistence(format!("corrupt compressed payload: {}", e)))
    }
}
