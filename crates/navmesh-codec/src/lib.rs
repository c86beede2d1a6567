//! Binary codec for navmesh data
//!
//! A value's layout is described once by its [`Format`] implementation and
//! walked by three visitors:
//!
//! - [`SizeAccumulator`] adds up the size of every field,
//! - [`BinaryWriter`] copies fields into a pre-sized buffer,
//! - [`BinaryReader`] copies fields back out.
//!
//! Because size, write and read share the same field order they cannot drift
//! apart. Encoding measures first and allocates exactly once; the write and
//! read passes themselves never allocate for scalar runs. All multi-byte
//! values are little-endian.
//!
//! # Example
//!
//! ```
//! use navmesh_codec::{decode, encode, serialized_size, format_fields};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Record {
//!     version: u64,
//!     payload: Vec<u8>,
//! }
//!
//! format_fields!(Record { version, payload });
//!
//! let record = Record { version: 2, payload: vec![1, 2, 3] };
//! let bytes = encode(&record).unwrap();
//! assert_eq!(bytes.len(), serialized_size(&record));
//! assert_eq!(decode::<Record>(&bytes).unwrap(), record);
//! ```

mod format;
mod reader;
mod scalar;
mod size;
mod writer;

pub use format::{Format, Sink, Source};
pub use navmesh_common::SerializationError;
pub use reader::BinaryReader;
pub use scalar::Scalar;
pub use size::SizeAccumulator;
pub use writer::BinaryWriter;

/// Number of bytes `value` encodes to
pub fn serialized_size<T: Format>(value: &T) -> usize {
    let mut accumulator = SizeAccumulator::new();
    // Measuring cannot fail: the accumulator has no capacity limit.
    let _ = value.encode(&mut accumulator);
    accumulator.size()
}

/// Encodes `value` into a freshly allocated buffer of exactly the right size
pub fn encode<T: Format>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut buffer = vec![0u8; serialized_size(value)];
    let mut writer = BinaryWriter::new(&mut buffer);
    value.encode(&mut writer)?;
    Ok(buffer)
}

/// Encodes `value` into `dst`, returning the number of bytes written
///
/// The size is checked before anything is written, so on
/// `InsufficientSpace` the destination is left untouched.
pub fn encode_into<T: Format>(value: &T, dst: &mut [u8]) -> Result<usize, SerializationError> {
    let size = serialized_size(value);
    if size > dst.len() {
        return Err(SerializationError::InsufficientSpace {
            needed: size,
            available: dst.len(),
        });
    }
    let mut writer = BinaryWriter::new(&mut dst[..size]);
    value.encode(&mut writer)?;
    Ok(size)
}

/// Decodes a value from the start of `src`
pub fn decode<T: Format + Default>(src: &[u8]) -> Result<T, SerializationError> {
    BinaryReader::new(src).read()
}

/// Writes a stream header made of a 4-byte magic and a format version
pub fn write_header<S: Sink>(
    sink: &mut S,
    magic: [u8; 4],
    version: u32,
) -> Result<(), SerializationError> {
    magic.encode(sink)?;
    version.encode(sink)
}

/// Reads and checks a stream header written by [`write_header`]
pub fn check_header<S: Source>(
    source: &mut S,
    magic: [u8; 4],
    version: u32,
) -> Result<(), SerializationError> {
    let mut found_magic = [0u8; 4];
    found_magic.decode(source)?;
    if found_magic != magic {
        return Err(SerializationError::BadMagic);
    }
    let mut found = 0u32;
    found.decode(source)?;
    if found != version {
        return Err(SerializationError::BadVersion {
            expected: version,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use navmesh_common::{AgentBounds, AgentBucket, AreaType, Bounds, PolyFlags, TileId};

    #[derive(Debug, Default, PartialEq)]
    struct Nested {
        id: TileId,
        corners: [Vec3; 2],
        ready: bool,
    }

    format_fields!(Nested { id, corners, ready });

    #[derive(Debug, Default, PartialEq)]
    struct Composite {
        bounds: Bounds,
        agent: AgentBounds,
        areas: Vec<AreaType>,
        flags: Vec<PolyFlags>,
        heights: Vec<f32>,
        children: Vec<Nested>,
        tag: i8,
    }

    format_fields!(Composite {
        bounds,
        agent,
        areas,
        flags,
        heights,
        children,
        tag,
    });

    fn sample() -> Composite {
        Composite {
            bounds: Bounds::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0)),
            agent: AgentBounds::new(0.5, 2.0),
            areas: vec![AreaType::Ground, AreaType::Water, AreaType::Door],
            flags: vec![PolyFlags::WALK, PolyFlags::SWIM | PolyFlags::OPEN_DOOR],
            heights: vec![0.0, 0.25, -7.5],
            children: vec![
                Nested {
                    id: TileId::new(-3, 4, AgentBucket(1)),
                    corners: [Vec3::ZERO, Vec3::ONE],
                    ready: true,
                },
                Nested::default(),
            ],
            tag: -2,
        }
    }

    #[test]
    fn test_composite_round_trip() -> Result<(), SerializationError> {
        let value = sample();
        let bytes = encode(&value)?;
        assert_eq!(bytes.len(), serialized_size(&value));
        assert_eq!(decode::<Composite>(&bytes)?, value);
        Ok(())
    }

    #[test]
    fn test_size_matches_layout() {
        // 2 x Vec3 + 2 x f32 + (8 + 3) + (8 + 2 * 2) + (8 + 3 * 4)
        // + 8 + 2 * (4 + 4 + 2 + 24 + 1) + 1
        let expected = 24 + 8 + 11 + 12 + 20 + 8 + 2 * 35 + 1;
        assert_eq!(serialized_size(&sample()), expected);
    }

    #[test]
    fn test_encode_into_short_buffer_is_untouched() {
        let value = sample();
        let mut dst = vec![0xeeu8; serialized_size(&value) - 1];
        let err = encode_into(&value, &mut dst).unwrap_err();
        assert!(matches!(err, SerializationError::InsufficientSpace { .. }));
        assert!(dst.iter().all(|&b| b == 0xee));
    }

    #[test]
    fn test_encode_into_exact_buffer() -> Result<(), SerializationError> {
        let value = sample();
        let mut dst = vec![0u8; serialized_size(&value) + 4];
        let written = encode_into(&value, &mut dst)?;
        assert_eq!(written, serialized_size(&value));
        assert_eq!(decode::<Composite>(&dst[..written])?, value);
        Ok(())
    }

    #[test]
    fn test_truncated_input_reports_insufficient_data() -> Result<(), SerializationError> {
        let bytes = encode(&sample())?;
        for len in [0, 1, 23, bytes.len() / 2, bytes.len() - 1] {
            let err = decode::<Composite>(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, SerializationError::InsufficientData { .. }),
                "length {len}: {err:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_corrupt_count_is_rejected_without_allocating() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.push(0);
        let err = decode::<Vec<u32>>(&bytes).unwrap_err();
        assert!(matches!(err, SerializationError::InsufficientData { .. }));
    }

    #[test]
    fn test_invalid_enum_values() {
        assert!(matches!(
            decode::<AreaType>(&[9]),
            Err(SerializationError::InvalidValue(_))
        ));
        assert!(matches!(
            decode::<bool>(&[2]),
            Err(SerializationError::InvalidValue(_))
        ));
        assert!(matches!(
            decode::<PolyFlags>(&[0x00, 0x80]),
            Err(SerializationError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_header_checks() -> Result<(), SerializationError> {
        let mut buf = [0u8; 8];
        write_header(&mut BinaryWriter::new(&mut buf), *b"TEST", 3)?;

        check_header(&mut BinaryReader::new(&buf), *b"TEST", 3)?;
        assert_eq!(
            check_header(&mut BinaryReader::new(&buf), *b"NOPE", 3),
            Err(SerializationError::BadMagic)
        );
        assert_eq!(
            check_header(&mut BinaryReader::new(&buf), *b"TEST", 4),
            Err(SerializationError::BadVersion {
                expected: 4,
                found: 3
            })
        );
        Ok(())
    }
}
