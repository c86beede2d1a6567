//! The `Format` trait and the visitor traits it drives

use glam::{Vec2, Vec3};
use navmesh_common::{
    AgentBounds, AgentBucket, AreaType, Bounds, PolyFlags, SerializationError, TileId,
    TilePosition,
};

use crate::scalar::Scalar;

type Result<T> = std::result::Result<T, SerializationError>;

/// Destination visited by `Format::encode`
///
/// Implemented by `BinaryWriter` (copies bytes) and `SizeAccumulator`
/// (only counts them).
pub trait Sink {
    fn put<T: Scalar>(&mut self, value: T) -> Result<()>;
    fn put_slice<T: Scalar>(&mut self, values: &[T]) -> Result<()>;
}

/// Origin visited by `Format::decode`
pub trait Source {
    fn take<T: Scalar>(&mut self) -> Result<T>;
    fn take_into<T: Scalar>(&mut self, dst: &mut [T]) -> Result<()>;
    /// Bytes left to read
    fn remaining(&self) -> usize;
}

/// Field-order description of a value
///
/// One implementation serves every visitor: the same `encode` computes the
/// serialized size when handed a `SizeAccumulator` and writes bytes when
/// handed a `BinaryWriter`; `decode` mirrors it field by field. Composite
/// types should normally be described with [`format_fields!`](crate::format_fields).
pub trait Format {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()>;
    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()>;

    /// Encodes a run of values; scalars override this with a bulk copy
    fn encode_slice<S: Sink>(items: &[Self], sink: &mut S) -> Result<()>
    where
        Self: Sized,
    {
        items.iter().try_for_each(|item| item.encode(sink))
    }

    /// Decodes a run of values in place; scalars override this with a bulk copy
    fn decode_slice<S: Source>(items: &mut [Self], source: &mut S) -> Result<()>
    where
        Self: Sized,
    {
        items.iter_mut().try_for_each(|item| item.decode(source))
    }
}

/// Implements [`Format`] for a struct from its field list
///
/// ```
/// use navmesh_codec::{decode, encode, format_fields};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Header {
///     tiles: u32,
///     origin: [f32; 3],
/// }
///
/// format_fields!(Header { tiles, origin });
///
/// let header = Header { tiles: 3, origin: [1.0, 0.0, -1.0] };
/// let bytes = encode(&header).unwrap();
/// assert_eq!(bytes.len(), 16);
/// assert_eq!(decode::<Header>(&bytes).unwrap(), header);
/// ```
#[macro_export]
macro_rules! format_fields {
    ($ty:ty { $($field:tt),* $(,)? }) => {
        impl $crate::Format for $ty {
            fn encode<S: $crate::Sink>(
                &self,
                sink: &mut S,
            ) -> ::std::result::Result<(), $crate::SerializationError> {
                $( $crate::Format::encode(&self.$field, sink)?; )*
                let _ = sink;
                Ok(())
            }

            fn decode<S: $crate::Source>(
                &mut self,
                source: &mut S,
            ) -> ::std::result::Result<(), $crate::SerializationError> {
                $( $crate::Format::decode(&mut self.$field, source)?; )*
                let _ = source;
                Ok(())
            }
        }
    };
}

macro_rules! scalar_format {
    ($($ty:ty),*) => {
        $(
            impl Format for $ty {
                fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
                    sink.put(*self)
                }

                fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
                    *self = source.take()?;
                    Ok(())
                }

                fn encode_slice<S: Sink>(items: &[Self], sink: &mut S) -> Result<()> {
                    sink.put_slice(items)
                }

                fn decode_slice<S: Source>(items: &mut [Self], source: &mut S) -> Result<()> {
                    source.take_into(items)
                }
            }
        )*
    };
}

scalar_format!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Format for bool {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put(u8::from(*self))
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        *self = match source.take::<u8>()? {
            0 => false,
            1 => true,
            other => {
                return Err(SerializationError::InvalidValue(format!(
                    "bool byte {other}"
                )))
            }
        };
        Ok(())
    }
}

impl<T: Format, const N: usize> Format for [T; N] {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        T::encode_slice(self, sink)
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        T::decode_slice(self, source)
    }
}

/// Counted run: a u64 element count followed by the elements
impl<T: Format + Default> Format for Vec<T> {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put(self.len() as u64)?;
        T::encode_slice(self, sink)
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        let count = source.take::<u64>()?;
        // Every element occupies at least one byte, so a count larger than
        // the remaining input can only come from corrupt data.
        let available = source.remaining();
        let count = usize::try_from(count)
            .ok()
            .filter(|&c| c <= available)
            .ok_or(SerializationError::InsufficientData {
                needed: usize::try_from(count).unwrap_or(usize::MAX),
                available,
            })?;
        let mut items: Vec<T> = std::iter::repeat_with(T::default).take(count).collect();
        T::decode_slice(&mut items, source)?;
        *self = items;
        Ok(())
    }
}

impl Format for Vec2 {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put_slice(&self.to_array())
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        let mut v = [0f32; 2];
        source.take_into(&mut v)?;
        *self = Vec2::from_array(v);
        Ok(())
    }
}

impl Format for Vec3 {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put_slice(&self.to_array())
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        let mut v = [0f32; 3];
        source.take_into(&mut v)?;
        *self = Vec3::from_array(v);
        Ok(())
    }
}

impl Format for AreaType {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put(*self as u8)
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        let id = source.take::<u8>()?;
        *self = AreaType::from_u8(id)
            .ok_or_else(|| SerializationError::InvalidValue(format!("area type {id}")))?;
        Ok(())
    }
}

impl Format for PolyFlags {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put(self.bits())
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        let bits = source.take::<u16>()?;
        *self = PolyFlags::from_bits(bits)
            .ok_or_else(|| SerializationError::InvalidValue(format!("poly flags {bits:#x}")))?;
        Ok(())
    }
}

format_fields!(Bounds { min, max });
format_fields!(TilePosition { x, y });
format_fields!(AgentBucket { 0 });
format_fields!(TileId { position, agent });

impl Format for AgentBounds {
    fn encode<S: Sink>(&self, sink: &mut S) -> Result<()> {
        sink.put(self.radius)?;
        sink.put(self.height)
    }

    fn decode<S: Source>(&mut self, source: &mut S) -> Result<()> {
        self.radius = source.take()?;
        self.height = source.take()?;
        Ok(())
    }
}
