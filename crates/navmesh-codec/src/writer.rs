//! Serializing visitor over a pre-sized buffer

use navmesh_common::SerializationError;

use crate::format::Sink;
use crate::scalar::Scalar;

/// Writes values into a fixed destination buffer, advancing a cursor
///
/// The buffer is never grown. A write that does not fit fails with
/// `InsufficientSpace` and leaves both the cursor and the buffer untouched.
pub struct BinaryWriter<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> BinaryWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    fn reserve(&mut self, len: Option<usize>) -> Result<&mut [u8], SerializationError> {
        let available = self.remaining();
        match len {
            Some(len) if len <= available => {
                let start = self.position;
                self.position += len;
                Ok(&mut self.buffer[start..start + len])
            }
            _ => Err(SerializationError::InsufficientSpace {
                needed: len.unwrap_or(usize::MAX),
                available,
            }),
        }
    }
}

impl Sink for BinaryWriter<'_> {
    fn put<T: Scalar>(&mut self, value: T) -> Result<(), SerializationError> {
        let dst = self.reserve(Some(T::SIZE))?;
        value.write_le(dst);
        Ok(())
    }

    fn put_slice<T: Scalar>(&mut self, values: &[T]) -> Result<(), SerializationError> {
        let dst = self.reserve(values.len().checked_mul(T::SIZE))?;
        T::write_slice_le(values, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_advance_cursor() -> Result<(), SerializationError> {
        let mut buf = [0u8; 7];
        let mut writer = BinaryWriter::new(&mut buf);
        writer.put(0xabu8)?;
        writer.put_slice(&[1u16, 2, 3])?;
        assert_eq!(writer.position(), 7);
        assert_eq!(writer.remaining(), 0);
        assert_eq!(buf, [0xab, 1, 0, 2, 0, 3, 0]);
        Ok(())
    }

    #[test]
    fn test_insufficient_space_leaves_buffer_untouched() {
        let mut buf = [0u8; 6];
        let mut writer = BinaryWriter::new(&mut buf);
        assert!(writer.put(7u16).is_ok());

        let err = writer.put_slice(&[1u32, 2]).unwrap_err();
        assert_eq!(
            err,
            SerializationError::InsufficientSpace {
                needed: 8,
                available: 4
            }
        );
        assert_eq!(writer.position(), 2);
        assert_eq!(buf, [7, 0, 0, 0, 0, 0]);
    }
}
