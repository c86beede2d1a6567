//! Deserializing visitor over a byte slice

use navmesh_common::SerializationError;

use crate::format::{Format, Source};
use crate::scalar::Scalar;

/// Reads values from a byte slice, advancing a cursor
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Decodes a fresh value; nothing is returned unless every field decodes
    pub fn read<T: Format + Default>(&mut self) -> Result<T, SerializationError> {
        let mut value = T::default();
        value.decode(self)?;
        Ok(value)
    }

    /// Borrows the next `len` bytes without copying them
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SerializationError> {
        self.consume(Some(len))
    }

    fn consume(&mut self, len: Option<usize>) -> Result<&'a [u8], SerializationError> {
        let available = self.data.len() - self.position;
        match len {
            Some(len) if len <= available => {
                let data = self.data;
                let start = self.position;
                self.position += len;
                Ok(&data[start..start + len])
            }
            _ => Err(SerializationError::InsufficientData {
                needed: len.unwrap_or(usize::MAX),
                available,
            }),
        }
    }
}

impl Source for BinaryReader<'_> {
    fn take<T: Scalar>(&mut self) -> Result<T, SerializationError> {
        let src = self.consume(Some(T::SIZE))?;
        Ok(T::read_le(src))
    }

    fn take_into<T: Scalar>(&mut self, dst: &mut [T]) -> Result<(), SerializationError> {
        let src = self.consume(dst.len().checked_mul(T::SIZE))?;
        T::read_slice_le(src, dst);
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}
