//! Measuring visitor

use navmesh_common::SerializationError;

use crate::format::Sink;
use crate::scalar::Scalar;

/// Counts the bytes a value would occupy without writing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeAccumulator {
    size: usize,
}

impl SizeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Sink for SizeAccumulator {
    fn put<T: Scalar>(&mut self, _value: T) -> Result<(), SerializationError> {
        self.size += T::SIZE;
        Ok(())
    }

    fn put_slice<T: Scalar>(&mut self, values: &[T]) -> Result<(), SerializationError> {
        self.size += values.len() * T::SIZE;
        Ok(())
    }
}
