//! Fixed-size little-endian scalars

use byteorder::{ByteOrder, LittleEndian};

/// A plain value with a fixed little-endian byte representation
///
/// The slice methods copy whole runs at once; `src` and `dst` are always
/// exactly `count * SIZE` bytes long.
pub trait Scalar: Copy + Default {
    const SIZE: usize;

    fn write_le(self, dst: &mut [u8]);
    fn read_le(src: &[u8]) -> Self;
    fn write_slice_le(src: &[Self], dst: &mut [u8]);
    fn read_slice_le(src: &[u8], dst: &mut [Self]);
}

impl Scalar for u8 {
    const SIZE: usize = 1;

    fn write_le(self, dst: &mut [u8]) {
        dst[0] = self;
    }

    fn read_le(src: &[u8]) -> Self {
        src[0]
    }

    fn write_slice_le(src: &[Self], dst: &mut [u8]) {
        dst.copy_from_slice(src);
    }

    fn read_slice_le(src: &[u8], dst: &mut [Self]) {
        dst.copy_from_slice(src);
    }
}

impl Scalar for i8 {
    const SIZE: usize = 1;

    fn write_le(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn read_le(src: &[u8]) -> Self {
        src[0] as i8
    }

    fn write_slice_le(src: &[Self], dst: &mut [u8]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s as u8;
        }
    }

    fn read_slice_le(src: &[u8], dst: &mut [Self]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s as i8;
        }
    }
}

macro_rules! byteorder_scalar {
    ($ty:ty, $size:expr, $write:ident, $read:ident, $write_into:ident, $read_into:ident) => {
        impl Scalar for $ty {
            const SIZE: usize = $size;

            fn write_le(self, dst: &mut [u8]) {
                LittleEndian::$write(dst, self);
            }

            fn read_le(src: &[u8]) -> Self {
                LittleEndian::$read(src)
            }

            fn write_slice_le(src: &[Self], dst: &mut [u8]) {
                LittleEndian::$write_into(src, dst);
            }

            fn read_slice_le(src: &[u8], dst: &mut [Self]) {
                LittleEndian::$read_into(src, dst);
            }
        }
    };
}

byteorder_scalar!(u16, 2, write_u16, read_u16, write_u16_into, read_u16_into);
byteorder_scalar!(i16, 2, write_i16, read_i16, write_i16_into, read_i16_into);
byteorder_scalar!(u32, 4, write_u32, read_u32, write_u32_into, read_u32_into);
byteorder_scalar!(i32, 4, write_i32, read_i32, write_i32_into, read_i32_into);
byteorder_scalar!(u64, 8, write_u64, read_u64, write_u64_into, read_u64_into);
byteorder_scalar!(i64, 8, write_i64, read_i64, write_i64_into, read_i64_into);
byteorder_scalar!(f32, 4, write_f32, read_f32, write_f32_into, read_f32_into);
byteorder_scalar!(f64, 8, write_f64, read_f64, write_f64_into, read_f64_into);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.write_le(&mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(u32::read_le(&buf), 0x0102_0304);
    }

    #[test]
    fn test_slice_copy() {
        let values = [1.5f32, -2.0, 3.25];
        let mut buf = [0u8; 12];
        f32::write_slice_le(&values, &mut buf);

        let mut back = [0f32; 3];
        f32::read_slice_le(&buf, &mut back);
        assert_eq!(values, back);
    }

    #[test]
    fn test_signed_bytes() {
        let mut buf = [0u8; 2];
        i8::write_slice_le(&[-1, 5], &mut buf);
        assert_eq!(buf, [0xff, 5]);
    }
}
