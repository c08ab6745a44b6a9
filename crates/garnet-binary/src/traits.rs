use crate::error::Result;
use crate::io::{BinaryReader, BinaryWriter};
use bytes::{Buf, BufMut};

/// Trait for types that can be decoded from a binary buffer.
///
/// Multi-byte primitives use network byte order (big-endian).
pub trait Readable: Sized {
    /// Reads an instance of `Self` from the reader.
    fn read<B: Buf>(reader: &mut B) -> Result<Self>;
}

/// Trait for types that can be encoded into a binary buffer.
///
/// Multi-byte primitives use network byte order (big-endian).
pub trait Writable {
    /// Writes this instance to the writer.
    fn write<B: BufMut>(&self, writer: &mut B) -> Result<()>;
}

macro_rules! impl_primitive_readable {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl Readable for $ty {
                #[inline]
                fn read<B: Buf>(reader: &mut B) -> Result<Self> {
                    reader.$method()
                }
            }
        )*
    };
}

macro_rules! impl_primitive_writable {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl Writable for $ty {
                #[inline]
                fn write<B: BufMut>(&self, writer: &mut B) -> Result<()> {
                    writer.$method(*self)
                }
            }
        )*
    };
}

impl_primitive_readable! {
    u8 => read_u8,
    u16 => read_u16_be,
    u32 => read_u32_be,
    u64 => read_u64_be,
    bool => read_bool
}

impl_primitive_writable! {
    u8 => write_u8,
    u16 => write_u16_be,
    u32 => write_u32_be,
    u64 => write_u64_be,
    bool => write_bool
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_primitive_round_trip() {
        let mut writer = BytesMut::new();
        0xABu8.write(&mut writer).unwrap();
        0xBEEFu16.write(&mut writer).unwrap();
        0xDEAD_BEEFu32.write(&mut writer).unwrap();
        true.write(&mut writer).unwrap();

        let mut reader = writer.freeze();
        assert_eq!(u8::read(&mut reader).unwrap(), 0xAB);
        assert_eq!(u16::read(&mut reader).unwrap(), 0xBEEF);
        assert_eq!(u32::read(&mut reader).unwrap(), 0xDEAD_BEEF);
        assert!(bool::read(&mut reader).unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_primitives_are_network_order() {
        let mut writer = BytesMut::new();
        0x0102_0304u32.write(&mut writer).unwrap();
        assert_eq!(writer.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
    }
}
