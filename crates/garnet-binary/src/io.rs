//! Extension traits over `bytes::Buf` and `bytes::BufMut` for checked,
//! endian-explicit reads and writes.

use crate::error::{BinaryError, Result};
use bytes::{Buf, BufMut, Bytes};

/// Checks if the buffer has enough remaining bytes and returns an error if not.
macro_rules! check_remaining {
    ($buf:expr, $len:expr) => {
        let needed = $len;
        let remaining = $buf.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
    };
}

/// Extension trait for `bytes::Buf` providing checked reads of primitive types.
pub trait BinaryReader: Buf {
    /// Reads a single `u8` byte.
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    /// Reads a single byte as a boolean (`0x00` is false, anything else is true).
    #[inline]
    fn read_bool(&mut self) -> Result<bool> {
        check_remaining!(self, 1);
        Ok(self.get_u8() != 0)
    }

    /// Reads a `u16` in little-endian format.
    #[inline]
    fn read_u16_le(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16_le())
    }

    /// Reads a `u16` in big-endian format.
    #[inline]
    fn read_u16_be(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16())
    }

    /// Reads a `u32` in little-endian format.
    #[inline]
    fn read_u32_le(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32_le())
    }

    /// Reads a `u32` in big-endian format.
    #[inline]
    fn read_u32_be(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32())
    }

    /// Reads a `u64` in little-endian format.
    #[inline]
    fn read_u64_le(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64_le())
    }

    /// Reads a `u64` in big-endian format.
    #[inline]
    fn read_u64_be(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64())
    }

    /// Reads a byte slice with a fixed length.
    /// Returns a `Bytes` slice which avoids copying when possible.
    fn read_bytes(&mut self, len: usize) -> Result<Bytes>
    where
        Self: Sized,
    {
        check_remaining!(self, len);
        Ok(self.copy_to_bytes(len))
    }

    /// Reads the remaining bytes in the buffer.
    fn read_remaining_bytes(&mut self) -> Bytes
    where
        Self: Sized,
    {
        self.copy_to_bytes(self.remaining())
    }
}

// Implement the trait for all types that implement `Buf`.
impl<T: Buf> BinaryReader for T {}

/// Extension trait for `bytes::BufMut` providing writes of primitive types.
pub trait BinaryWriter: BufMut {
    /// Writes a single `u8` byte.
    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put_u8(value);
        Ok(())
    }

    /// Writes a boolean as a single byte (`0x01` for true, `0x00` for false).
    #[inline]
    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put_u8(if value { 1 } else { 0 });
        Ok(())
    }

    /// Writes a `u16` in little-endian format.
    #[inline]
    fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.put_u16_le(value);
        Ok(())
    }

    /// Writes a `u16` in big-endian format.
    #[inline]
    fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.put_u16(value);
        Ok(())
    }

    /// Writes a `u32` in little-endian format.
    #[inline]
    fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.put_u32_le(value);
        Ok(())
    }

    /// Writes a `u32` in big-endian format.
    #[inline]
    fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.put_u32(value);
        Ok(())
    }

    /// Writes a `u64` in little-endian format.
    #[inline]
    fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.put_u64_le(value);
        Ok(())
    }

    /// Writes a `u64` in big-endian format.
    #[inline]
    fn write_u64_be(&mut self, value: u64) -> Result<()> {
        self.put_u64(value);
        Ok(())
    }

    /// Writes a raw byte slice (without length prefix).
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_slice(bytes);
        Ok(())
    }
}

// Implement the trait for all types that implement `BufMut`.
impl<T: BufMut> BinaryWriter for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn test_u8_bool() {
        let mut writer = BytesMut::new();
        writer.write_u8(0xAB).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_bool(false).unwrap();

        let mut reader = writer.freeze();
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert!(matches!(
            reader.read_u8(),
            Err(BinaryError::UnexpectedEof { needed: 1, remaining: 0 })
        ));
    }

    #[test]
    fn test_endianness_u16() {
        let value: u16 = 0xABCD;
        // LE: CD AB
        // BE: AB CD
        let mut writer_le = BytesMut::new();
        writer_le.write_u16_le(value).unwrap();
        assert_eq!(writer_le.as_ref(), &[0xCD, 0xAB]);
        let mut reader_le = writer_le.freeze();
        assert_eq!(reader_le.read_u16_le().unwrap(), value);

        let mut writer_be = BytesMut::new();
        writer_be.write_u16_be(value).unwrap();
        assert_eq!(writer_be.as_ref(), &[0xAB, 0xCD]);
        let mut reader_be = writer_be.freeze();
        assert_eq!(reader_be.read_u16_be().unwrap(), value);
    }

    #[test]
    fn test_endianness_u32() {
        let value: u32 = 0x1234_5678;
        let mut writer_le = BytesMut::new();
        writer_le.write_u32_le(value).unwrap();
        assert_eq!(writer_le.as_ref(), &[0x78, 0x56, 0x34, 0x12]);
        let mut reader_le = writer_le.freeze();
        assert_eq!(reader_le.read_u32_le().unwrap(), value);

        let mut writer_be = BytesMut::new();
        writer_be.write_u32_be(value).unwrap();
        assert_eq!(writer_be.as_ref(), &[0x12, 0x34, 0x56, 0x78]);
        let mut reader_be = writer_be.freeze();
        assert_eq!(reader_be.read_u32_be().unwrap(), value);
    }

    #[test]
    fn test_endianness_u64() {
        let value: u64 = 0x0102_0304_0506_0708;
        let mut writer = BytesMut::new();
        writer.write_u64_be(value).unwrap();
        writer.write_u64_le(value).unwrap();
        assert_eq!(
            writer.as_ref(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 8, 7, 6, 5, 4, 3, 2, 1]
        );

        let mut reader = writer.freeze();
        assert_eq!(reader.read_u64_be().unwrap(), value);
        assert_eq!(reader.read_u64_le().unwrap(), value);
    }

    #[test]
    fn test_u32_eof() {
        let mut short = Bytes::from_static(&[0x01, 0x02, 0x03]);
        assert!(matches!(
            short.read_u32_be(),
            Err(BinaryError::UnexpectedEof { needed: 4, remaining: 3 })
        ));
    }

    #[test]
    fn test_bytes_and_remaining() {
        let mut writer = BytesMut::new();
        writer.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]).unwrap();

        let mut reader = writer.freeze();
        assert_eq!(reader.read_bytes(4).unwrap().as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(reader.read_remaining_bytes().as_ref(), &[0xCA, 0xFE]);
        assert!(reader.is_empty());
        assert!(matches!(
            reader.read_bytes(1),
            Err(BinaryError::UnexpectedEof { needed: 1, remaining: 0 })
        ));
    }
}
