//! Little-endian byte cursor for container decoding
//!
//! All multi-byte fields in the `.nfx` format are little-endian. Strings are
//! u16 length-prefixed UTF-8.

use crate::error::FxError;

/// Bounds-checked little-endian reader over a byte slice.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the slice.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FxError> {
        let end = self.pos.checked_add(len).ok_or(FxError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(FxError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, FxError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, FxError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, FxError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FxError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, FxError> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, FxError> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a u16 length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str, FxError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| FxError::InvalidString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scalars() {
        let data = [0x2A, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x01];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x2A);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0x12345678);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn test_read_i32_negative() {
        let data = (-1i32).to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_i32().unwrap(), -1);
    }

    #[test]
    fn test_read_f32() {
        let data = 1.5f32.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn test_read_str() {
        let mut data = vec![5u8, 0u8];
        data.extend_from_slice(b"hello");
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_str().unwrap(), "hello");
    }

    #[test]
    fn test_read_str_invalid_utf8() {
        let data = [2u8, 0u8, 0xFF, 0xFE];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_str(), Err(FxError::InvalidString));
    }

    #[test]
    fn test_remaining() {
        let data = [0u8; 6];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.remaining(), 6);
        r.read_u32().unwrap();
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_eof() {
        let data = [1u8, 2u8];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u32(), Err(FxError::UnexpectedEof));
        // A failed read does not advance the cursor
        assert_eq!(r.read_u16().unwrap(), 0x0201);
    }
}
