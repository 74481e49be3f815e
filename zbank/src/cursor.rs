//! Bounds-checked big-endian readers and writers
//!
//! Every multi-byte value in the bank format is big-endian; that is a
//! format constant, so these helpers expose no endianness choice. Reads
//! and writes past the end of a blob fail with
//! [`BankError::OutOfBounds`] carrying the offending offset and length,
//! never clamping or zero-filling.

use crate::error::BankError;
use crate::SECTION_ALIGN;

/// Positioned reader over a fixed binary blob
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a cursor positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, pos: offset }
    }

    /// Current read position
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the read position to an absolute offset
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    /// Total blob size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the blob is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BankError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(BankError::OutOfBounds {
                offset: self.pos,
                len,
                size: self.data.len(),
            }),
        }
    }

    /// Read `len` raw bytes at the current position
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BankError> {
        self.take(len)
    }

    /// Read a u8 at the current position
    pub fn read_u8(&mut self) -> Result<u8, BankError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16 at the current position
    pub fn read_u16(&mut self) -> Result<u16, BankError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian i16 at the current position
    pub fn read_i16(&mut self) -> Result<i16, BankError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u32 at the current position
    pub fn read_u32(&mut self) -> Result<u32, BankError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian f32 at the current position
    pub fn read_f32(&mut self) -> Result<f32, BankError> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}

/// Growable big-endian writer with alignment and pointer-patching support
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position (end of the buffer)
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a u8
    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    /// Append a big-endian u16
    pub fn write_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Append a big-endian i16
    pub fn write_i16(&mut self, val: i16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Append a big-endian u32
    pub fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Append a big-endian f32
    pub fn write_f32(&mut self, val: f32) {
        self.write_u32(val.to_bits());
    }

    /// Zero-fill up to the next multiple of `align`
    pub fn align_to(&mut self, align: usize) {
        while self.buf.len() % align != 0 {
            self.buf.push(0);
        }
    }

    /// Zero-fill up to the next section boundary
    pub fn align_section(&mut self) {
        self.align_to(SECTION_ALIGN);
    }

    /// Overwrite a previously written big-endian u32 at `offset`
    pub fn patch_u32(&mut self, offset: usize, val: u32) -> Result<(), BankError> {
        if offset + 4 > self.buf.len() {
            return Err(BankError::OutOfBounds {
                offset,
                len: 4,
                size: self.buf.len(),
            });
        }
        self.buf[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    /// Consume the writer and return the finished blob
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0xFF, 0xFE];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_u32().unwrap(), 0x12345678);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.pos(), 6);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let data = [0u8; 4];
        let mut cursor = Cursor::at(&data, 2);
        assert_eq!(
            cursor.read_u32(),
            Err(BankError::OutOfBounds {
                offset: 2,
                len: 4,
                size: 4,
            })
        );
    }

    #[test]
    fn test_read_past_end_never_clamps() {
        let data = [1u8, 2];
        let mut cursor = Cursor::new(&data);
        assert!(cursor.read_bytes(3).is_err());
        // Position is untouched by a failed read
        assert_eq!(cursor.pos(), 0);
        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_seek_overflow_is_rejected() {
        let data = [0u8; 8];
        let mut cursor = Cursor::at(&data, usize::MAX);
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_writer_roundtrip() {
        let mut writer = Writer::new();
        writer.write_u32(0xDEADBEEF);
        writer.write_i16(-3);
        writer.write_f32(1.5);
        let bytes = writer.into_bytes();

        let mut cursor = Cursor::new(&bytes);
        assert_eq!(cursor.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(cursor.read_i16().unwrap(), -3);
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn test_writer_align_and_patch() {
        let mut writer = Writer::new();
        writer.write_u32(0);
        writer.align_section();
        assert_eq!(writer.pos(), 16);
        writer.patch_u32(0, 0x40).unwrap();
        assert!(writer.patch_u32(14, 0).is_err());

        let bytes = writer.into_bytes();
        assert_eq!(&bytes[..4], &[0, 0, 0, 0x40]);
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }
}
