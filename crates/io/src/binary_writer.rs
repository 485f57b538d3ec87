//! Little-endian binary writer used by every wire format.

use crate::{Error, Result, Serializable};

/// Writes primitives into a growable buffer in wire order.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with a pre-allocated buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.push(value);
        Ok(())
    }

    /// Writes a boolean as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Writes a `u16` little-endian.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a `u32` little-endian.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes an `i32` little-endian.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a `u64` little-endian.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes an `i64` little-endian.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(value);
        Ok(())
    }

    /// Writes a variable-length integer.
    ///
    /// Values below 0xFD are a single byte; larger values use a marker byte
    /// (0xFD/0xFE/0xFF) followed by 2, 4 or 8 little-endian bytes.
    pub fn write_var_int(&mut self, value: u64) -> Result<()> {
        match value {
            0..=0xFC => self.write_u8(value as u8),
            0xFD..=0xFFFF => {
                self.write_u8(0xFD)?;
                self.write_u16(value as u16)
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.write_u8(0xFE)?;
                self.write_u32(value as u32)
            }
            _ => {
                self.write_u8(0xFF)?;
                self.write_u64(value)
            }
        }
    }

    /// Writes a length-prefixed byte string.
    pub fn write_var_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_var_int(value.len() as u64)?;
        self.write_bytes(value)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_var_string(&mut self, value: &str) -> Result<()> {
        self.write_var_bytes(value.as_bytes())
    }

    /// Writes a fixed-width UTF-8 string, zero-padded to `width`.
    pub fn write_fixed_string(&mut self, value: &str, width: usize) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() > width {
            return Err(Error::OutOfRange(format!(
                "string of {} bytes does not fit {} byte field",
                bytes.len(),
                width
            )));
        }
        self.write_bytes(bytes)?;
        for _ in bytes.len()..width {
            self.write_u8(0)?;
        }
        Ok(())
    }

    /// Writes a serializable value.
    pub fn write_serializable<T: Serializable>(&mut self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    /// Writes a var-int count followed by each element.
    pub fn write_serializable_list<T: Serializable>(&mut self, value: &[T]) -> Result<()> {
        self.write_var_int(value.len() as u64)?;
        for item in value {
            item.serialize(self)?;
        }
        Ok(())
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns a copy of the accumulated bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_int_boundaries() {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(0xFC).unwrap();
        writer.write_var_int(0xFD).unwrap();
        writer.write_var_int(0x1_0000).unwrap();
        writer.write_var_int(0x1_0000_0000).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xFC);
        assert_eq!(bytes[1], 0xFD);
        assert_eq!(&bytes[2..4], &[0xFD, 0x00]);
        assert_eq!(bytes[4], 0xFE);
        assert_eq!(bytes[9], 0xFF);
    }

    #[test]
    fn test_fixed_string_pads_with_zeros() {
        let mut writer = BinaryWriter::new();
        writer.write_fixed_string("abc", 8).unwrap();
        assert_eq!(writer.into_bytes(), b"abc\0\0\0\0\0");
    }

    #[test]
    fn test_fixed_string_overflow_rejected() {
        let mut writer = BinaryWriter::new();
        assert!(writer.write_fixed_string("too long", 4).is_err());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(0x0102_0304).unwrap();
        assert_eq!(writer.into_bytes(), vec![0x04, 0x03, 0x02, 0x01]);
    }
}
