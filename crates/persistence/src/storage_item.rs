//! Storage values and their flags.

use serde::{Deserialize, Serialize};

use helios_io::{BinaryWriter, MemoryReader, Serializable};

/// A stored value plus its flag set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageItem {
    /// The raw value bytes.
    pub value: Vec<u8>,
    /// Constant items may never be overwritten or deleted.
    pub is_constant: bool,
}

impl StorageItem {
    /// A mutable item.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            is_constant: false,
        }
    }

    /// An item that refuses later modification.
    pub fn constant(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            is_constant: true,
        }
    }
}

impl Serializable for StorageItem {
    fn size(&self) -> usize {
        1 + helios_io::serializable::var_bytes_size(self.value.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_bool(self.is_constant)?;
        writer.write_var_bytes(&self.value)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let is_constant = reader.read_bool()?;
        let value = reader.read_var_bytes(u32::MAX as usize)?;
        Ok(Self { value, is_constant })
    }
}

impl From<Vec<u8>> for StorageItem {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_flags() {
        let item = StorageItem::constant(b"v".to_vec());
        let bytes = helios_io::to_bytes(&item).unwrap();
        let back: StorageItem = helios_io::from_bytes(&bytes).unwrap();
        assert!(back.is_constant);
        assert_eq!(back.value, b"v");
    }
}
