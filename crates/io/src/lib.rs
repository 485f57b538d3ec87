//! Binary serialization primitives for the Helios wire formats.
//!
//! All consensus-visible structures serialize through [`BinaryWriter`] and
//! [`MemoryReader`] so that the byte layout is bit-exact across nodes.

pub mod binary_writer;
pub mod memory_reader;
pub mod serializable;

pub use binary_writer::BinaryWriter;
pub use memory_reader::MemoryReader;
pub use serializable::Serializable;

/// Errors raised by binary encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected end of stream")]
    EndOfStream,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("format error: {0}")]
    Format(String),
}

/// The result type for IO operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Serializes a value into a fresh byte vector.
pub fn to_bytes<T: Serializable>(value: &T) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    value.serialize(&mut writer)?;
    Ok(writer.into_bytes())
}

/// Deserializes a value from a byte slice, requiring full consumption.
pub fn from_bytes<T: Serializable>(data: &[u8]) -> Result<T> {
    let mut reader = MemoryReader::new(data);
    let value = T::deserialize(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(Error::InvalidData(format!(
            "{} trailing bytes after deserialization",
            reader.remaining()
        )));
    }
    Ok(value)
}
