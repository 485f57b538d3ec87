//! The NEF contract executable envelope.

use serde::{Deserialize, Serialize};

use helios_config::MAX_SCRIPT_SIZE;
use helios_crypto::hash256;
use helios_io::serializable::var_bytes_size;
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{Error, Result};

/// Magic bytes "NEF3" as a little-endian u32.
pub const NEF_MAGIC: u32 = 0x3346_454E;

/// Width of the compiler field.
const COMPILER_FIELD_SIZE: usize = 64;

/// The on-disk executable: magic, compiler tag, script, checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NefFile {
    /// Tool that produced the script, zero-padded to 64 bytes on the wire.
    pub compiler: String,
    /// The bytecode.
    pub script: Vec<u8>,
    /// First 4 bytes of double-SHA256 over everything before the checksum.
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF with a freshly computed checksum.
    pub fn new(compiler: impl Into<String>, script: Vec<u8>) -> Result<Self> {
        let mut file = Self {
            compiler: compiler.into(),
            script,
            checksum: 0,
        };
        file.checksum = file.compute_checksum()?;
        Ok(file)
    }

    fn header_and_body(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        writer.write_u32(NEF_MAGIC)?;
        writer.write_fixed_string(&self.compiler, COMPILER_FIELD_SIZE)?;
        writer.write_u16(0)?; // reserved
        writer.write_var_int(0)?; // method tokens, none supported
        writer.write_u16(0)?; // reserved
        writer.write_var_bytes(&self.script)?;
        Ok(writer.into_bytes())
    }

    /// The checksum the current contents imply.
    pub fn compute_checksum(&self) -> Result<u32> {
        let body = self.header_and_body()?;
        let digest = hash256(&body);
        Ok(u32::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3],
        ]))
    }

    /// Validates script presence and checksum integrity.
    pub fn validate(&self) -> Result<()> {
        if self.script.is_empty() {
            return Err(Error::InvalidNef("empty script".into()));
        }
        if self.script.len() > MAX_SCRIPT_SIZE {
            return Err(Error::InvalidNef(format!(
                "script of {} bytes exceeds the limit",
                self.script.len()
            )));
        }
        let expected = self.compute_checksum()?;
        if expected != self.checksum {
            return Err(Error::InvalidNef(format!(
                "checksum mismatch: stored {:08x}, computed {expected:08x}",
                self.checksum
            )));
        }
        Ok(())
    }
}

impl Serializable for NefFile {
    fn size(&self) -> usize {
        4 + COMPILER_FIELD_SIZE + 2 + 1 + 2 + var_bytes_size(self.script.len()) + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_u32(NEF_MAGIC)?;
        writer.write_fixed_string(&self.compiler, COMPILER_FIELD_SIZE)?;
        writer.write_u16(0)?;
        writer.write_var_int(0)?;
        writer.write_u16(0)?;
        writer.write_var_bytes(&self.script)?;
        writer.write_u32(self.checksum)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let magic = reader.read_u32()?;
        if magic != NEF_MAGIC {
            return Err(helios_io::Error::InvalidData(format!(
                "bad NEF magic {magic:08x}"
            )));
        }
        let compiler = reader.read_fixed_string(COMPILER_FIELD_SIZE)?;
        let _reserved = reader.read_u16()?;
        let tokens = reader.read_var_int(128)?;
        if tokens != 0 {
            return Err(helios_io::Error::InvalidData(
                "method tokens are not supported".into(),
            ));
        }
        let _reserved = reader.read_u16()?;
        let script = reader.read_var_bytes(MAX_SCRIPT_SIZE)?;
        let checksum = reader.read_u32()?;
        Ok(Self {
            compiler,
            script,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_validate() {
        let nef = NefFile::new("helios-test-compiler", vec![0x40]).unwrap();
        assert!(nef.validate().is_ok());
        let bytes = helios_io::to_bytes(&nef).unwrap();
        let back: NefFile = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(nef, back);
    }

    #[test]
    fn test_tampered_script_fails_checksum() {
        let mut nef = NefFile::new("helios-test-compiler", vec![0x40]).unwrap();
        nef.script = vec![0x41];
        assert!(nef.validate().is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let nef = NefFile::new("c", vec![0x40]).unwrap();
        let mut bytes = helios_io::to_bytes(&nef).unwrap();
        bytes[0] ^= 0xFF;
        assert!(helios_io::from_bytes::<NefFile>(&bytes).is_err());
    }
}
