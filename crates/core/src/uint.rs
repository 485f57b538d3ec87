//! Fixed-size hash wrappers.
//!
//! Stored little-endian in memory and on the wire; rendered big-endian with a
//! `0x` prefix, which is the conventional textual form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use helios_config::{ADDRESS_SIZE, HASH_SIZE};
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{Error, Result};

macro_rules! impl_uint {
    ($name:ident, $size:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        pub struct $name([u8; $size]);

        impl $name {
            /// Width of this hash in bytes.
            pub const SIZE: usize = $size;

            /// The all-zero value.
            pub fn zero() -> Self {
                Self([0u8; $size])
            }

            /// True when every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            /// Wraps a byte array directly.
            pub fn from_array(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            /// Copies from a slice, validating length.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                if bytes.len() != $size {
                    return Err(Error::InvalidFormat(format!(
                        "expected {} bytes, got {}",
                        $size,
                        bytes.len()
                    )));
                }
                let mut data = [0u8; $size];
                data.copy_from_slice(bytes);
                Ok(Self(data))
            }

            /// The little-endian byte representation.
            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            /// The little-endian bytes as a vector.
            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut reversed = self.0;
                reversed.reverse();
                write!(f, "0x{}", hex::encode(reversed))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let mut bytes = hex::decode(stripped)
                    .map_err(|e| Error::InvalidFormat(e.to_string()))?;
                bytes.reverse();
                Self::from_bytes(&bytes)
            }
        }

        impl Serializable for $name {
            fn size(&self) -> usize {
                $size
            }

            fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
                writer.write_bytes(&self.0)
            }

            fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
                let bytes = reader.read_bytes($size)?;
                let mut data = [0u8; $size];
                data.copy_from_slice(&bytes);
                Ok(Self(data))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

impl_uint!(UInt160, ADDRESS_SIZE, "A 160-bit script hash / account address.");
impl_uint!(UInt256, HASH_SIZE, "A 256-bit transaction or block hash.");

impl UInt160 {
    /// The script hash of `script`: RIPEMD-160 over SHA-256.
    pub fn from_script(script: &[u8]) -> Self {
        Self(helios_crypto::hash160(script))
    }
}

impl UInt256 {
    /// Double SHA-256 of `data`.
    pub fn hash_of(data: &[u8]) -> Self {
        Self(helios_crypto::hash256(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_reversed_hex() {
        let mut bytes = [0u8; 20];
        bytes[0] = 0x01;
        bytes[19] = 0xff;
        let value = UInt160::from_array(bytes);
        let text = value.to_string();
        assert!(text.starts_with("0xff"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn test_from_str_round_trip() {
        let value = UInt256::hash_of(b"genesis");
        let parsed: UInt256 = value.to_string().parse().unwrap();
        assert_eq!(value, parsed);
    }

    #[test]
    fn test_serializable_round_trip() {
        let value = UInt160::from_script(&[0x40]);
        let bytes = helios_io::to_bytes(&value).unwrap();
        assert_eq!(bytes.len(), 20);
        let back: UInt160 = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(UInt160::from_bytes(&[0u8; 19]).is_err());
        assert!(UInt256::from_bytes(&[0u8; 33]).is_err());
    }
}
