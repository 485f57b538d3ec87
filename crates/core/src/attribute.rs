//! Transaction attributes, including the oracle response envelope.

use serde::{Deserialize, Serialize};

use helios_io::serializable::var_bytes_size;
use helios_io::{BinaryWriter, MemoryReader, Serializable};

/// Largest oracle result payload carried in an attribute.
pub const MAX_ORACLE_RESULT_SIZE: usize = 0xFFFF;

/// Outcome classification of one oracle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OracleResponseCode {
    /// The request succeeded and `result` holds the filtered payload.
    Success = 0x00,
    /// The URL scheme is not one of the supported protocols.
    ProtocolNotSupported = 0x10,
    /// Oracle nodes could not agree before the request expired.
    ConsensusUnreachable = 0x12,
    /// The remote endpoint returned 404.
    NotFound = 0x14,
    /// The fetch timed out.
    Timeout = 0x16,
    /// The remote endpoint denied access, or a redirect was disallowed.
    Forbidden = 0x18,
    /// The response body exceeded the size ceiling.
    ResponseTooLarge = 0x1A,
    /// The requester cannot pay for the response transaction.
    InsufficientFunds = 0x1C,
    /// The response content type is not allow-listed.
    ContentTypeNotSupported = 0x1F,
    /// Any other failure.
    Error = 0xFF,
}

impl OracleResponseCode {
    /// Parses a code byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x10 => Some(Self::ProtocolNotSupported),
            0x12 => Some(Self::ConsensusUnreachable),
            0x14 => Some(Self::NotFound),
            0x16 => Some(Self::Timeout),
            0x18 => Some(Self::Forbidden),
            0x1A => Some(Self::ResponseTooLarge),
            0x1C => Some(Self::InsufficientFunds),
            0x1F => Some(Self::ContentTypeNotSupported),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// A typed attribute attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAttribute {
    /// Marks a transaction for priority pooling; committee-gated.
    HighPriority,
    /// Carries an oracle response; only valid on oracle response
    /// transactions assembled by the designated oracle nodes.
    OracleResponse {
        /// The request this responds to.
        id: u64,
        /// Outcome classification.
        code: OracleResponseCode,
        /// Filtered result payload; empty unless `code` is `Success`.
        result: Vec<u8>,
    },
}

impl TransactionAttribute {
    const TYPE_HIGH_PRIORITY: u8 = 0x01;
    const TYPE_ORACLE_RESPONSE: u8 = 0x11;

    /// The wire type byte.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::HighPriority => Self::TYPE_HIGH_PRIORITY,
            Self::OracleResponse { .. } => Self::TYPE_ORACLE_RESPONSE,
        }
    }

    /// The oracle response fields, when this is an oracle response.
    pub fn as_oracle_response(&self) -> Option<(u64, OracleResponseCode, &[u8])> {
        match self {
            Self::OracleResponse { id, code, result } => Some((*id, *code, result)),
            _ => None,
        }
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        match self {
            Self::HighPriority => 1,
            Self::OracleResponse { result, .. } => 1 + 8 + 1 + var_bytes_size(result.len()),
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_u8(self.type_byte())?;
        match self {
            Self::HighPriority => Ok(()),
            Self::OracleResponse { id, code, result } => {
                writer.write_u64(*id)?;
                writer.write_u8(*code as u8)?;
                writer.write_var_bytes(result)
            }
        }
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        match reader.read_u8()? {
            Self::TYPE_HIGH_PRIORITY => Ok(Self::HighPriority),
            Self::TYPE_ORACLE_RESPONSE => {
                let id = reader.read_u64()?;
                let code_byte = reader.read_u8()?;
                let code = OracleResponseCode::from_byte(code_byte).ok_or_else(|| {
                    helios_io::Error::InvalidData(format!(
                        "unknown oracle response code 0x{code_byte:02x}"
                    ))
                })?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(helios_io::Error::InvalidData(
                        "non-success oracle response carries a result".into(),
                    ));
                }
                Ok(Self::OracleResponse { id, code, result })
            }
            other => Err(helios_io::Error::InvalidData(format!(
                "unknown attribute type 0x{other:02x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_response_round_trip() {
        let attr = TransactionAttribute::OracleResponse {
            id: 42,
            code: OracleResponseCode::Success,
            result: b"42".to_vec(),
        };
        let bytes = helios_io::to_bytes(&attr).unwrap();
        assert_eq!(bytes.len(), attr.size());
        let back: TransactionAttribute = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(attr, back);
    }

    #[test]
    fn test_failed_response_must_be_empty() {
        let attr = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: b"late".to_vec(),
        };
        let bytes = helios_io::to_bytes(&attr).unwrap();
        assert!(helios_io::from_bytes::<TransactionAttribute>(&bytes).is_err());
    }

    #[test]
    fn test_unknown_attribute_type_rejected() {
        assert!(helios_io::from_bytes::<TransactionAttribute>(&[0x77]).is_err());
    }
}
