//! Consensus message types and their extensible-payload envelope.

use helios_config::MAX_TRANSACTIONS_PER_BLOCK;
use helios_core::{UInt160, UInt256, Witness};
use helios_crypto::hash256;
use helios_io::serializable::{var_bytes_size, var_int_size};
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{Error, Result};

/// The category every consensus payload travels under.
pub const PAYLOAD_CATEGORY: &str = "dBFT";

/// Discriminates the dBFT message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConsensusMessageType {
    /// A backup asks to move to the next view.
    ChangeView = 0x00,
    /// The primary proposes a candidate block.
    PrepareRequest = 0x20,
    /// A backup accepts the proposal.
    PrepareResponse = 0x21,
    /// A validator commits with its block signature.
    Commit = 0x30,
    /// A node asks peers for recovery data.
    RecoveryRequest = 0x40,
    /// A node replays its view of the round.
    RecoveryMessage = 0x41,
}

impl ConsensusMessageType {
    /// Parses a message type byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::ChangeView),
            0x20 => Some(Self::PrepareRequest),
            0x21 => Some(Self::PrepareResponse),
            0x30 => Some(Self::Commit),
            0x40 => Some(Self::RecoveryRequest),
            0x41 => Some(Self::RecoveryMessage),
            _ => None,
        }
    }
}

/// One dBFT message: common header plus a kind-specific body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    /// Kind of message.
    pub message_type: ConsensusMessageType,
    /// Height the message refers to.
    pub block_index: u32,
    /// Index of the sending validator.
    pub validator_index: u8,
    /// View the message belongs to.
    pub view_number: u8,
    /// Kind-specific body.
    pub body: ConsensusMessageBody,
}

/// The kind-specific portion of a consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessageBody {
    /// New view requested, with the sender's clock.
    ChangeView {
        /// Sender timestamp, milliseconds.
        timestamp: u64,
    },
    /// The candidate block proposal.
    PrepareRequest {
        /// Proposed block timestamp.
        timestamp: u64,
        /// Proposal entropy.
        nonce: u64,
        /// Hashes of the proposed transactions, in order.
        transaction_hashes: Vec<UInt256>,
    },
    /// Acceptance of the proposal identified by its preparation hash.
    PrepareResponse {
        /// Hash of the PrepareRequest payload being answered.
        preparation_hash: UInt256,
    },
    /// The sender's signature over the candidate block header.
    Commit {
        /// 64-byte block signature.
        signature: Vec<u8>,
    },
    /// Plea for retransmission.
    RecoveryRequest {
        /// Sender timestamp, milliseconds.
        timestamp: u64,
    },
    /// Replay of everything the sender knows about the round.
    RecoveryMessage {
        /// Raw serialized messages, replayed verbatim.
        payloads: Vec<Vec<u8>>,
    },
}

impl ConsensusMessage {
    /// The message type implied by the body.
    fn body_type(body: &ConsensusMessageBody) -> ConsensusMessageType {
        match body {
            ConsensusMessageBody::ChangeView { .. } => ConsensusMessageType::ChangeView,
            ConsensusMessageBody::PrepareRequest { .. } => ConsensusMessageType::PrepareRequest,
            ConsensusMessageBody::PrepareResponse { .. } => ConsensusMessageType::PrepareResponse,
            ConsensusMessageBody::Commit { .. } => ConsensusMessageType::Commit,
            ConsensusMessageBody::RecoveryRequest { .. } => ConsensusMessageType::RecoveryRequest,
            ConsensusMessageBody::RecoveryMessage { .. } => ConsensusMessageType::RecoveryMessage,
        }
    }

    /// Creates a message, deriving the type tag from the body.
    pub fn new(
        block_index: u32,
        validator_index: u8,
        view_number: u8,
        body: ConsensusMessageBody,
    ) -> Self {
        Self {
            message_type: Self::body_type(&body),
            block_index,
            validator_index,
            view_number,
            body,
        }
    }
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        let body = match &self.body {
            ConsensusMessageBody::ChangeView { .. } => 8,
            ConsensusMessageBody::PrepareRequest {
                transaction_hashes, ..
            } => 8 + 8 + var_int_size(transaction_hashes.len() as u64)
                + transaction_hashes.len() * UInt256::SIZE,
            ConsensusMessageBody::PrepareResponse { .. } => UInt256::SIZE,
            ConsensusMessageBody::Commit { signature } => var_bytes_size(signature.len()),
            ConsensusMessageBody::RecoveryRequest { .. } => 8,
            ConsensusMessageBody::RecoveryMessage { payloads } => {
                var_int_size(payloads.len() as u64)
                    + payloads.iter().map(|p| var_bytes_size(p.len())).sum::<usize>()
            }
        };
        1 + 4 + 1 + 1 + body
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_u8(self.message_type as u8)?;
        writer.write_u32(self.block_index)?;
        writer.write_u8(self.validator_index)?;
        writer.write_u8(self.view_number)?;
        match &self.body {
            ConsensusMessageBody::ChangeView { timestamp }
            | ConsensusMessageBody::RecoveryRequest { timestamp } => writer.write_u64(*timestamp),
            ConsensusMessageBody::PrepareRequest {
                timestamp,
                nonce,
                transaction_hashes,
            } => {
                writer.write_u64(*timestamp)?;
                writer.write_u64(*nonce)?;
                writer.write_serializable_list(transaction_hashes)
            }
            ConsensusMessageBody::PrepareResponse { preparation_hash } => {
                writer.write_serializable(preparation_hash)
            }
            ConsensusMessageBody::Commit { signature } => writer.write_var_bytes(signature),
            ConsensusMessageBody::RecoveryMessage { payloads } => {
                writer.write_var_int(payloads.len() as u64)?;
                for payload in payloads {
                    writer.write_var_bytes(payload)?;
                }
                Ok(())
            }
        }
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let type_byte = reader.read_u8()?;
        let message_type = ConsensusMessageType::from_byte(type_byte).ok_or_else(|| {
            helios_io::Error::InvalidData(format!("unknown consensus message 0x{type_byte:02x}"))
        })?;
        let block_index = reader.read_u32()?;
        let validator_index = reader.read_u8()?;
        let view_number = reader.read_u8()?;
        let body = match message_type {
            ConsensusMessageType::ChangeView => ConsensusMessageBody::ChangeView {
                timestamp: reader.read_u64()?,
            },
            ConsensusMessageType::PrepareRequest => ConsensusMessageBody::PrepareRequest {
                timestamp: reader.read_u64()?,
                nonce: reader.read_u64()?,
                transaction_hashes: reader
                    .read_serializable_list(MAX_TRANSACTIONS_PER_BLOCK)?,
            },
            ConsensusMessageType::PrepareResponse => ConsensusMessageBody::PrepareResponse {
                preparation_hash: reader.read_serializable()?,
            },
            ConsensusMessageType::Commit => ConsensusMessageBody::Commit {
                signature: reader.read_var_bytes(64)?,
            },
            ConsensusMessageType::RecoveryRequest => ConsensusMessageBody::RecoveryRequest {
                timestamp: reader.read_u64()?,
            },
            ConsensusMessageType::RecoveryMessage => {
                let count = reader.read_var_int(64)? as usize;
                let mut payloads = Vec::with_capacity(count);
                for _ in 0..count {
                    payloads.push(reader.read_var_bytes(1 << 20)?);
                }
                ConsensusMessageBody::RecoveryMessage { payloads }
            }
        };
        Ok(Self {
            message_type,
            block_index,
            validator_index,
            view_number,
            body,
        })
    }
}

/// The network envelope consensus messages travel in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensiblePayload {
    /// Always [`PAYLOAD_CATEGORY`] for dBFT.
    pub category: String,
    /// First height the payload is valid at.
    pub valid_block_start: u32,
    /// First height the payload is invalid at.
    pub valid_block_end: u32,
    /// Account of the sending validator.
    pub sender: UInt160,
    /// The serialized [`ConsensusMessage`].
    pub data: Vec<u8>,
    /// The sender's witness.
    pub witness: Witness,
}

impl ExtensiblePayload {
    /// Serializes the signed portion.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The payload hash.
    pub fn hash(&self) -> Result<UInt256> {
        Ok(UInt256::from_array(hash256(&self.unsigned_bytes()?)))
    }

    /// The data a validator signs: magic ‖ payload hash.
    pub fn sign_data(&self, network_magic: u32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(4 + UInt256::SIZE);
        data.extend_from_slice(&network_magic.to_le_bytes());
        data.extend_from_slice(self.hash()?.as_bytes());
        Ok(data)
    }

    /// Decodes the wrapped consensus message.
    pub fn message(&self) -> Result<ConsensusMessage> {
        helios_io::from_bytes(&self.data).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_var_string(&self.category)?;
        writer.write_u32(self.valid_block_start)?;
        writer.write_u32(self.valid_block_end)?;
        writer.write_serializable(&self.sender)?;
        writer.write_var_bytes(&self.data)
    }
}

impl Serializable for ExtensiblePayload {
    fn size(&self) -> usize {
        var_bytes_size(self.category.len())
            + 4
            + 4
            + UInt160::SIZE
            + var_bytes_size(self.data.len())
            + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        self.serialize_unsigned(writer)?;
        writer.write_serializable(&self.witness)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let category = reader.read_var_string(32)?;
        let valid_block_start = reader.read_u32()?;
        let valid_block_end = reader.read_u32()?;
        let sender = reader.read_serializable()?;
        let data = reader.read_var_bytes(1 << 20)?;
        let witness = reader.read_serializable()?;
        Ok(Self {
            category,
            valid_block_start,
            valid_block_end,
            sender,
            data,
            witness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip() {
        let message = ConsensusMessage::new(
            42,
            3,
            1,
            ConsensusMessageBody::PrepareRequest {
                timestamp: 1_700_000_000_000,
                nonce: 0xDEAD_BEEF,
                transaction_hashes: vec![UInt256::hash_of(b"tx1"), UInt256::hash_of(b"tx2")],
            },
        );
        assert_eq!(message.message_type, ConsensusMessageType::PrepareRequest);
        let bytes = helios_io::to_bytes(&message).unwrap();
        assert_eq!(bytes.len(), message.size());
        let back: ConsensusMessage = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn test_commit_round_trip() {
        let message = ConsensusMessage::new(
            7,
            0,
            0,
            ConsensusMessageBody::Commit {
                signature: vec![0xAB; 64],
            },
        );
        let bytes = helios_io::to_bytes(&message).unwrap();
        let back: ConsensusMessage = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn test_payload_hash_excludes_witness() {
        let mut payload = ExtensiblePayload {
            category: PAYLOAD_CATEGORY.into(),
            valid_block_start: 10,
            valid_block_end: 11,
            sender: UInt160::from_script(b"validator"),
            data: vec![1, 2, 3],
            witness: Witness::default(),
        };
        let hash = payload.hash().unwrap();
        payload.witness.invocation_script = vec![9];
        assert_eq!(payload.hash().unwrap(), hash);
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let bytes = [0x99u8, 0, 0, 0, 0, 0, 0];
        assert!(helios_io::from_bytes::<ConsensusMessage>(&bytes).is_err());
    }
}
