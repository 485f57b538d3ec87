//! Block headers and blocks.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use helios_config::MAX_TRANSACTIONS_PER_BLOCK;
use helios_io::serializable::var_int_size;
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{compute_merkle_root, Error, Result, Transaction, UInt160, UInt256, Witness};

/// A block header: everything needed to link and authenticate a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Format version; currently always 0.
    pub version: u32,
    /// Hash of the previous block.
    pub prev_hash: UInt256,
    /// Merkle root over the block's transaction hashes.
    pub merkle_root: UInt256,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Height of this block.
    pub index: u32,
    /// Index of the consensus primary that proposed this block.
    pub primary: u8,
    /// Script hash the *next* block's witness must match.
    pub next_consensus: UInt160,
    /// Multi-signature witness of the consensus nodes.
    pub witness: Witness,

    #[serde(skip)]
    hash_cache: OnceLock<UInt256>,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Header {}

impl Header {
    /// Creates a header; the hash is computed lazily on first use.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        prev_hash: UInt256,
        merkle_root: UInt256,
        timestamp: u64,
        index: u32,
        primary: u8,
        next_consensus: UInt160,
        witness: Witness,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            index,
            primary,
            next_consensus,
            witness,
            hash_cache: OnceLock::new(),
        }
    }

    /// Serializes the signed portion (everything except the witness).
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The block hash: double SHA-256 of the unsigned header.
    pub fn hash(&self) -> UInt256 {
        *self.hash_cache.get_or_init(|| {
            let bytes = self
                .unsigned_bytes()
                .expect("in-memory serialization cannot fail");
            UInt256::hash_of(&bytes)
        })
    }

    /// Data consensus nodes sign: network magic ‖ hash.
    pub fn sign_data(&self, network_magic: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + UInt256::SIZE);
        data.extend_from_slice(&network_magic.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_u32(self.version)?;
        writer.write_serializable(&self.prev_hash)?;
        writer.write_serializable(&self.merkle_root)?;
        writer.write_u64(self.timestamp)?;
        writer.write_u32(self.index)?;
        writer.write_u8(self.primary)?;
        writer.write_serializable(&self.next_consensus)
    }
}

impl Serializable for Header {
    fn size(&self) -> usize {
        4 + UInt256::SIZE + UInt256::SIZE + 8 + 4 + 1 + UInt160::SIZE + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        self.serialize_unsigned(writer)?;
        writer.write_serializable(&self.witness)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let version = reader.read_u32()?;
        let prev_hash = reader.read_serializable()?;
        let merkle_root = reader.read_serializable()?;
        let timestamp = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary = reader.read_u8()?;
        let next_consensus = reader.read_serializable()?;
        let witness = reader.read_serializable()?;
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            index,
            primary,
            next_consensus,
            witness,
            hash_cache: OnceLock::new(),
        })
    }
}

/// A header plus its ordered transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The authenticated header.
    pub header: Header,
    /// Transactions in execution order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    /// The block height.
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Recomputes the merkle root from the transaction list.
    pub fn compute_merkle_root(&self) -> UInt256 {
        let hashes: Vec<UInt256> = self.transactions.iter().map(Transaction::hash).collect();
        compute_merkle_root(&hashes)
    }

    /// Checks the header's merkle root against the transactions.
    pub fn verify_merkle_root(&self) -> Result<()> {
        let computed = self.compute_merkle_root();
        if computed != self.header.merkle_root {
            return Err(Error::VerificationFailed(format!(
                "merkle root mismatch: header {} computed {}",
                self.header.merkle_root, computed
            )));
        }
        Ok(())
    }
}

impl Serializable for Block {
    fn size(&self) -> usize {
        self.header.size()
            + var_int_size(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Serializable::size)
                .sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_serializable(&self.header)?;
        writer.write_serializable_list(&self.transactions)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let header = reader.read_serializable()?;
        let transactions = reader.read_serializable_list(MAX_TRANSACTIONS_PER_BLOCK)?;
        Ok(Self {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Signer, WitnessScope};

    fn sample_header() -> Header {
        Header {
            version: 0,
            prev_hash: UInt256::hash_of(b"prev"),
            merkle_root: UInt256::zero(),
            timestamp: 1_600_000_000_000,
            index: 7,
            primary: 2,
            next_consensus: UInt160::from_script(b"consensus"),
            witness: Witness::default(),
            hash_cache: OnceLock::new(),
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        let bytes = helios_io::to_bytes(&header).unwrap();
        assert_eq!(bytes.len(), header.size());
        let back: Header = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(header.hash(), back.hash());
    }

    #[test]
    fn test_merkle_verification() {
        let tx = Transaction::new(
            vec![0x40],
            vec![Signer::new(UInt160::zero(), WitnessScope::NONE)],
        );
        let mut header = sample_header();
        header.merkle_root = compute_merkle_root(&[tx.hash()]);
        let block = Block {
            header,
            transactions: vec![tx],
        };
        assert!(block.verify_merkle_root().is_ok());

        let mut bad = block.clone();
        bad.header.merkle_root = UInt256::zero();
        assert!(bad.verify_merkle_root().is_err());
    }

    #[test]
    fn test_witness_not_part_of_hash() {
        let mut header = sample_header();
        let hash = header.hash();
        header.witness.invocation_script = vec![9, 9, 9];
        let rebuilt: Header =
            helios_io::from_bytes(&helios_io::to_bytes(&header).unwrap()).unwrap();
        assert_eq!(hash, rebuilt.hash());
    }
}
