//! Compressed secp256r1 public key points.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use helios_config::PUBLIC_KEY_SIZE;

use crate::{Error, Result};

/// A validated, compressed secp256r1 public key.
///
/// Ordering is lexicographic over the 33-byte compressed encoding, which is
/// the order used when sorting committee and multi-signature key sets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ECPoint {
    encoded: [u8; PUBLIC_KEY_SIZE],
}

impl Serialize for ECPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.encoded))
    }
}

impl<'de> Deserialize<'de> for ECPoint {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ECPoint::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

impl ECPoint {
    /// Parses and validates a compressed 33-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let mut encoded = [0u8; PUBLIC_KEY_SIZE];
        encoded.copy_from_slice(bytes);
        Ok(Self { encoded })
    }

    /// Parses from a hex string.
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Wraps an already-validated `p256` public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut encoded = [0u8; PUBLIC_KEY_SIZE];
        encoded.copy_from_slice(point.as_bytes());
        Self { encoded }
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.encoded
    }

    /// The compressed encoding as a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.encoded.to_vec()
    }

    /// The underlying `p256` key, for verification.
    pub fn to_public_key(&self) -> Result<PublicKey> {
        PublicKey::from_sec1_bytes(&self.encoded)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Debug for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECPoint({})", hex::encode(self.encoded))
    }
}

impl fmt::Display for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa::KeyPair;

    #[test]
    fn test_rejects_wrong_length() {
        assert!(ECPoint::from_bytes(&[2u8; 32]).is_err());
    }

    #[test]
    fn test_round_trip_through_hex() {
        let key = KeyPair::generate();
        let point = key.public_key();
        let again = ECPoint::from_hex(&point.to_string()).unwrap();
        assert_eq!(point, again);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let mut points: Vec<ECPoint> =
            (0..4).map(|_| KeyPair::generate().public_key()).collect();
        let mut sorted = points.clone();
        sorted.sort();
        points.sort();
        assert_eq!(points, sorted);
    }
}
