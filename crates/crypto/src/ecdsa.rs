//! ECDSA over secp256r1, the signature scheme of every witness.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::{ECPoint, Error, Result};

/// Fixed-size signature length (r ‖ s, 32 bytes each).
pub const SIGNATURE_SIZE: usize = 64;

/// Stateless sign/verify entry points.
pub struct Secp256r1;

impl Secp256r1 {
    /// Signs `data` with `private_key`, returning the 64-byte r‖s form.
    ///
    /// The message is hashed with SHA-256 as part of the ECDSA operation.
    pub fn sign(data: &[u8], private_key: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE]> {
        let key = SigningKey::from_bytes(private_key.into())
            .map_err(|_| Error::InvalidPrivateKey)?;
        let signature: Signature = key.sign(data);
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }

    /// Verifies a 64-byte signature over `data` against a compressed key.
    pub fn verify(data: &[u8], signature: &[u8], public_key: &ECPoint) -> Result<bool> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_SIZE,
                signature.len()
            )));
        }
        let verifying = VerifyingKey::from_sec1_bytes(public_key.as_bytes())
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        Ok(verifying.verify(data, &signature).is_ok())
    }
}

/// A private key together with its derived public point.
#[derive(Clone)]
pub struct KeyPair {
    private: [u8; 32],
    public: ECPoint,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut OsRng);
        let public = ECPoint::from_public_key(&signing.verifying_key().into());
        Self {
            private: signing.to_bytes().into(),
            public,
        }
    }

    /// Builds a key pair from raw private key bytes.
    pub fn from_private_key(private: [u8; 32]) -> Result<Self> {
        let signing =
            SigningKey::from_bytes(&private.into()).map_err(|_| Error::InvalidPrivateKey)?;
        let public = ECPoint::from_public_key(&signing.verifying_key().into());
        Ok(Self { private, public })
    }

    /// The compressed public key.
    pub fn public_key(&self) -> ECPoint {
        self.public
    }

    /// Signs `data` with this key.
    pub fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        Secp256r1::sign(data, &self.private)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print private material.
        write!(f, "KeyPair({})", self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let key = KeyPair::generate();
        let sig = key.sign(b"payload").unwrap();
        assert!(Secp256r1::verify(b"payload", &sig, &key.public_key()).unwrap());
        assert!(!Secp256r1::verify(b"tampered", &sig, &key.public_key()).unwrap());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = signer.sign(b"payload").unwrap();
        assert!(!Secp256r1::verify(b"payload", &sig, &other.public_key()).unwrap());
    }

    #[test]
    fn test_signature_length_enforced() {
        let key = KeyPair::generate();
        assert!(Secp256r1::verify(b"x", &[0u8; 63], &key.public_key()).is_err());
    }
}
