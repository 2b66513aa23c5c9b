//! Cryptographic primitives for cove.
//!
//! Provides three things:
//!   1. Hashing — BLAKE3 content hashes, Tiger-192 chunk version summaries,
//!      and the base32(SHA1) short identity used for per-vault paths
//!   2. Ed25519 signing keys — every chunk-policy decision reduces to
//!      "does this signature verify against that public key"
//!   3. Key serialization for the identity hand-off and the config file
//!
//! Private key material is `ZeroizeOnDrop` — wiped from memory when
//! dropped. There is no unsafe code in this module.

use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha1::{Digest as Sha1Digest, Sha1};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ── Hashing ───────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
///
/// Used for content-addressed chunk names and download verification.
pub fn content_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Tiger-192 digest of a chunk's stored bytes — the "version" summary the
/// chunk authority reports for mutable chunk types.
pub fn version_hash(data: &[u8]) -> Vec<u8> {
    use tiger::Digest;
    tiger::Tiger::digest(data).to_vec()
}

/// Short identity: unpadded base32 of SHA1(identity bytes).
///
/// Filesystem-safe, so it doubles as the per-vault directory name.
pub fn short_id(identity: &[u8]) -> String {
    let digest = Sha1::digest(identity);
    BASE32_NOPAD.encode(&digest)
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A vault's long-term Ed25519 keypair plus its opaque identity bytes.
///
/// The identity is minted by whoever creates the account and is not derived
/// from the key; the substrate only requires it to be unique per vault.
/// The private key never leaves this struct except through
/// [`Keypair::to_blob`] for the identity hand-off.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Opaque identity bytes. Unique across vaults on one host.
    pub identity: Vec<u8>,
    /// Ed25519 public key bytes.
    pub public: [u8; 32],
    /// Private key — zeroized on drop, never exposed directly.
    private: Zeroizing<[u8; 32]>,
}

impl Keypair {
    /// Generate a fresh keypair for the given identity bytes.
    pub fn generate(identity: Vec<u8>) -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        Self {
            identity,
            public: signing.verifying_key().to_bytes(),
            private: Zeroizing::new(signing.to_bytes()),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(identity: Vec<u8>, private_bytes: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&private_bytes);
        Self {
            identity,
            public: signing.verifying_key().to_bytes(),
            private: Zeroizing::new(private_bytes),
        }
    }

    /// Sign a message with the private key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signing = SigningKey::from_bytes(&self.private);
        signing.sign(message).to_bytes().to_vec()
    }

    /// Serialize for the identity hand-off and the config file.
    pub fn to_blob(&self) -> Result<Vec<u8>, CryptoError> {
        let blob = KeysBlob {
            identity: self.identity.clone(),
            public: self.public,
            private: *self.private,
        };
        bincode::serialize(&blob).map_err(|_| CryptoError::Serialize)
    }

    /// Reconstruct from a serialized blob. Rejects blobs whose public key
    /// does not match the private key they carry.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CryptoError> {
        let parsed: KeysBlob = bincode::deserialize(blob).map_err(|_| CryptoError::Parse)?;
        let keypair = Self::from_private(parsed.identity.clone(), parsed.private);
        if keypair.public != parsed.public {
            return Err(CryptoError::Parse);
        }
        Ok(keypair)
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            public: self.public,
            private: Zeroizing::new(*self.private),
        }
    }
}

/// Wire/disk form of a keypair. Kept private to this module; everything
/// outside works with [`Keypair`].
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeysBlob {
    identity: Vec<u8>,
    public: [u8; 32],
    private: [u8; 32],
}

// ── Verification ──────────────────────────────────────────────────────────────

/// Whether the bytes decode to a usable Ed25519 public key.
pub fn validate_key(public: &[u8]) -> bool {
    let Ok(bytes) = <[u8; 32]>::try_from(public) else {
        return false;
    };
    VerifyingKey::from_bytes(&bytes).is_ok()
}

/// Whether `signature` over `data` verifies against `public`.
///
/// Any malformed input is simply a failed check; callers decide which
/// policy code that maps to.
pub fn check_signature(data: &[u8], signature: &[u8], public: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(data, &sig).is_ok()
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to serialize keys")]
    Serialize,

    #[error("keys blob failed to parse")]
    Parse,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_check_round_trip() {
        let keys = Keypair::generate(vec![1; 20]);
        let sig = keys.sign(b"hello");
        assert!(check_signature(b"hello", &sig, &keys.public));
        assert!(!check_signature(b"hullo", &sig, &keys.public));
    }

    #[test]
    fn signature_from_other_key_fails() {
        let a = Keypair::generate(vec![1; 20]);
        let b = Keypair::generate(vec![2; 20]);
        let sig = a.sign(b"payload");
        assert!(!check_signature(b"payload", &sig, &b.public));
    }

    #[test]
    fn validate_key_rejects_garbage() {
        assert!(!validate_key(&[0xff; 31]));
        assert!(!validate_key(b"short"));
        let keys = Keypair::generate(vec![3; 20]);
        assert!(validate_key(&keys.public));
    }

    #[test]
    fn blob_round_trip_preserves_identity_and_keys() {
        let keys = Keypair::generate(vec![7; 16]);
        let blob = keys.to_blob().unwrap();
        let back = Keypair::from_blob(&blob).unwrap();
        assert_eq!(back.identity, keys.identity);
        assert_eq!(back.public, keys.public);
        let sig = back.sign(b"x");
        assert!(check_signature(b"x", &sig, &keys.public));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let keys = Keypair::generate(vec![7; 16]);
        let blob = keys.to_blob().unwrap();
        assert!(Keypair::from_blob(&blob[..blob.len() - 3]).is_err());
    }

    #[test]
    fn short_id_is_filesystem_safe_and_deterministic() {
        let a = short_id(&[0x01; 20]);
        let b = short_id(&[0x01; 20]);
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, short_id(&[0x02; 20]));
    }

    #[test]
    fn version_hash_is_192_bits() {
        assert_eq!(version_hash(b"chunk bytes").len(), 24);
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"cove"), content_hash(b"cove"));
        assert_ne!(content_hash(b"cove"), content_hash(b"Cove"));
    }
}
