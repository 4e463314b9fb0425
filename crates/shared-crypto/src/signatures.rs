//! # Ed25519 Staking Keys
//!
//! A node's staking key determines its `NodeId`: the first 20 bytes of the
//! SHA-256 digest of the Ed25519 public key. The id is therefore stable for
//! as long as the key is retained in the node's configuration.

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use shared_types::NodeId;
use zeroize::Zeroizing;

use crate::CryptoError;

/// Ed25519 staking key.
#[derive(Clone)]
pub struct StakingKey {
    signing_key: SigningKey,
}

impl StakingKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restore from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: seed.len(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Secret seed, zeroized when dropped.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Node identity derived from the public key.
    pub fn node_id(&self) -> NodeId {
        let digest = Sha256::digest(self.public_key());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        NodeId::new(bytes)
    }
}

impl std::fmt::Debug for StakingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingKey")
            .field("node_id", &self.node_id().to_string())
            .finish_non_exhaustive()
    }
}
