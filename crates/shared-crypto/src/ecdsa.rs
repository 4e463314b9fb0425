//! # secp256k1 Funding Keys
//!
//! Keys pre-funded in a network's genesis. A subnet consumes one of them as
//! its owning key, so keys are cheap to clone and serialize as text.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::CryptoError;

/// Prefix of the textual form of a private key.
pub const PRIVATE_KEY_PREFIX: &str = "PrivateKey-";

/// A key every default genesis funds, for ad-hoc use by tests that need to
/// know a funded key up front.
pub const WELL_KNOWN_TEST_KEY_HEX: &str =
    "56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027";

/// 20-byte account address derived from a public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = s.strip_prefix("0x").unwrap_or(&s);
        let raw = hex::decode(body).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 20] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("address must be 20 bytes"))?;
        Ok(Self(bytes))
    }
}

/// secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// The well-known funded test key.
    pub fn well_known() -> Result<Self, CryptoError> {
        let bytes = hex::decode(WELL_KNOWN_TEST_KEY_HEX)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Secret key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Address: first 20 bytes of SHA-256 over the compressed public key.
    pub fn address(&self) -> Address {
        let public = self.signing_key.verifying_key().to_encoded_point(true);
        let digest = Sha256::digest(public.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }
}

/// Generate `count` fresh keys.
pub fn new_private_keys(count: usize) -> Vec<PrivateKey> {
    (0..count).map(|_| PrivateKey::generate()).collect()
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address().to_string())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PRIVATE_KEY_PREFIX, hex::encode(self.to_bytes()))
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(PRIVATE_KEY_PREFIX).ok_or_else(|| {
            CryptoError::InvalidEncoding(format!("missing {PRIVATE_KEY_PREFIX:?} prefix"))
        })?;
        let bytes = hex::decode(body).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
