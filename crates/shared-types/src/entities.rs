//! # Identifier Entities
//!
//! Newtypes for the identifiers a test network deals with:
//!
//! - **Nodes**: `NodeId` (20 bytes, derived from staking key material)
//! - **On-chain objects**: `SubnetId`, `ChainId`, `TxId` (32 bytes)
//! - **Plugins**: `VmId` (32 bytes, usually derived from a VM name)
//!
//! All identifiers serialize as strings so that JSON documents stay
//! human-readable and diffable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::IdParseError;

/// Prefix used for the textual form of a `NodeId`.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// Unique identifier for a validator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True for the zero value (no identity assigned yet).
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NODE_ID_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(NODE_ID_PREFIX)
            .ok_or_else(|| IdParseError::MissingPrefix {
                kind: "NodeId",
                prefix: NODE_ID_PREFIX,
            })?;
        let bytes = decode_fixed::<20>("NodeId", body)?;
        Ok(Self(bytes))
    }
}

/// Declares a 32-byte identifier whose zero value means "not yet created".
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// The zero value.
            pub const EMPTY: Self = Self([0u8; 32]);

            /// Create from raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Raw bytes of the identifier.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// True for the zero value.
            pub fn is_empty(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(decode_fixed::<32>(stringify!($name), s)?))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_id!(
    /// Identifier of a subnet. The primary network uses the zero value.
    SubnetId
);
define_id!(
    /// Identifier of a chain created on a subnet.
    ChainId
);
define_id!(
    /// Identifier of a virtual machine plugin.
    VmId
);
define_id!(
    /// Identifier of an issued transaction.
    TxId
);

impl SubnetId {
    /// The primary network shares the zero identifier.
    pub const PRIMARY_NETWORK: Self = Self::EMPTY;
}

impl VmId {
    /// Derive a VM id from a short name by zero-padding its bytes.
    ///
    /// Names longer than 32 bytes are truncated.
    pub fn from_name(name: &str) -> Self {
        let mut bytes = [0u8; 32];
        let raw = name.as_bytes();
        let len = raw.len().min(32);
        bytes[..len].copy_from_slice(&raw[..len]);
        Self(bytes)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn decode_fixed<const N: usize>(kind: &'static str, s: &str) -> Result<[u8; N], IdParseError> {
    let raw = hex::decode(s).map_err(|e| IdParseError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    raw.try_into().map_err(|raw: Vec<u8>| IdParseError::InvalidLength {
        kind,
        expected: N,
        actual: raw.len(),
    })
}
