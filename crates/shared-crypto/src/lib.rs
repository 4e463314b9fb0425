//! # Shared Crypto - Key Material for Test Networks
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 | Pre-funded keys, subnet owning keys |
//! | `signatures` | Ed25519 | Node staking keys and `NodeId` derivation |
//!
//! Keys generated here are test material: they are written to disk in the
//! clear as part of a network's configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod signatures;

pub use ecdsa::{new_private_keys, Address, PrivateKey, PRIVATE_KEY_PREFIX, WELL_KNOWN_TEST_KEY_HEX};
pub use errors::CryptoError;
pub use signatures::StakingKey;
