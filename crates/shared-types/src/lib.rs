//! # Shared Types Crate
//!
//! Identifier newtypes, the flat node flag map, and small encoding helpers
//! shared by the orchestrator and its collaborators.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every identifier that appears on disk or on
//!   the wire is defined here.
//! - **Zero means absent**: the all-zero value of a 32-byte identifier marks
//!   an object that has not yet been created on-chain.
//! - **Set-if-absent flags**: `FlagsMap` layering never clobbers a value that
//!   is already present.

pub mod encoding;
pub mod entities;
pub mod errors;
pub mod flags;

pub use entities::*;
pub use errors::*;
pub use flags::FlagsMap;
