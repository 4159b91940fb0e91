#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Velum core: canonical types, constants, hashing, key material, and
//! serialization helpers shared by every layer of the node.

pub mod constants;
pub mod crypto;
pub mod hasher;
pub mod keys;
pub mod serialization;
pub mod types;

pub use constants::*;
pub use crypto::*;
pub use hasher::*;
pub use keys::*;
pub use serialization::*;
pub use types::*;
