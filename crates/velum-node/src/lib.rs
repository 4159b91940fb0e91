#![forbid(unsafe_code)]

//! Velum node: the persisted ledger.
//!
//! Wires the state crates together: a sled-backed [`velum_state::KvStore`],
//! reload-on-restart of every shard's frontier, and the single-writer
//! block-apply path that commits nullifiers, commitment appends, and
//! anchors atomically with respect to readers.

pub mod error;
pub mod ledger;
pub mod store;

pub use error::*;
pub use ledger::*;
pub use store::*;
