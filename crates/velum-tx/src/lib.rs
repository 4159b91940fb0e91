#![forbid(unsafe_code)]

//! Velum transactions.
//!
//! The shielded value-transfer pipeline: plaintext and encrypted note
//! records, join-split descriptions, the multi-description transaction
//! builder, the validator, and the typed loan/dividend variants layered on
//! the base transaction.
//!
//! The zk proving system is a black box behind [`oracle::ZkOracle`]; this
//! crate never inspects proof bytes.

pub mod builder;
pub mod encryption;
pub mod error;
pub mod joinsplit;
pub mod note;
pub mod oracle;
pub mod tx;
pub mod validator;
pub mod variants;
pub mod witness;

pub use builder::*;
pub use encryption::*;
pub use error::*;
pub use joinsplit::*;
pub use note::*;
pub use oracle::*;
pub use tx::*;
pub use validator::*;
pub use variants::*;
pub use witness::*;
