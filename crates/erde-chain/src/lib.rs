//! Typed EVM reads and the single write path (`setMerkleRoot`) for the
//! epoch reward distribution engine.

pub mod error;
pub mod reader;
pub mod submitter;
pub mod types;

pub use error::{ChainError, ChainFetchError, SubmitError};
pub use secp256k1;
pub use reader::{ChainReader, EvmChainReader, retry_linear};
#[cfg(any(test, feature = "mock"))]
pub use reader::MockChainReader;
pub use submitter::{SubmitOutcome, Submitter};
pub use types::{
    Address, ChainAddresses, U256, UserSnapshot, address_from_private_key, address_from_secret_key,
    secret_key_from_private_key,
};
