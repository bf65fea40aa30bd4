/// Error surface for chain reads, distinguishing retryable transport
/// failures from fatal ones (transient transport errors vs. a revert or
/// malformed response).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    #[error("invalid block range: start={start} end={end}")]
    InvalidBlockRange { start: u64, end: u64 },
    #[error("contract call reverted: {0}")]
    Reverted(String),
    #[error("transport error: {0}")]
    Transport(#[from] web3::Error),
    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),
}

impl ChainError {
    /// Only transport-layer failures are retried; a revert or malformed
    /// input is a logic error that retrying cannot fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Raised once the retry wrapper in [`crate::reader::retry_linear`] exhausts
/// its attempt budget, carrying the last underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("chain fetch failed after {attempts} attempt(s): {source}")]
pub struct ChainFetchError {
    pub attempts: u32,
    #[source]
    pub source: ChainError,
}

/// Failure modes of the submitter.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("signer {signer} is not the distributor owner {owner}")]
    AuthorizationMismatch {
        signer: ethereum_types::Address,
        owner: ethereum_types::Address,
    },
    #[error(
        "on-chain root for epoch {epoch} is already set to {existing} and differs from the \
         distribution being submitted ({submitting}); re-run with force to override"
    )]
    IdempotenceConflict {
        epoch: u64,
        existing: String,
        submitting: String,
    },
    #[error(
        "post-write verification failed: on-chain root {observed} does not match the \
         submitted root {expected}; this may indicate a reorg and requires manual investigation"
    )]
    PostWriteMismatch { expected: String, observed: String },
    #[error("setMerkleRoot transaction {tx_hash} reverted on-chain")]
    TransactionReverted { tx_hash: String },
    #[error(transparent)]
    Chain(#[from] ChainFetchError),
    #[error(transparent)]
    ChainTransient(#[from] ChainError),
}
