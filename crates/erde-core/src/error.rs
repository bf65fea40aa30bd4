use erde_chain::{ChainFetchError, SubmitError};

/// Typed error taxonomy for the pipeline stages. Application-level plumbing
/// (CLI wiring, config loading, artifact I/O) still uses `anyhow::Result`
/// with `.context(...)`; this enum exists so callers can `match` on *which
/// stage* failed and *why* instead of string-matching an anyhow chain.
#[derive(Debug, thiserror::Error)]
pub enum ErdeError {
    /// Exhausted retries on a transient RPC failure.
    #[error("chain read exhausted retries: {0}")]
    ChainTransient(#[from] ChainFetchError),

    /// A contract revert or malformed input; never retried.
    #[error("chain read failed: {0}")]
    ChainFatal(#[source] erde_chain::ChainError),

    /// An accumulation or cross-check that should be mathematically
    /// impossible failed — a logic bug, not a bad input.
    #[error("integrity check failed in {stage}: {detail}")]
    IntegrityMismatch { stage: &'static str, detail: String },

    /// A policy the caller controls was violated (budget exceeded,
    /// duplicate recipients, empty recipient list, too many recipients).
    #[error("policy violation in {stage}: {detail}")]
    PolicyViolation { stage: &'static str, detail: String },

    /// The submitter's signer is not the distributor's owner.
    #[error(transparent)]
    AuthorizationMismatch(#[from] AuthorizationError),

    /// The on-chain root for this epoch is already set to a different,
    /// non-zero value and `FORCE_UPDATE` was not supplied.
    #[error("idempotence conflict: {0}")]
    IdempotenceConflict(String),

    /// The validator rejected the distribution; submission is blocked.
    #[error("validation failed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    ValidationFail { errors: Vec<String> },
}

/// Wraps [`SubmitError`] so `AuthorizationMismatch`/`IdempotenceConflict`/
/// post-write anomalies keep their original detail while still collapsing
/// into [`ErdeError`]'s stage taxonomy.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct AuthorizationError(#[from] pub SubmitError);

impl From<SubmitError> for ErdeError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::IdempotenceConflict { .. } => ErdeError::IdempotenceConflict(err.to_string()),
            other => ErdeError::AuthorizationMismatch(AuthorizationError(other)),
        }
    }
}

impl From<erde_chain::ChainError> for ErdeError {
    fn from(err: erde_chain::ChainError) -> Self {
        ErdeError::ChainFatal(err)
    }
}
