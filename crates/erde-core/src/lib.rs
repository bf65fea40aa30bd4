//! Epoch Reward Distribution Engine: snapshot, TWAD weights, channel
//! allocation, Merkle commitment, validation, and submission.
//!
//! Stage modules map directly onto the pipeline's lettered components:
//! [`aggregator`] (B), [`weights`] (C), [`budget`] (D), [`allocator`] (E),
//! [`merkle`] (F), [`validator`] (G). Component A (chain reads) and H
//! (submission) live in the sibling `erde_chain` crate; [`orchestrator`]
//! ties every stage together into one per-epoch run.

pub mod aggregator;
pub mod allocator;
pub mod budget;
pub mod cli;
pub mod domain;
pub mod error;
pub mod export;
pub mod merkle;
pub mod orchestrator;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod validator;
pub mod weights;

pub use error::ErdeError;
pub use orchestrator::{Orchestrator, RunOutput};
pub use settings::Settings;
