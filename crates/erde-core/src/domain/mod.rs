//! Core entities: the types every stage consumes or produces.

pub mod epoch;
pub mod reward;
pub mod snapshot;
pub mod weight;

pub use epoch::Epoch;
pub use reward::{ChannelSplit, RewardDistribution, UserReward};
pub use snapshot::EpochSnapshot;
pub use weight::TWADWeight;
