pub mod rule;
pub mod service;

pub use rule::{FixedReward, ReadEvent, RewardRule};
pub use service::{Settlement, SettlementError, SettlementService};
