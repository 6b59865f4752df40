use chrono::{DateTime, Utc};

/// A validated completion, as seen by reward policy.
#[derive(Debug, Clone)]
pub struct ReadEvent {
    pub user_id: String,
    pub article_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Pluggable reward policy. Returns the token amount due for the event, or
/// `None` to decline it. Eligibility variants (streak bonuses, daily caps)
/// layer in here without touching the settlement contract.
pub trait RewardRule: Send + Sync {
    fn evaluate(&self, event: &ReadEvent) -> Option<u64>;
}

/// Default policy: a flat amount per completed read.
pub struct FixedReward {
    amount: u64,
}

impl FixedReward {
    pub fn new(amount: u64) -> Self {
        Self { amount }
    }
}

impl RewardRule for FixedReward {
    fn evaluate(&self, _event: &ReadEvent) -> Option<u64> {
        Some(self.amount)
    }
}
