use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardReason {
    ReadComplete,
    SignupBonus,
    Adjustment,
}

impl RewardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardReason::ReadComplete => "read_complete",
            RewardReason::SignupBonus => "signup_bonus",
            RewardReason::Adjustment => "adjustment",
        }
    }
}

/// One row of the append-only reward ledger. Credits are never mutated or
/// deleted; the profile balance is a projection of this history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardCredit {
    pub id: String,
    pub user_id: String,
    /// Absent for administrative adjustments, which are not tied to a read.
    pub article_id: Option<String>,
    pub amount: i64,
    pub reason: RewardReason,
    pub awarded_at: DateTime<Utc>,
}
