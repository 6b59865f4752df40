use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::{has_capability, Action, Principal};
use crate::notify::{NoticeKind, NotificationSink};
use crate::storage::{RewardStore, StoreError};

use super::rule::{ReadEvent, RewardRule};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("sign in required to earn tokens")]
    Unauthorized,
    #[error("article already credited")]
    AlreadyCredited,
    #[error("reward rule declined this read")]
    Ineligible,
    #[error("balance update failed: {0}")]
    StorageUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub amount: u64,
    pub new_balance: u64,
}

/// The only path by which reading credits tokens. Instances own their
/// already-credited marker set, so tests and per-user-session hosts can
/// build isolated services; the durable ledger remains the source of truth
/// underneath.
pub struct SettlementService {
    store: Arc<dyn RewardStore>,
    rule: Box<dyn RewardRule>,
    notifier: Arc<dyn NotificationSink>,
    credited: Mutex<HashSet<(String, String)>>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn RewardStore>,
        rule: Box<dyn RewardRule>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            rule,
            notifier,
            credited: Mutex::new(HashSet::new()),
        }
    }

    /// Validate a completion signal and credit the reward. The checks run in
    /// a fixed order: principal, in-memory marker, durable ledger, reward
    /// rule, then the atomic storage credit. The marker is only set after a
    /// successful write, so a failed settlement stays retryable.
    pub async fn settle_completion(
        &self,
        principal: Option<&Principal>,
        article_id: &str,
    ) -> Result<Settlement, SettlementError> {
        let Some(principal) = principal else {
            self.notifier
                .notify(NoticeKind::Error, "You need to be logged in to earn tokens");
            return Err(SettlementError::Unauthorized);
        };
        if !has_capability(principal, Action::EarnRewards) {
            self.notifier
                .notify(NoticeKind::Error, "Your account cannot earn tokens");
            return Err(SettlementError::Unauthorized);
        }

        let key = (principal.user_id.clone(), article_id.to_string());

        // Marker check-and-set and the storage write share this critical
        // section, so duplicate completion deliveries settle at most once.
        let mut credited = self.credited.lock().await;
        if credited.contains(&key) {
            debug!(
                "Skipping settlement for article {article_id}: already credited to {}",
                principal.user_id
            );
            return Err(SettlementError::AlreadyCredited);
        }

        match self
            .store
            .has_read_credit(&principal.user_id, article_id)
            .await
        {
            Ok(true) => {
                credited.insert(key);
                debug!(
                    "Ledger already holds a read credit for ({}, {article_id})",
                    principal.user_id
                );
                return Err(SettlementError::AlreadyCredited);
            }
            Ok(false) => {}
            Err(err) => return Err(self.storage_failed(err)),
        }

        let event = ReadEvent {
            user_id: principal.user_id.clone(),
            article_id: article_id.to_string(),
            completed_at: Utc::now(),
        };
        let Some(amount) = self.rule.evaluate(&event) else {
            debug!("Reward rule declined read of article {article_id}");
            return Err(SettlementError::Ineligible);
        };

        match self
            .store
            .credit_read(&principal.user_id, article_id, amount, event.completed_at)
            .await
        {
            Ok(new_balance) => {
                credited.insert(key);
                info!(
                    "Credited {amount} tokens to {} for article {article_id} (balance {new_balance})",
                    principal.user_id
                );
                self.notifier.notify(
                    NoticeKind::Success,
                    &format!("You earned {amount} tokens for reading this article!"),
                );
                Ok(Settlement {
                    amount,
                    new_balance,
                })
            }
            Err(StoreError::DuplicateCredit) => {
                // Another surface won the race; adopt its result.
                credited.insert(key);
                Err(SettlementError::AlreadyCredited)
            }
            Err(err) => Err(self.storage_failed(err)),
        }
    }

    /// Administrative balance change, gated by the `AdjustTokens` capability.
    pub async fn adjust_balance(
        &self,
        principal: Option<&Principal>,
        target_user_id: &str,
        delta: i64,
    ) -> Result<u64, SettlementError> {
        let Some(principal) = principal else {
            return Err(SettlementError::Unauthorized);
        };
        if !has_capability(principal, Action::AdjustTokens) {
            warn!(
                "{} attempted a balance adjustment without the capability",
                principal.user_id
            );
            return Err(SettlementError::Unauthorized);
        }

        match self
            .store
            .adjust_balance(target_user_id, delta, Utc::now())
            .await
        {
            Ok(new_balance) => {
                info!(
                    "Adjusted balance of {target_user_id} by {delta} (now {new_balance}), by {}",
                    principal.user_id
                );
                Ok(new_balance)
            }
            Err(err) => Err(self.storage_failed(err)),
        }
    }

    fn storage_failed(&self, err: StoreError) -> SettlementError {
        warn!("Settlement storage failure: {err}");
        self.notifier.notify(
            NoticeKind::Error,
            "Could not record your reward. Please try again.",
        );
        SettlementError::StorageUnavailable(err.to_string())
    }
}
