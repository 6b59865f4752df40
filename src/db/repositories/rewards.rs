use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{parse_datetime, parse_reward_reason, to_i64, to_u64},
    Database,
};
use crate::models::RewardCredit;
use crate::storage::{RewardStore, StoreError, StoreResult};

/// Result of a ledger write, before it is mapped onto the storage port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited(u64),
    Duplicate,
    MissingProfile,
}

fn row_to_credit(row: &Row) -> Result<RewardCredit> {
    let reason: String = row.get("reason")?;
    let awarded_at: String = row.get("awarded_at")?;

    Ok(RewardCredit {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        article_id: row.get("article_id")?,
        amount: row.get("amount")?,
        reason: parse_reward_reason(&reason)?,
        awarded_at: parse_datetime(&awarded_at, "awarded_at")?,
    })
}

impl Database {
    pub async fn fetch_balance(&self, user_id: &str) -> Result<Option<u64>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let tokens: Option<i64> = conn
                .query_row(
                    "SELECT tokens FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            tokens.map(|value| to_u64(value, "tokens")).transpose()
        })
        .await
    }

    pub async fn read_credit_exists(&self, user_id: &str, article_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        let article_id = article_id.to_string();
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM reward_credits
                     WHERE user_id = ?1 AND article_id = ?2 AND reason = 'read_complete'",
                    params![user_id, article_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    /// Ledger insert plus balance increment as one transaction. The partial
    /// unique index turns a racing second credit into `Duplicate` instead of
    /// a double increment; the balance change is an increment in SQL, never
    /// a write-back of a previously read value.
    pub async fn apply_read_credit(
        &self,
        user_id: &str,
        article_id: &str,
        amount: u64,
        awarded_at: DateTime<Utc>,
    ) -> Result<CreditOutcome> {
        let user_id = user_id.to_string();
        let article_id = article_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT tokens FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_none() {
                return Ok(CreditOutcome::MissingProfile);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO reward_credits (id, user_id, article_id, amount, reason, awarded_at)
                 VALUES (?1, ?2, ?3, ?4, 'read_complete', ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    article_id,
                    to_i64(amount)?,
                    awarded_at.to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                return Ok(CreditOutcome::Duplicate);
            }

            tx.execute(
                "UPDATE profiles
                 SET tokens = tokens + ?1,
                     updated_at = ?2
                 WHERE user_id = ?3",
                params![to_i64(amount)?, awarded_at.to_rfc3339(), user_id],
            )?;

            let balance: i64 = tx.query_row(
                "SELECT tokens FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(CreditOutcome::Credited(to_u64(balance, "tokens")?))
        })
        .await
    }

    /// Administrative balance change. Recorded in the ledger with the
    /// requested delta; the balance itself floors at zero.
    pub async fn apply_adjustment(
        &self,
        user_id: &str,
        delta: i64,
        awarded_at: DateTime<Utc>,
    ) -> Result<CreditOutcome> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT tokens FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_none() {
                return Ok(CreditOutcome::MissingProfile);
            }

            tx.execute(
                "INSERT INTO reward_credits (id, user_id, article_id, amount, reason, awarded_at)
                 VALUES (?1, ?2, NULL, ?3, 'adjustment', ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    delta,
                    awarded_at.to_rfc3339(),
                ],
            )?;

            tx.execute(
                "UPDATE profiles
                 SET tokens = MAX(0, tokens + ?1),
                     updated_at = ?2
                 WHERE user_id = ?3",
                params![delta, awarded_at.to_rfc3339(), user_id],
            )?;

            let balance: i64 = tx.query_row(
                "SELECT tokens FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(CreditOutcome::Credited(to_u64(balance, "tokens")?))
        })
        .await
    }

    pub async fn list_credits_for_user(&self, user_id: &str) -> Result<Vec<RewardCredit>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, article_id, amount, reason, awarded_at
                 FROM reward_credits
                 WHERE user_id = ?1
                 ORDER BY awarded_at ASC",
            )?;

            let mut rows = stmt.query(params![user_id])?;
            let mut credits = Vec::new();
            while let Some(row) = rows.next()? {
                credits.push(row_to_credit(row)?);
            }

            Ok(credits)
        })
        .await
    }
}

#[async_trait]
impl RewardStore for Database {
    async fn balance(&self, user_id: &str) -> StoreResult<u64> {
        match self.fetch_balance(user_id).await {
            Ok(Some(tokens)) => Ok(tokens),
            Ok(None) => Err(StoreError::ProfileMissing(user_id.to_string())),
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    async fn has_read_credit(&self, user_id: &str, article_id: &str) -> StoreResult<bool> {
        self.read_credit_exists(user_id, article_id)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    async fn credit_read(
        &self,
        user_id: &str,
        article_id: &str,
        amount: u64,
        awarded_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        match self
            .apply_read_credit(user_id, article_id, amount, awarded_at)
            .await
        {
            Ok(CreditOutcome::Credited(balance)) => Ok(balance),
            Ok(CreditOutcome::Duplicate) => Err(StoreError::DuplicateCredit),
            Ok(CreditOutcome::MissingProfile) => {
                Err(StoreError::ProfileMissing(user_id.to_string()))
            }
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    async fn adjust_balance(
        &self,
        user_id: &str,
        delta: i64,
        awarded_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        match self.apply_adjustment(user_id, delta, awarded_at).await {
            Ok(CreditOutcome::Credited(balance)) => Ok(balance),
            Ok(CreditOutcome::Duplicate) => Err(StoreError::DuplicateCredit),
            Ok(CreditOutcome::MissingProfile) => {
                Err(StoreError::ProfileMissing(user_id.to_string()))
            }
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::RewardReason;

    fn temp_db() -> Database {
        let path = std::env::temp_dir().join(format!("dadapay-db-{}.sqlite3", Uuid::new_v4()));
        Database::new(path).unwrap()
    }

    #[tokio::test]
    async fn signup_bonus_lands_in_balance_and_ledger() {
        let db = temp_db();
        let profile = db
            .create_profile("user-1", "amara", Role::User, 100)
            .await
            .unwrap();
        assert_eq!(profile.tokens, 100);

        assert_eq!(db.fetch_balance("user-1").await.unwrap(), Some(100));
        let credits = db.list_credits_for_user("user-1").await.unwrap();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].reason, RewardReason::SignupBonus);
        assert_eq!(credits[0].amount, 100);
    }

    #[tokio::test]
    async fn read_credit_is_atomic_and_unique() {
        let db = temp_db();
        db.create_profile("user-1", "amara", Role::User, 100)
            .await
            .unwrap();

        let outcome = db
            .apply_read_credit("user-1", "article-1", 50, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, CreditOutcome::Credited(150));
        assert!(db.read_credit_exists("user-1", "article-1").await.unwrap());

        // Same pair again: the partial unique index rejects the insert and
        // the balance stays put.
        let outcome = db
            .apply_read_credit("user-1", "article-1", 50, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, CreditOutcome::Duplicate);
        assert_eq!(db.fetch_balance("user-1").await.unwrap(), Some(150));

        // A different article credits normally.
        let outcome = db
            .apply_read_credit("user-1", "article-2", 50, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, CreditOutcome::Credited(200));
    }

    #[tokio::test]
    async fn crediting_an_unknown_user_changes_nothing() {
        let db = temp_db();
        let outcome = db
            .apply_read_credit("ghost", "article-1", 50, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, CreditOutcome::MissingProfile);
        assert!(db
            .list_credits_for_user("ghost")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn adjustment_floors_at_zero_and_is_ledgered() {
        let db = temp_db();
        db.create_profile("user-1", "amara", Role::User, 100)
            .await
            .unwrap();

        let outcome = db.apply_adjustment("user-1", -500, Utc::now()).await.unwrap();
        assert_eq!(outcome, CreditOutcome::Credited(0));

        let credits = db.list_credits_for_user("user-1").await.unwrap();
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[1].reason, RewardReason::Adjustment);
        assert_eq!(credits[1].amount, -500);
        assert_eq!(credits[1].article_id, None);
    }
}
