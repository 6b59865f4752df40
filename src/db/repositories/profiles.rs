use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::auth::Role;
use crate::db::{
    helpers::{parse_datetime, parse_role, to_i64, to_u64},
    Database,
};
use crate::models::Profile;

fn row_to_profile(row: &Row) -> Result<Profile> {
    let role: String = row.get("role")?;
    let tokens: i64 = row.get("tokens")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Profile {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        role: parse_role(&role)?,
        tokens: to_u64(tokens, "tokens")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Create a profile and grant the signup bonus in the same transaction,
    /// recording the bonus in the reward ledger.
    pub async fn create_profile(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
        signup_bonus: u64,
    ) -> Result<Profile> {
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            role,
            tokens: signup_bonus,
            created_at: now,
            updated_at: now,
        };

        let record = profile.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO profiles (id, user_id, username, role, tokens, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.username,
                    record.role.as_str(),
                    to_i64(record.tokens)?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            if record.tokens > 0 {
                tx.execute(
                    "INSERT INTO reward_credits (id, user_id, article_id, amount, reason, awarded_at)
                     VALUES (?1, ?2, NULL, ?3, 'signup_bonus', ?4)",
                    params![
                        Uuid::new_v4().to_string(),
                        record.user_id,
                        to_i64(record.tokens)?,
                        record.created_at.to_rfc3339(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, username, role, tokens, created_at, updated_at
                 FROM profiles
                 WHERE user_id = ?1",
            )?;

            let row = stmt
                .query_row(params![user_id], |row| {
                    Ok(row_to_profile(row))
                })
                .optional()?;
            row.transpose()
        })
        .await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, username, role, tokens, created_at, updated_at
                 FROM profiles
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut profiles = Vec::new();
            while let Some(row) = rows.next()? {
                profiles.push(row_to_profile(row)?);
            }

            Ok(profiles)
        })
        .await
    }
}
