use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::auth::Role;
use crate::models::{ArticleStatus, RewardReason};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_role(value: &str) -> Result<Role> {
    match value {
        "admin" => Ok(Role::Admin),
        "editor" => Ok(Role::Editor),
        "analyst" => Ok(Role::Analyst),
        "user" => Ok(Role::User),
        other => Err(anyhow!("unknown role {other}")),
    }
}

pub fn parse_article_status(value: &str) -> Result<ArticleStatus> {
    match value {
        "draft" => Ok(ArticleStatus::Draft),
        "review" => Ok(ArticleStatus::Review),
        "published" => Ok(ArticleStatus::Published),
        "archived" => Ok(ArticleStatus::Archived),
        other => Err(anyhow!("unknown article status {other}")),
    }
}

pub fn parse_reward_reason(value: &str) -> Result<RewardReason> {
    match value {
        "read_complete" => Ok(RewardReason::ReadComplete),
        "signup_bonus" => Ok(RewardReason::SignupBonus),
        "adjustment" => Ok(RewardReason::Adjustment),
        other => Err(anyhow!("unknown reward reason {other}")),
    }
}
