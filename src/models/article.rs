use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds per declared read-minute.
pub const MS_PER_READ_MINUTE: u64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArticleStatus {
    Draft,
    Review,
    Published,
    Archived,
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Draft
    }
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Review => "review",
            ArticleStatus::Published => "published",
            ArticleStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_url: Option<String>,
    pub category_id: Option<String>,
    pub author: String,
    pub status: ArticleStatus,
    /// Declared read-time estimate in minutes. Zero means the metadata is
    /// malformed; the tracker refuses to start a session for it.
    pub read_minutes: u32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn expected_duration_ms(&self) -> u64 {
        u64::from(self.read_minutes) * MS_PER_READ_MINUTE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}
