use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::models::Article;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("article {0} has a non-positive read-time estimate")]
    InvalidReadTime(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Active,
    Completed,
    Cancelled,
}

/// Emitted once per session, on the tick that first reaches 100% progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSignal {
    pub article_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub article_id: String,
    pub phase: SessionPhase,
    pub progress_percent: f64,
    pub expected_duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// One open-article reading session. Progress is a pure function of elapsed
/// time against the article's declared read-time; every operation takes an
/// explicit `Instant` so the machine can be driven on simulated time.
///
/// Phases only move forward: `Active -> Completed` or `Active -> Cancelled`,
/// both terminal. A terminal session ignores further ticks, which is what
/// discards stale timer callbacks delivered after a cancel.
#[derive(Debug, Clone)]
pub struct ReadingSession {
    article_id: String,
    started_at: DateTime<Utc>,
    expected_duration_ms: u64,
    progress_percent: f64,
    phase: SessionPhase,
    anchor: Instant,
}

impl ReadingSession {
    pub fn begin(
        article: &Article,
        started_at: DateTime<Utc>,
        now: Instant,
    ) -> Result<Self, TrackerError> {
        let expected_duration_ms = article.expected_duration_ms();
        if expected_duration_ms == 0 {
            return Err(TrackerError::InvalidReadTime(article.id.clone()));
        }

        Ok(Self {
            article_id: article.id.clone(),
            started_at,
            expected_duration_ms,
            progress_percent: 0.0,
            phase: SessionPhase::Active,
            anchor: now,
        })
    }

    pub fn article_id(&self) -> &str {
        &self.article_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase != SessionPhase::Active
    }

    /// Read-only view of progress as of `now`. Never decreases below what a
    /// previous tick recorded, and freezes once the session is terminal.
    pub fn progress_at(&self, now: Instant) -> f64 {
        if self.is_terminal() {
            return self.progress_percent;
        }

        let elapsed_ms = now
            .checked_duration_since(self.anchor)
            .unwrap_or_default()
            .as_millis() as u64;
        let raw = (elapsed_ms as f64 / self.expected_duration_ms as f64) * 100.0;
        raw.min(100.0).max(self.progress_percent)
    }

    /// Advance the session to `now`. Returns the completion signal on the
    /// single tick that first reaches 100%; every other call returns `None`,
    /// including repeat calls within the same tick window and any tick after
    /// a cancel. A delayed tick that overshoots the target still completes
    /// exactly once, clamped at 100%.
    pub fn tick(&mut self, now: Instant) -> Option<CompletionSignal> {
        if self.is_terminal() {
            return None;
        }

        self.progress_percent = self.progress_at(now);
        if self.progress_percent >= 100.0 {
            self.phase = SessionPhase::Completed;
            return Some(CompletionSignal {
                article_id: self.article_id.clone(),
            });
        }

        None
    }

    /// Cancel an active session. Completed sessions stay completed and a
    /// repeat cancel is a no-op, so this is safe to call unconditionally.
    pub fn cancel(&mut self) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Cancelled;
        }
    }

    pub fn snapshot_at(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            article_id: self.article_id.clone(),
            phase: self.phase,
            progress_percent: self.progress_at(now),
            expected_duration_ms: self.expected_duration_ms,
            started_at: self.started_at,
        }
    }
}
