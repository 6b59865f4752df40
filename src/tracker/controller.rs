use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::models::Article;

use super::state::{CompletionSignal, ReadingSession, SessionSnapshot, TrackerError};

pub struct TrackerConfig {
    pub clock: Arc<dyn Clock>,
    pub tick_interval: Duration,
    pub heartbeat_every_ticks: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let debug_mode = std::env::var("DADAPAY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            clock: Arc::new(SystemClock),
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }
}

struct TickerHandle {
    task: JoinHandle<()>,
    token: CancellationToken,
}

/// Async host for [`ReadingSession`]. Owns at most one session at a time and
/// the interval task that ticks it; completion signals go out over the
/// channel handed back by [`SessionTracker::new`]. Opening a new article
/// implicitly cancels whatever was being read before.
pub struct SessionTracker {
    state: Arc<Mutex<Option<ReadingSession>>>,
    ticker: Arc<Mutex<Option<TickerHandle>>>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
    completions: mpsc::UnboundedSender<CompletionSignal>,
}

impl SessionTracker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletionSignal>) {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(
        config: TrackerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CompletionSignal>) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let tracker = Self {
            state: Arc::new(Mutex::new(None)),
            ticker: Arc::new(Mutex::new(None)),
            clock: config.clock,
            tick_interval: config.tick_interval,
            heartbeat_every_ticks: config.heartbeat_every_ticks.max(1),
            completions,
        };
        (tracker, receiver)
    }

    /// Start reading `article`. Any prior active session is cancelled first,
    /// so at most one timer runs at a time.
    pub async fn start_session(&self, article: &Article) -> Result<SessionSnapshot, TrackerError> {
        self.stop_session().await;

        let now = self.clock.now();
        let session = ReadingSession::begin(article, Utc::now(), now)?;
        let snapshot = session.snapshot_at(now);

        {
            let mut guard = self.state.lock().await;
            *guard = Some(session);
        }

        self.spawn_ticker().await;
        info!(
            "Started reading session for article {} ({} ms target)",
            snapshot.article_id, snapshot.expected_duration_ms
        );

        Ok(snapshot)
    }

    /// Cancel the current session, if any. Safe to call when nothing is
    /// being read or the session already reached a terminal phase.
    pub async fn stop_session(&self) {
        {
            let mut guard = self.state.lock().await;
            if let Some(session) = guard.as_mut() {
                session.cancel();
            }
        }
        self.cancel_ticker().await;
    }

    /// Progress view for rendering; `None` when no article is open.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(|session| session.snapshot_at(self.clock.now()))
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.token.cancel();
            handle.task.abort();
        }

        let state = self.state.clone();
        let clock = self.clock.clone();
        let completions = self.completions.clone();
        let tick_interval = self.tick_interval;
        let heartbeat_every = self.heartbeat_every_ticks;
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            let mut ticks: u32 = 0;
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let now = clock.now();
                let (signal, progress, article_id) = {
                    let mut guard = state.lock().await;
                    let Some(session) = guard.as_mut() else { break };
                    if session.is_terminal() {
                        break;
                    }
                    let signal = session.tick(now);
                    (
                        signal,
                        session.progress_at(now),
                        session.article_id().to_string(),
                    )
                };

                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every == 0 {
                    debug!("Reading progress for article {article_id}: {progress:.0}%");
                }

                if let Some(signal) = signal {
                    info!("Reading session for article {} completed", signal.article_id);
                    if completions.send(signal).is_err() {
                        warn!("Completion receiver dropped; the finished read will not settle");
                    }
                    break;
                }
            }
        });

        *ticker_guard = Some(TickerHandle { task, token });
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.token.cancel();
            handle.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::models::ArticleStatus;
    use crate::tracker::state::SessionPhase;

    fn article(id: &str, read_minutes: u32) -> Article {
        let now = Utc::now();
        Article {
            id: id.into(),
            title: format!("Article {id}"),
            slug: format!("article-{id}"),
            excerpt: String::new(),
            content: String::new(),
            cover_url: None,
            category_id: None,
            author: "author".into(),
            status: ArticleStatus::Published,
            read_minutes,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn fast_tracker(
        clock: Arc<ManualClock>,
    ) -> (SessionTracker, mpsc::UnboundedReceiver<CompletionSignal>) {
        SessionTracker::with_config(TrackerConfig {
            clock,
            tick_interval: Duration::from_millis(5),
            heartbeat_every_ticks: 1000,
        })
    }

    #[tokio::test]
    async fn completion_signal_arrives_once() {
        let clock = Arc::new(ManualClock::new());
        let (tracker, mut completions) = fast_tracker(clock.clone());

        tracker.start_session(&article("a1", 1)).await.unwrap();
        clock.advance(Duration::from_secs(61));

        let signal = time::timeout(Duration::from_secs(2), completions.recv())
            .await
            .expect("completion should arrive")
            .expect("channel open");
        assert_eq!(signal.article_id, "a1");

        // The ticker stops after completing; no further signal can show up.
        time::sleep(Duration::from_millis(50)).await;
        assert!(completions.try_recv().is_err());

        let snapshot = tracker.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Completed);
        assert_eq!(snapshot.progress_percent, 100.0);
    }

    #[tokio::test]
    async fn stopped_session_never_completes() {
        let clock = Arc::new(ManualClock::new());
        let (tracker, mut completions) = fast_tracker(clock.clone());

        tracker.start_session(&article("a1", 1)).await.unwrap();
        clock.advance(Duration::from_secs(30));
        time::sleep(Duration::from_millis(25)).await;

        tracker.stop_session().await;
        clock.advance(Duration::from_secs(300));
        time::sleep(Duration::from_millis(50)).await;

        assert!(completions.try_recv().is_err());
        let snapshot = tracker.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Cancelled);
    }

    #[tokio::test]
    async fn opening_a_new_article_supersedes_the_old_session() {
        let clock = Arc::new(ManualClock::new());
        let (tracker, mut completions) = fast_tracker(clock.clone());

        tracker.start_session(&article("a1", 1)).await.unwrap();
        clock.advance(Duration::from_secs(30));
        time::sleep(Duration::from_millis(25)).await;

        tracker.start_session(&article("a2", 1)).await.unwrap();
        let snapshot = tracker.snapshot().await.unwrap();
        assert_eq!(snapshot.article_id, "a2");

        clock.advance(Duration::from_secs(61));
        let signal = time::timeout(Duration::from_secs(2), completions.recv())
            .await
            .expect("completion should arrive")
            .expect("channel open");
        assert_eq!(signal.article_id, "a2");
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_read_time_is_rejected_up_front() {
        let clock = Arc::new(ManualClock::new());
        let (tracker, _completions) = fast_tracker(clock);

        let err = tracker.start_session(&article("bad", 0)).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidReadTime(_)));
        assert!(tracker.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_no_op() {
        let clock = Arc::new(ManualClock::new());
        let (tracker, _completions) = fast_tracker(clock);
        tracker.stop_session().await;
        assert!(tracker.snapshot().await.is_none());
    }
}
