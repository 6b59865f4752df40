pub mod auth;
pub mod clock;
pub mod db;
pub mod models;
pub mod notify;
pub mod settings;
pub mod settlement;
pub mod storage;
pub mod tracker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tokio::sync::mpsc;

use auth::{IdentityProvider, Role};
use db::Database;
use models::Profile;
use notify::{NoticeKind, NotificationSink};
use settings::SettingsStore;
use settlement::{FixedReward, SettlementError, SettlementService};
use tracker::{CompletionSignal, SessionSnapshot, SessionTracker, TrackerConfig, TrackerError};

/// Initialize logging (reads RUST_LOG env var). Host applications call this
/// once at startup.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

/// Top-level wiring of the reader-rewards core: the session tracker feeds
/// completion signals to the settlement service, which credits tokens
/// through the SQLite store and reports outcomes to the notification sink.
///
/// Must be constructed inside a tokio runtime; the settlement worker and the
/// session ticker run as tasks on it.
pub struct ReaderApp {
    db: Database,
    settings: SettingsStore,
    tracker: SessionTracker,
    settlement: Arc<SettlementService>,
    notifier: Arc<dyn NotificationSink>,
}

impl ReaderApp {
    pub fn new(
        data_dir: PathBuf,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        Self::with_tracker_config(data_dir, identity, notifier, TrackerConfig::default())
    }

    pub fn with_tracker_config(
        data_dir: PathBuf,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
        tracker_config: TrackerConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;

        let db = Database::new(data_dir.join("dadapay.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let rewards = settings.rewards();

        let settlement = Arc::new(SettlementService::new(
            Arc::new(db.clone()),
            Box::new(FixedReward::new(rewards.read_reward)),
            notifier.clone(),
        ));

        let (tracker, completions) = SessionTracker::with_config(tracker_config);
        spawn_settlement_worker(completions, settlement.clone(), identity);

        Ok(Self {
            db,
            settings,
            tracker,
            settlement,
            notifier,
        })
    }

    /// Open an article for reading. Cancels whatever was open before.
    pub async fn open_article(
        &self,
        article: &models::Article,
    ) -> Result<SessionSnapshot, TrackerError> {
        self.tracker.start_session(article).await
    }

    /// Close the current article view. A partial read earns nothing.
    pub async fn close_article(&self) {
        self.tracker.stop_session().await;
    }

    pub async fn reading_progress(&self) -> Option<SessionSnapshot> {
        self.tracker.snapshot().await
    }

    /// Register a reader profile, granting the configured signup bonus.
    pub async fn sign_up(&self, user_id: &str, username: &str) -> Result<Profile> {
        let bonus = self.settings.rewards().signup_bonus;
        let profile = self
            .db
            .create_profile(user_id, username, Role::User, bonus)
            .await?;
        info!("Created profile {username} ({user_id}) with {bonus} starting tokens");
        self.notifier.notify(
            NoticeKind::Success,
            &format!("Welcome! You've received {bonus} starting tokens."),
        );
        Ok(profile)
    }

    pub async fn token_balance(&self, user_id: &str) -> Result<Option<u64>> {
        self.db.fetch_balance(user_id).await
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn settlement(&self) -> &SettlementService {
        &self.settlement
    }
}

fn spawn_settlement_worker(
    mut completions: mpsc::UnboundedReceiver<CompletionSignal>,
    settlement: Arc<SettlementService>,
    identity: Arc<dyn IdentityProvider>,
) {
    tokio::spawn(async move {
        while let Some(signal) = completions.recv().await {
            let principal = identity.current_principal();
            match settlement
                .settle_completion(principal.as_ref(), &signal.article_id)
                .await
            {
                Ok(settled) => info!(
                    "Read of article {} settled for {} tokens",
                    signal.article_id, settled.amount
                ),
                // Benign repeats and declined rules need no follow-up.
                Err(SettlementError::AlreadyCredited) | Err(SettlementError::Ineligible) => {}
                Err(err) => warn!("Settlement for article {} failed: {err}", signal.article_id),
            }
        }
    });
}

/// Re-exported building blocks most hosts need.
pub use auth::{has_capability, Action};
pub use notify::LogNotifier;
pub use settlement::Settlement;
pub use storage::{RewardStore, StoreError};

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::auth::Principal;
    use crate::clock::test_support::ManualClock;
    use crate::models::{Article, ArticleStatus};

    struct StaticIdentity(StdMutex<Option<Principal>>);

    impl StaticIdentity {
        fn anonymous() -> Arc<Self> {
            Arc::new(Self(StdMutex::new(None)))
        }

        fn set(&self, principal: Option<Principal>) {
            *self.0.lock().unwrap() = principal;
        }
    }

    impl IdentityProvider for StaticIdentity {
        fn current_principal(&self) -> Option<Principal> {
            self.0.lock().unwrap().clone()
        }
    }

    fn published_article(id: &str, read_minutes: u32) -> Article {
        let now = Utc::now();
        Article {
            id: id.into(),
            title: format!("Article {id}"),
            slug: format!("article-{id}"),
            excerpt: "excerpt".into(),
            content: "content".into(),
            cover_url: None,
            category_id: None,
            author: "newsroom".into(),
            status: ArticleStatus::Published,
            read_minutes,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_app(clock: Arc<ManualClock>, identity: Arc<StaticIdentity>) -> ReaderApp {
        let data_dir = std::env::temp_dir().join(format!("dadapay-app-{}", Uuid::new_v4()));
        ReaderApp::with_tracker_config(
            data_dir,
            identity,
            Arc::new(LogNotifier),
            TrackerConfig {
                clock,
                tick_interval: Duration::from_millis(5),
                heartbeat_every_ticks: 1000,
            },
        )
        .unwrap()
    }

    async fn wait_for_balance(app: &ReaderApp, user_id: &str, expected: u64) {
        for _ in 0..200 {
            if app.token_balance(user_id).await.unwrap() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "balance never reached {expected}, last seen {:?}",
            app.token_balance(user_id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn completed_read_credits_tokens_exactly_once() {
        let clock = Arc::new(ManualClock::new());
        let identity = StaticIdentity::anonymous();
        let app = test_app(clock.clone(), identity.clone());

        let profile = app.sign_up("user-1", "amara").await.unwrap();
        assert_eq!(profile.tokens, 100);
        identity.set(Some(Principal {
            user_id: "user-1".into(),
            role: Role::User,
        }));

        let article = published_article("a1", 1);
        app.db().insert_article(&article).await.unwrap();

        app.open_article(&article).await.unwrap();
        clock.advance(Duration::from_secs(61));
        wait_for_balance(&app, "user-1", 150).await;

        // A duplicate completion delivery settles as a benign no-op.
        let principal = identity.current_principal().unwrap();
        let err = app
            .settlement()
            .settle_completion(Some(&principal), "a1")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::AlreadyCredited));
        assert_eq!(app.token_balance("user-1").await.unwrap(), Some(150));
    }

    #[tokio::test]
    async fn anonymous_completion_is_not_credited_and_stays_earnable() {
        let clock = Arc::new(ManualClock::new());
        let identity = StaticIdentity::anonymous();
        let app = test_app(clock.clone(), identity.clone());

        app.sign_up("user-1", "amara").await.unwrap();

        let article = published_article("a1", 1);
        app.open_article(&article).await.unwrap();
        clock.advance(Duration::from_secs(61));

        // Give the completion time to flow through settlement and fail.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(app.token_balance("user-1").await.unwrap(), Some(100));

        // No marker was set for the anonymous attempt, so re-reading after
        // signing in still earns the reward.
        let principal = Principal {
            user_id: "user-1".into(),
            role: Role::User,
        };
        let settled = app
            .settlement()
            .settle_completion(Some(&principal), "a1")
            .await
            .unwrap();
        assert_eq!(settled.new_balance, 150);
    }

    #[tokio::test]
    async fn cancelled_read_settles_nothing() {
        let clock = Arc::new(ManualClock::new());
        let identity = StaticIdentity::anonymous();
        let app = test_app(clock.clone(), identity.clone());

        app.sign_up("user-1", "amara").await.unwrap();
        identity.set(Some(Principal {
            user_id: "user-1".into(),
            role: Role::User,
        }));

        let article = published_article("a1", 1);
        app.open_article(&article).await.unwrap();
        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(25)).await;

        app.close_article().await;
        clock.advance(Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(app.token_balance("user-1").await.unwrap(), Some(100));
    }
}
