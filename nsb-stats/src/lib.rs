//! Practice and versus-bot history for the NSB quiz trainer.
//!
//! All writes go through [`Tracker`], which records events into a [`tally::SyncEngine`]. The engine keeps the
//! on-device cache current and, when someone is signed in, mirrors it to Supabase.

pub mod config;
pub mod events;
pub mod stats;
pub mod supabase;

use std::sync::Arc;

use chrono::Utc;
use tally::{
    AuthError, AuthEvent, AuthProvider, Change, FileCache, ListenerKey, LocalCache, PendingUpload,
    ReconcileOutcome, RemoteAdapter, SessionMonitor, SyncEngine, Timestamped, User,
};

pub use config::{ConfigError, TrackerConfig};
pub use events::{
    Difficulty, PracticeAnswer, PracticeEvent, QuestionType, StatsSnapshot, VersusEvent,
    VersusMatch,
};
pub use stats::{PracticeStats, VersusStats};
pub use supabase::{SupabaseBackend, SupabaseConfig};

pub struct Tracker {
    engine: SyncEngine<StatsSnapshot>,
    monitor: SessionMonitor,
    auth: Option<Arc<dyn AuthProvider>>,
    supabase: Option<Arc<SupabaseBackend>>,
}

impl Tracker {
    pub fn new(
        local: impl LocalCache<StatsSnapshot> + 'static,
        remote: Option<Arc<dyn RemoteAdapter<StatsSnapshot>>>,
        auth: Option<Arc<dyn AuthProvider>>,
    ) -> Self {
        Self {
            engine: SyncEngine::new(local, remote),
            monitor: SessionMonitor::new(),
            auth,
            supabase: None,
        }
    }

    pub fn local_only(local: impl LocalCache<StatsSnapshot> + 'static) -> Self {
        Self::new(local, None, None)
    }

    /// A tracker backed by the configured cache file and, if configured, Supabase.
    pub fn from_config(config: &TrackerConfig, access_token: Option<String>) -> Self {
        let local = FileCache::new(&config.cache_path);
        match &config.supabase {
            Some(supabase_config) => {
                let backend = Arc::new(SupabaseBackend::new(supabase_config.clone(), access_token));
                let remote: Arc<dyn RemoteAdapter<StatsSnapshot>> = backend.clone();
                let auth: Arc<dyn AuthProvider> = backend.clone();
                Self {
                    supabase: Some(backend),
                    ..Self::new(local, Some(remote), Some(auth))
                }
            }
            None => Self::local_only(local),
        }
    }

    /// Pick up whatever session the auth provider already has, syncing if someone is signed in.
    pub async fn start(&self) -> Option<ReconcileOutcome> {
        let user = match &self.auth {
            Some(auth) => auth.current_user().await,
            None => None,
        };
        self.handle_auth_event(AuthEvent::SessionEstablished(user)).await
    }

    pub async fn handle_auth_event(&self, event: AuthEvent) -> Option<ReconcileOutcome> {
        let transition = self.monitor.observe(event);
        self.engine.apply(&transition).await
    }

    /// Like [`Tracker::handle_auth_event`], but also hands the session's access token to the Supabase backend
    /// first, so the sync that follows runs as the new session. Use this for sign-ins and token refreshes.
    pub async fn handle_session(
        &self,
        event: AuthEvent,
        access_token: Option<String>,
    ) -> Option<ReconcileOutcome> {
        let access_token = match event {
            AuthEvent::SessionCleared => None,
            _ => access_token,
        };
        self.set_access_token(access_token);
        self.handle_auth_event(event).await
    }

    /// Returns false if this tracker has no Supabase backend to give the token to.
    pub fn set_access_token(&self, access_token: Option<String>) -> bool {
        match &self.supabase {
            Some(backend) => {
                backend.set_access_token(access_token);
                true
            }
            None => false,
        }
    }

    /// Call this every time a toss-up or bonus is answered in practice mode.
    pub fn record_practice_answer(&self, answer: PracticeAnswer) -> PendingUpload {
        let mut snapshot = self.engine.snapshot();
        snapshot.practice_history.push(Timestamped::now(answer));
        self.engine.persist(snapshot, &self.monitor.session())
    }

    /// Call this at the end of a match against the bot.
    pub fn record_versus_match(&self, versus: VersusMatch) -> PendingUpload {
        let mut snapshot = self.engine.snapshot();
        snapshot.versus_history.push(Timestamped::now(versus));
        self.engine.persist(snapshot, &self.monitor.session())
    }

    pub fn practice_stats(&self) -> PracticeStats {
        stats::practice_stats(&self.engine.snapshot(), Utc::now())
    }

    pub fn versus_stats(&self) -> VersusStats {
        stats::versus_stats(&self.engine.snapshot())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.engine.snapshot()
    }

    pub fn user(&self) -> Option<User> {
        self.monitor.session().user().cloned()
    }

    /// End the session with the auth provider. On success the local history is cleared.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let auth = self.auth.as_ref().ok_or(AuthError::NotConfigured)?;
        auth.sign_out().await.inspect_err(|e| {
            log::error!("Sign out failed: {e}");
        })?;
        self.handle_auth_event(AuthEvent::SessionCleared).await;
        Ok(())
    }

    /// Wipe the history on this device and, if signed in, in the account too.
    pub fn clear_all(&self) -> PendingUpload {
        self.engine.clear_all(&self.monitor.session())
    }

    pub fn subscribe(&self, listener: impl Fn(Change) + Send + Sync + 'static) -> ListenerKey {
        self.engine.subscribe(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.engine.unsubscribe(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config(dir: &std::path::Path) -> TrackerConfig {
        TrackerConfig {
            cache_path: dir.join("nsb_stats.json"),
            supabase: Some(SupabaseConfig {
                supabase_url: "http://127.0.0.1:9".to_string(),
                supabase_anon_key: "anon".to_string(),
            }),
        }
    }

    fn token(tracker: &Tracker) -> Option<String> {
        tracker.supabase.as_ref().and_then(|backend| backend.access_token())
    }

    #[tokio::test]
    async fn test_new_session_after_sign_out_gets_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::from_config(&unreachable_config(dir.path()), Some("first".to_string()));
        assert_eq!(token(&tracker), Some("first".to_string()));

        tracker.handle_session(AuthEvent::SessionCleared, Some("ignored".to_string())).await;
        assert_eq!(token(&tracker), None);

        tracker
            .handle_session(
                AuthEvent::SessionEstablished(Some(User::new("u1"))),
                Some("second".to_string()),
            )
            .await;
        assert_eq!(token(&tracker), Some("second".to_string()));
        assert_eq!(tracker.user(), Some(User::new("u1")));
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_session() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::from_config(&unreachable_config(dir.path()), None);

        tracker
            .handle_session(
                AuthEvent::SessionEstablished(Some(User::new("u1"))),
                Some("first".to_string()),
            )
            .await;
        let outcome = tracker
            .handle_session(
                AuthEvent::SessionChanged(Some(User::new("u1"))),
                Some("refreshed".to_string()),
            )
            .await;

        assert_eq!(outcome, None);
        assert_eq!(token(&tracker), Some("refreshed".to_string()));
    }

    #[test]
    fn test_local_only_config_has_no_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            cache_path: dir.path().join("nsb_stats.json"),
            supabase: None,
        };
        let tracker = Tracker::from_config(&config, Some("t".to_string()));
        assert!(!tracker.set_access_token(Some("t".to_string())));
    }
}
