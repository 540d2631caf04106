//! Tracks who is signed in.
//!
//! The session is owned here and nowhere else. Callers read a copy with [`SessionMonitor::session`] and pass it
//! explicitly to the engine.

use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn is_present(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }
}

/// Notifications from the authentication provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SessionEstablished(Option<User>),
    SessionChanged(Option<User>),
    SessionCleared,
}

impl AuthEvent {
    fn into_user(self) -> Option<User> {
        match self {
            AuthEvent::SessionEstablished(user) | AuthEvent::SessionChanged(user) => user,
            AuthEvent::SessionCleared => None,
        }
    }
}

/// What an observed auth event means for the stored data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    SignedIn(String),
    SignedOut,
    SwitchedUser { from: String, to: String },
}

#[derive(Debug, Default)]
pub struct SessionMonitor {
    session: Mutex<Session>,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Session {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record the provider's new state and report the transition it caused.
    pub fn observe(&self, event: AuthEvent) -> Transition {
        let next = event.into_user();
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());

        let transition = match (session.user_id(), next.as_ref()) {
            (None, None) => Transition::Unchanged,
            (None, Some(user)) => Transition::SignedIn(user.id.clone()),
            (Some(_), None) => Transition::SignedOut,
            (Some(current), Some(user)) if current == user.id => Transition::Unchanged,
            (Some(current), Some(user)) => Transition::SwitchedUser {
                from: current.to_string(),
                to: user.id.clone(),
            },
        };

        if transition != Transition::Unchanged {
            log::info!("Session transition: {transition:?}");
        }
        session.user = next;
        transition
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Transport(String),
    #[error("auth provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("no authentication provider is configured")]
    NotConfigured,
    #[error("there is no active session")]
    NoSession,
}

/// The external authentication provider. Its state changes are observed, never initiated, except for sign-out.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<User>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_anonymous() {
        let monitor = SessionMonitor::new();
        assert!(!monitor.session().is_present());
    }

    #[test]
    fn test_sign_in_then_out() {
        let monitor = SessionMonitor::new();

        let t = monitor.observe(AuthEvent::SessionEstablished(Some(User::new("u1"))));
        assert_eq!(t, Transition::SignedIn("u1".to_string()));
        assert_eq!(monitor.session().user_id(), Some("u1"));

        let t = monitor.observe(AuthEvent::SessionCleared);
        assert_eq!(t, Transition::SignedOut);
        assert_eq!(monitor.session(), Session::anonymous());
    }

    #[test]
    fn test_same_user_refresh_is_noop_but_updates_record() {
        let monitor = SessionMonitor::new();
        monitor.observe(AuthEvent::SessionEstablished(Some(User::new("u1"))));

        let refreshed = User {
            id: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
        };
        let t = monitor.observe(AuthEvent::SessionChanged(Some(refreshed.clone())));
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(monitor.session().user(), Some(&refreshed));
    }

    #[test]
    fn test_different_user_is_a_switch() {
        let monitor = SessionMonitor::new();
        monitor.observe(AuthEvent::SessionEstablished(Some(User::new("u1"))));

        let t = monitor.observe(AuthEvent::SessionChanged(Some(User::new("u2"))));
        assert_eq!(
            t,
            Transition::SwitchedUser {
                from: "u1".to_string(),
                to: "u2".to_string()
            }
        );
    }

    #[test]
    fn test_anonymous_events_do_nothing() {
        let monitor = SessionMonitor::new();
        assert_eq!(
            monitor.observe(AuthEvent::SessionEstablished(None)),
            Transition::Unchanged
        );
        assert_eq!(monitor.observe(AuthEvent::SessionCleared), Transition::Unchanged);
    }
}
