//! # SyncEngine
//! The single path through which snapshots reach the local cache and the remote store.
//!
//! [`SyncEngine::persist`] is used for every mutation: the local cache is written synchronously, then the whole
//! snapshot is uploaded in the background if someone is signed in. [`SyncEngine::reconcile`] merges the local and
//! remote snapshots when a user signs in. The two never coordinate; both replace whole values and the merge is
//! idempotent, so re-running either one is always safe.
//!
//! Without a remote adapter the engine runs in local-only mode through the same code paths.

use std::sync::{Arc, Mutex};

use slotmap::SlotMap;

use crate::local::LocalCache;
use crate::remote::RemoteAdapter;
use crate::session::{Session, Transition};
use crate::Mergeable;

slotmap::new_key_type! {
    pub struct ListenerKey;
}

/// Why the local snapshot changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Recorded,
    Reconciled,
    Cleared,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No remote store is configured.
    LocalOnly,
    /// The user had no remote record, so the local snapshot was uploaded as-is.
    Bootstrapped,
    /// Local and remote were merged and written back to both.
    Merged { events: usize },
}

type Listener = Arc<dyn Fn(Change) + Send + Sync>;

/// A background upload started by [`SyncEngine::persist`].
/// Dropping it does not cancel the upload.
#[derive(Debug)]
pub struct PendingUpload(Option<tokio::task::JoinHandle<()>>);

impl PendingUpload {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_scheduled(&self) -> bool {
        self.0.is_some()
    }

    /// Wait for the upload to finish. Upload failures are logged by the task itself, so this never fails.
    pub async fn finished(self) {
        if let Some(handle) = self.0
            && let Err(e) = handle.await
        {
            log::error!("Upload task did not complete: {e}");
        }
    }
}

pub struct SyncEngine<S: Mergeable> {
    local: Box<dyn LocalCache<S>>,
    remote: Option<Arc<dyn RemoteAdapter<S>>>,
    listeners: Mutex<SlotMap<ListenerKey, Listener>>,
}

impl<S: Mergeable> SyncEngine<S> {
    pub fn new(
        local: impl LocalCache<S> + 'static,
        remote: Option<Arc<dyn RemoteAdapter<S>>>,
    ) -> Self {
        Self {
            local: Box::new(local),
            remote,
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    pub fn local_only(local: impl LocalCache<S> + 'static) -> Self {
        Self::new(local, None)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// The current device state.
    pub fn snapshot(&self) -> S {
        self.local.load()
    }

    /// Write `snapshot` locally, then upload it in full if `session` is signed in.
    pub fn persist(&self, snapshot: S, session: &Session) -> PendingUpload {
        self.persist_as(snapshot, session, Change::Recorded)
    }

    /// Replace the local snapshot with an empty one and, if signed in, upload the empty snapshot too.
    pub fn clear_all(&self, session: &Session) -> PendingUpload {
        self.persist_as(S::default(), session, Change::Cleared)
    }

    /// Empty the local cache without touching the remote store.
    pub fn clear_local(&self) {
        self.save_local(&S::default(), Change::Cleared);
    }

    fn persist_as(&self, snapshot: S, session: &Session, change: Change) -> PendingUpload {
        self.save_local(&snapshot, change);

        let (Some(remote), Some(user_id)) = (&self.remote, session.user_id()) else {
            return PendingUpload::none();
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime available, skipping upload for {user_id}");
            return PendingUpload::none();
        };

        let remote = Arc::clone(remote);
        let user_id = user_id.to_string();
        PendingUpload(Some(runtime.spawn(async move {
            if let Err(e) = remote.upsert(&user_id, &snapshot).await {
                log::error!("Dropping upload of {} events for {user_id}: {e}", snapshot.num_events());
            }
        })))
    }

    /// Merge the local snapshot with the user's remote snapshot and write the result to both stores.
    pub async fn reconcile(&self, user_id: &str) -> ReconcileOutcome {
        let Some(remote) = &self.remote else {
            log::debug!("No remote store configured, nothing to reconcile for {user_id}");
            return ReconcileOutcome::LocalOnly;
        };

        let Some(remote_snapshot) = remote.fetch(user_id).await else {
            // no record yet, or the fetch failed; either way the local snapshot becomes the remote one
            let local = self.local.load();
            log::info!(
                "No remote snapshot for {user_id}, uploading {} local events",
                local.num_events()
            );
            if let Err(e) = remote.upsert(user_id, &local).await {
                log::error!("Bootstrap upload for {user_id} failed: {e}");
            }
            return ReconcileOutcome::Bootstrapped;
        };

        // read local only after the fetch, so events recorded meanwhile are included
        let local = self.local.load();
        let merged = S::merge(&local, &remote_snapshot);
        log::info!(
            "Merged {} local and {} remote events into {} for {user_id}",
            local.num_events(),
            remote_snapshot.num_events(),
            merged.num_events()
        );

        self.save_local(&merged, Change::Reconciled);
        if let Err(e) = remote.upsert(user_id, &merged).await {
            log::error!("Upload of merged snapshot for {user_id} failed: {e}");
        }

        ReconcileOutcome::Merged {
            events: merged.num_events(),
        }
    }

    /// Carry out what a session transition requires of the stored data.
    pub async fn apply(&self, transition: &Transition) -> Option<ReconcileOutcome> {
        match transition {
            Transition::Unchanged => None,
            Transition::SignedIn(user_id) => Some(self.reconcile(user_id).await),
            Transition::SignedOut => {
                self.clear_local();
                None
            }
            Transition::SwitchedUser { to, .. } => {
                self.clear_local();
                Some(self.reconcile(to).await)
            }
        }
    }

    /// Listeners are called after every successful local write, with no lock held. A listener may write to the
    /// engine itself, which notifies every listener again.
    pub fn subscribe(&self, listener: impl Fn(Change) + Send + Sync + 'static) -> ListenerKey {
        self.lock_listeners().insert(Arc::new(listener))
    }

    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.lock_listeners().remove(key).is_some()
    }

    fn save_local(&self, snapshot: &S, change: Change) {
        match self.local.save(snapshot) {
            Ok(()) => {
                let listeners: Vec<Listener> = self.lock_listeners().values().cloned().collect();
                for listener in listeners {
                    listener(change);
                }
            }
            Err(e) => log::error!("Failed to save snapshot locally ({change:?}): {e}"),
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, SlotMap<ListenerKey, Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
