//! This is a library for keeping a user's event history available offline and across devices.
//! It was created for the NSB practice tracker, so it doesn't include much that was not needed for that project.
//!
//! Syncing strategy:
//! 1. The device keeps one snapshot of the user's history in a local cache. Every mutation rewrites the whole snapshot.
//! 2. If the user is signed in, each mutation is followed by a fire-and-forget upload of the whole snapshot to the remote store.
//! 3. When a user signs in, the local and remote snapshots are merged and the result is written to both:
//!   1. If the remote store has no record for the user, the local snapshot is uploaded as-is.
//!   2. Otherwise events are deduplicated by timestamp, with the remote copy winning on collision.
//! 4. When the user signs out, the local cache is emptied.
//!
//! There is no locking and there are no retries. A dropped upload is repaired by the next mutation or the next sign-in,
//! because every upload carries the entire history.

pub mod data_model;
pub mod engine;
pub mod local;
pub mod remote;
pub mod session;

pub use data_model::{Timestamp, Timestamped, merge_by_timestamp};
pub use engine::{Change, ListenerKey, PendingUpload, ReconcileOutcome, SyncEngine};
pub use local::{CacheError, FileCache, LocalCache, MemoryCache};
pub use remote::{MemoryRemote, RemoteAdapter, RemoteError};
pub use session::{AuthError, AuthEvent, AuthProvider, Session, SessionMonitor, Transition, User};

/// A whole-document value that the engine stores locally and remotely.
pub trait Mergeable:
    Default + Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
    /// Combine a local and a remote snapshot into one canonical snapshot.
    /// Must be idempotent: `merge(&merge(a, b), b) == merge(a, b)`.
    fn merge(local: &Self, remote: &Self) -> Self;

    fn num_events(&self) -> usize;
}
