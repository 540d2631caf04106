//! On-device snapshot storage.
//!
//! A cache holds exactly one value. Reads are fail-soft: a missing or unparsable value loads as the empty snapshot.
//! Writes always replace the whole value.

use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait LocalCache<S>: Send + Sync {
    /// Returns the stored snapshot, or the default snapshot if nothing usable is stored.
    fn load(&self) -> S;

    /// Unconditionally replaces the stored snapshot.
    fn save(&self, snapshot: &S) -> Result<(), CacheError>;
}

fn parse_or_default<S: crate::Mergeable>(raw: &str, origin: &dyn std::fmt::Display) -> S {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("Discarding unreadable snapshot in {origin}: {e}");
        S::default()
    })
}

/// Stores the snapshot as a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<S: crate::Mergeable> LocalCache<S> for FileCache {
    fn load(&self) -> S {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => parse_or_default(&raw, &self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No snapshot at {}, starting empty", self.path.display());
                S::default()
            }
            Err(e) => {
                log::warn!("Failed to read snapshot at {}: {e}", self.path.display());
                S::default()
            }
        }
    }

    fn save(&self, snapshot: &S) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(snapshot)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        // write beside the target and rename over it, so readers never see a partial file
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        file.write_all(&bytes).map_err(|e| self.io_error(e))?;
        file.as_file().sync_all().map_err(|e| self.io_error(e))?;
        file.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        Ok(())
    }
}

/// Keeps the serialized snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    raw: Mutex<Option<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose stored value is the given text, parsable or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl<S: crate::Mergeable> LocalCache<S> for MemoryCache {
    fn load(&self) -> S {
        match self.raw() {
            Some(raw) => parse_or_default(&raw, &"memory cache"),
            None => S::default(),
        }
    }

    fn save(&self, snapshot: &S) -> Result<(), CacheError> {
        let raw = serde_json::to_string(snapshot)?;
        *self.raw.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw);
        Ok(())
    }
}
