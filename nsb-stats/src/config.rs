use std::path::PathBuf;

use crate::supabase::SupabaseConfig;

pub const DEFAULT_CACHE_PATH: &str = "nsb_stats.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{present} is set but {missing} is not; set both or neither")]
    PartialSupabase {
        present: &'static str,
        missing: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// The single file that holds this device's snapshot.
    pub cache_path: PathBuf,
    /// `None` runs the tracker in local-only mode.
    pub supabase: Option<SupabaseConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            supabase: None,
        }
    }
}

impl TrackerConfig {
    /// Reads `NSB_STATS_CACHE`, `SUPABASE_URL` and `SUPABASE_ANON_KEY`, loading a `.env` file first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            log::warn!("Ignoring unreadable .env file: {e}");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cache_path = lookup("NSB_STATS_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH));

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_ANON_KEY")) {
            (Some(supabase_url), Some(supabase_anon_key)) => Some(SupabaseConfig {
                supabase_url: supabase_url.trim_end_matches('/').to_string(),
                supabase_anon_key,
            }),
            (None, None) => {
                log::info!("Supabase is not configured, running in local-only mode");
                None
            }
            (Some(_), None) => {
                return Err(ConfigError::PartialSupabase {
                    present: "SUPABASE_URL",
                    missing: "SUPABASE_ANON_KEY",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::PartialSupabase {
                    present: "SUPABASE_ANON_KEY",
                    missing: "SUPABASE_URL",
                });
            }
        };

        Ok(Self {
            cache_path,
            supabase,
        })
    }
}
