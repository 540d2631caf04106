//! Utilities for syncing against a Supabase project.
//!
//! The snapshot lives in the `user_stats` table, one row per user, and is always replaced whole.
//! Signing in happens elsewhere; this module only needs the session's access token.
use std::sync::RwLock;

use async_trait::async_trait;
use postgrest::Postgrest;
use tally::{AuthError, AuthProvider, RemoteAdapter, RemoteError, User};

use crate::events::{PracticeEvent, StatsSnapshot, VersusEvent};

const USER_STATS_TABLE: &str = "user_stats";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

/// A row of `user_stats`. `updated_at` is informational and never read by the merge.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct UserStatsRow {
    user_id: String,
    #[serde(default)]
    practice_history: Option<Vec<PracticeEvent>>,
    #[serde(default)]
    versus_history: Option<Vec<VersusEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl UserStatsRow {
    fn from_snapshot(user_id: &str, snapshot: &StatsSnapshot) -> Self {
        Self {
            user_id: user_id.to_string(),
            practice_history: Some(snapshot.practice_history.clone()),
            versus_history: Some(snapshot.versus_history.clone()),
            updated_at: Some(tally::Timestamp::now().to_string()),
        }
    }

    fn into_snapshot(self) -> StatsSnapshot {
        StatsSnapshot {
            practice_history: self.practice_history.unwrap_or_default(),
            versus_history: self.versus_history.unwrap_or_default(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct AuthUserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Talks to PostgREST for the stats table and to the auth API for the session.
#[derive(Debug)]
pub struct SupabaseBackend {
    config: SupabaseConfig,
    access_token: RwLock<Option<String>>,
    http: reqwest::Client,
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig, access_token: Option<String>) -> Self {
        Self {
            config,
            access_token: RwLock::new(access_token),
            http: reqwest::Client::new(),
        }
    }

    /// Swap in a refreshed token, or `None` once the session has ended.
    pub fn set_access_token(&self, access_token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = access_token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn rest_client(&self, access_token: &str) -> Postgrest {
        let SupabaseConfig {
            supabase_url,
            supabase_anon_key,
        } = &self.config;

        Postgrest::new(format!("{supabase_url}/rest/v1"))
            .insert_header("apikey", supabase_anon_key)
            .insert_header("Authorization", format!("Bearer {access_token}"))
    }

    async fn try_fetch(&self, user_id: &str) -> Result<Option<StatsSnapshot>, RemoteError> {
        let access_token = self
            .access_token()
            .ok_or_else(|| RemoteError::Unauthenticated(user_id.to_string()))?;

        let response = self
            .rest_client(&access_token)
            .from(USER_STATS_TABLE)
            .select("*")
            .eq("user_id", user_id)
            .execute()
            .await
            .map_err(|e| RemoteError::Transport(format!("{e:?}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(format!("{e:?}")))?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<UserStatsRow> = serde_json::from_str(&body).inspect_err(|e| {
            log::error!("Failed to parse {USER_STATS_TABLE} response: {e}\nResponse body: {body}");
        })?;
        Ok(rows.into_iter().next().map(UserStatsRow::into_snapshot))
    }

    async fn auth_request(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AuthError> {
        let access_token = self.access_token().ok_or(AuthError::NoSession)?;
        let response = request
            .header("apikey", &self.config.supabase_anon_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("{e:?}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::Rejected { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteAdapter<StatsSnapshot> for SupabaseBackend {
    async fn fetch(&self, user_id: &str) -> Option<StatsSnapshot> {
        match self.try_fetch(user_id).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                log::info!("No {USER_STATS_TABLE} row for {user_id}");
                None
            }
            Err(e) => {
                log::error!("Failed to fetch stats for {user_id}: {e}");
                None
            }
        }
    }

    async fn upsert(&self, user_id: &str, snapshot: &StatsSnapshot) -> Result<(), RemoteError> {
        let access_token = self
            .access_token()
            .ok_or_else(|| RemoteError::Unauthenticated(user_id.to_string()))?;
        let body = serde_json::to_string(&UserStatsRow::from_snapshot(user_id, snapshot))?;

        let response = self
            .rest_client(&access_token)
            .from(USER_STATS_TABLE)
            .upsert(body)
            .on_conflict("user_id")
            .execute()
            .await
            .map_err(|e| RemoteError::Transport(format!("{e:?}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError::Status { status, body });
        }

        log::debug!(
            "Uploaded {} events for {user_id}",
            tally::Mergeable::num_events(snapshot)
        );
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for SupabaseBackend {
    async fn current_user(&self) -> Option<User> {
        let url = format!("{}/auth/v1/user", self.config.supabase_url);
        let response = self
            .auth_request(self.http.get(url))
            .await
            .inspect_err(|e| log::info!("No active session: {e}"))
            .ok()?;

        let user: AuthUserResponse = response
            .json()
            .await
            .inspect_err(|e| log::error!("Failed to parse auth user response: {e:?}"))
            .ok()?;
        Some(User {
            id: user.id,
            email: user.email,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/logout", self.config.supabase_url);
        self.auth_request(self.http.post(url)).await?;
        self.set_access_token(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_with_null_histories_reads_as_empty() {
        let row: UserStatsRow = serde_json::from_str(
            r#"{ "user_id": "u1", "practice_history": null, "versus_history": null, "updated_at": "2025-01-01T00:00:00Z" }"#,
        )
        .unwrap();
        assert_eq!(row.into_snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_row_wire_shape() {
        let row = UserStatsRow::from_snapshot("u1", &StatsSnapshot::default());
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["practice_history"], serde_json::json!([]));
        assert_eq!(json["versus_history"], serde_json::json!([]));
        assert!(json["updated_at"].is_string());
    }

    #[tokio::test]
    async fn test_fetch_without_token_is_none() {
        let backend = SupabaseBackend::new(
            SupabaseConfig {
                supabase_url: "http://127.0.0.1:9".to_string(),
                supabase_anon_key: "anon".to_string(),
            },
            None,
        );
        assert_eq!(backend.fetch("u1").await, None);
        assert!(matches!(
            backend.upsert("u1", &StatsSnapshot::default()).await,
            Err(RemoteError::Unauthenticated(_))
        ));
        assert!(matches!(backend.sign_out().await, Err(AuthError::NoSession)));
    }
}
