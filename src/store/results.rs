//! Match result persistence over a PostgREST-style REST API
//!
//! A row is written when the match starts and again with the outcome when it
//! finishes, so an abandoned process still leaves a trace of the match having
//! run. Both writes are keyed upserts on `match_id`: the initiation write
//! never overwrites an outcome that already landed, and the completion write
//! wins regardless of arrival order, so a match that ends within its first
//! ticks still records its result. The store is optional: without
//! credentials every call is a logged no-op and gameplay is unaffected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::game::MatchResult;

const MATCHES_TABLE: &str = "matches";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store rejected request: {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Serialize)]
struct MatchRow {
    match_id: Uuid,
    #[serde(rename = "type")]
    mode: &'static str,
    user_id_first: String,
    user_id_second: String,
    alias_first: String,
    alias_second: String,
    first_score: u32,
    second_score: u32,
    winner_id: String,
    winner_alias: String,
    date: DateTime<Utc>,
}

impl MatchRow {
    fn from_result(result: &MatchResult) -> Self {
        Self {
            match_id: result.match_id,
            mode: result.mode,
            user_id_first: result.left_identity.clone(),
            user_id_second: result.right_identity.clone(),
            alias_first: result.left_alias.clone(),
            alias_second: result.right_alias.clone(),
            first_score: result.left_score,
            second_score: result.right_score,
            winner_id: result.winner_identity.clone(),
            winner_alias: result.winner_alias.clone(),
            date: Utc::now(),
        }
    }
}

struct StoreTarget {
    base_url: String,
    service_key: String,
}

/// Client for the match history table. Holds no per-match state; sessions
/// share one instance.
pub struct ResultStore {
    client: reqwest::Client,
    target: Option<StoreTarget>,
}

impl ResultStore {
    pub fn new(config: &Config) -> Self {
        let target = match (&config.match_db_url, &config.match_db_service_key) {
            (Some(base_url), Some(service_key)) => Some(StoreTarget {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key: service_key.clone(),
            }),
            _ => None,
        };
        Self {
            client: reqwest::Client::new(),
            target,
        }
    }

    /// Store that drops every write. Used when no credentials are configured
    /// and in tests.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            target: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Write the initiation row for a match that just started. Keyed upsert
    /// that keeps an existing row, so it is a no-op when the completion
    /// write beat it there.
    pub async fn record_start(&self, result: MatchResult) -> Result<(), StoreError> {
        let Some(target) = &self.target else {
            debug!(match_id = %result.match_id, "result store disabled, skipping initiation record");
            return Ok(());
        };

        let row = MatchRow::from_result(&result);
        let response = self
            .client
            .post(format!(
                "{}/rest/v1/{MATCHES_TABLE}?on_conflict=match_id",
                target.base_url
            ))
            .header("apikey", &target.service_key)
            .header("Authorization", format!("Bearer {}", target.service_key))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;

        Self::check(response).await
    }

    /// Write the final outcome. Keyed upsert that replaces the initiation
    /// row, or creates the row outright when the initiation write has not
    /// landed yet.
    pub async fn persist_result(&self, result: &MatchResult) -> Result<(), StoreError> {
        let Some(target) = &self.target else {
            debug!(match_id = %result.match_id, "result store disabled, skipping outcome");
            return Ok(());
        };

        let row = MatchRow::from_result(result);
        let response = self
            .client
            .post(format!(
                "{}/rest/v1/{MATCHES_TABLE}?on_conflict=match_id",
                target.base_url
            ))
            .header("apikey", &target.service_key)
            .header("Authorization", format!("Bearer {}", target.service_key))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api { status, body })
    }
}
