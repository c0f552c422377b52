// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ranking engine client.
//!
//! The ranking engine is the remote source of truth for surveys, items, and
//! voting state. This module holds the reqwest client, the wire types, and a
//! bounded lazy page sequence over the engine's list endpoints.
//!
//! The engine hands back absolute URLs on its resources (`current`,
//! `previous`, `vote`, `skip`); those URLs are always followed as given,
//! never reconstructed from ids.

pub mod session;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

const DEFAULT_BASE_URL: &str = "http://backend:8000";
const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("ranking engine configuration missing: {0}")]
    MissingConfig(String),

    #[error("ranking engine request failed: {0}")]
    Request(String),

    #[error("ranking engine resource not found")]
    NotFound,

    #[error("ranking engine returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("ranking engine response was invalid: {0}")]
    InvalidResponse(String),
}

impl From<RankingError> for ApiError {
    fn from(err: RankingError) -> Self {
        match err {
            RankingError::NotFound => ApiError::not_found(err.to_string()),
            _ => ApiError::server(err.to_string()),
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// DRF-style paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewSurveyWire {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_views: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_concurrent: Option<bool>,
}

/// Owner-editable subset; every field optional, PATCH semantics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditableSurveyWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_views: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_concurrent: Option<bool>,
}

impl EditableSurveyWire {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.max_time.is_none()
            && self.min_views.is_none()
            && self.allow_concurrent.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurveyWire {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub max_time: u32,
    #[serde(default)]
    pub min_views: u32,
    #[serde(default)]
    pub allow_concurrent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewItemWire {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An item as the engine returns it. Deserialize-only: the ranking internals
/// (`mu`, `sigma_squared`) must never reach an annotator, so the outward view
/// is the separate [`ItemView`].
#[derive(Debug, Clone, Deserialize)]
pub struct ItemWire {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub mu: f64,
    #[serde(default)]
    pub sigma_squared: f64,
}

/// The annotator-facing projection of an item.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ItemView {
    pub id: String,
    pub active: bool,
    pub name: String,
    pub metadata: Value,
}

impl From<&ItemWire> for ItemView {
    fn from(item: &ItemWire) -> Self {
        Self {
            id: item.id.clone(),
            active: item.active,
            name: item.name.clone(),
            metadata: item.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAnnotatorWire {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotatorWire {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Value,
    /// URL of the current item, if one is assigned.
    pub current: Option<String>,
    /// URL of the previous item, if any.
    pub previous: Option<String>,
    /// HATEOAS action URL for casting a vote.
    pub vote: String,
    /// HATEOAS action URL for skipping the current pair.
    pub skip: String,
    #[serde(default)]
    pub items_left: i64,
}

/// Response of the vote/skip action URLs: fresh pointers, inline items.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub current: Option<ItemWire>,
    pub previous: Option<ItemWire>,
    pub vote: String,
    pub skip: String,
    #[serde(default)]
    pub items_left: i64,
}

#[derive(Debug, Serialize)]
struct VoteBody {
    current_wins: bool,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct RankingClient {
    base_url: String,
    http: Client,
}

impl RankingClient {
    pub fn new(base_url: impl Into<String>, api_token: &str) -> Result<Self, RankingError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Token {api_token}"))
            .map_err(|_| RankingError::MissingConfig("PAIRWISE_API_TOKEN is not valid".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RankingError::Request(format!("failed to build HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, http })
    }

    pub fn from_env() -> Result<Self, RankingError> {
        let base_url = crate::config::env_or_default("PAIRWISE_API_URL", DEFAULT_BASE_URL);
        let token = crate::config::env_optional("PAIRWISE_API_TOKEN")
            .ok_or_else(|| RankingError::MissingConfig("PAIRWISE_API_TOKEN".into()))?;
        Self::new(base_url, &token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn json_of<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, RankingError> {
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RankingError::InvalidResponse(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RankingError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }

    // -------------------------------------------------------------------------
    // Surveys
    // -------------------------------------------------------------------------

    pub async fn create_survey(&self, data: &NewSurveyWire) -> Result<SurveyWire, RankingError> {
        debug!(name = %data.name, "creating survey on ranking engine");
        let response = self
            .http
            .post(format!("{}/surveys/", self.base_url))
            .json(data)
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }

    pub async fn get_survey(&self, survey_id: &str) -> Result<SurveyWire, RankingError> {
        self.get_json(&format!("{}/surveys/{survey_id}/", self.base_url))
            .await
    }

    pub async fn patch_survey(
        &self,
        survey_id: &str,
        update: &EditableSurveyWire,
    ) -> Result<SurveyWire, RankingError> {
        let response = self
            .http
            .patch(format!("{}/surveys/{survey_id}/", self.base_url))
            .json(update)
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }

    pub async fn delete_survey(&self, survey_id: &str) -> Result<(), RankingError> {
        debug!(survey_id, "deleting survey on ranking engine");
        let response = self
            .http
            .delete(format!("{}/surveys/{survey_id}/", self.base_url))
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    pub async fn create_item(
        &self,
        survey_id: &str,
        data: &NewItemWire,
    ) -> Result<ItemWire, RankingError> {
        let response = self
            .http
            .post(format!("{}/surveys/{survey_id}/items/", self.base_url))
            .json(data)
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }

    /// Fetch an item behind one of the engine's inline URLs.
    pub async fn get_item_at(&self, url: &str) -> Result<ItemWire, RankingError> {
        self.get_json(url).await
    }

    /// One page of the survey ranking, ordered best-first.
    pub async fn ranking_page(
        &self,
        survey_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<ListResponse<ItemWire>, RankingError> {
        let url = format!("{}/surveys/{survey_id}/ranking/", self.base_url);
        self.get_json(&format!(
            "{url}?limit={page_size}&offset={}",
            page * page_size
        ))
        .await
    }

    /// Lazy, restartable traversal of the full ranking, page by page.
    pub fn ranking_pages<'a>(&'a self, survey_id: &'a str) -> RankingPages<'a> {
        RankingPages {
            client: self,
            survey_id,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            yielded: 0,
            total: None,
        }
    }

    // -------------------------------------------------------------------------
    // Annotators
    // -------------------------------------------------------------------------

    pub async fn create_annotator(
        &self,
        survey_id: &str,
        name: &str,
    ) -> Result<AnnotatorWire, RankingError> {
        debug!(survey_id, name, "creating annotator on ranking engine");
        let response = self
            .http
            .post(format!("{}/surveys/{survey_id}/annotators/", self.base_url))
            .json(&NewAnnotatorWire {
                name: name.to_string(),
                active: true,
            })
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }

    pub async fn get_annotator(
        &self,
        survey_id: &str,
        annotator_id: &str,
    ) -> Result<AnnotatorWire, RankingError> {
        self.get_json(&format!(
            "{}/surveys/{survey_id}/annotators/{annotator_id}/",
            self.base_url
        ))
        .await
    }

    pub async fn delete_annotator(
        &self,
        survey_id: &str,
        annotator_id: &str,
    ) -> Result<(), RankingError> {
        debug!(survey_id, annotator_id, "deleting annotator on ranking engine");
        let response = self
            .http
            .delete(format!(
                "{}/surveys/{survey_id}/annotators/{annotator_id}/",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }

    /// POST one of the engine's action URLs (`vote` with a body, `skip`
    /// without).
    pub async fn post_action(
        &self,
        action_url: &str,
        current_wins: Option<bool>,
    ) -> Result<ActionResponse, RankingError> {
        let mut request = self.http.post(action_url);
        if let Some(current_wins) = current_wins {
            request = request.json(&VoteBody { current_wins });
        }
        let response = request
            .send()
            .await
            .map_err(|e| RankingError::Request(e.to_string()))?;
        Self::json_of(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, RankingError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RankingError::NotFound);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RankingError::Status { status, body });
    }
    Ok(response)
}

/// Bounded lazy page sequence over `GET /surveys/{id}/ranking/`.
///
/// Yields one [`ListResponse`] page at a time and stops once `count` items
/// have been seen, so a survey growing mid-traversal never loops.
pub struct RankingPages<'a> {
    client: &'a RankingClient,
    survey_id: &'a str,
    page: u64,
    page_size: u64,
    yielded: u64,
    total: Option<u64>,
}

impl RankingPages<'_> {
    pub async fn next_page(&mut self) -> Result<Option<ListResponse<ItemWire>>, RankingError> {
        if let Some(total) = self.total {
            if self.yielded >= total {
                return Ok(None);
            }
        }
        let response = self
            .client
            .ranking_page(self.survey_id, self.page, self.page_size)
            .await?;
        // The first page fixes the bound.
        let total = *self.total.get_or_insert(response.count);
        if response.results.is_empty() && total > 0 {
            return Ok(None);
        }
        self.page += 1;
        self.yielded += response.results.len() as u64;
        Ok(Some(response))
    }
}
