// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Voting session management for one (identity, survey) pair.
//!
//! A session starts uninitialized and resolves to a remote annotator with a
//! current/previous item pair. Resolution is idempotent: the local store maps
//! each (owner, survey) to at most one remote annotator, and a uniqueness
//! violation during a racing first access means another request already
//! created it, so the existing mapping is reloaded. A cached mapping whose
//! remote annotator is gone is dropped and recreated.
//!
//! All voting state lives on the ranking engine; the session only mediates
//! and never caches across requests.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ActionResponse, AnnotatorWire, ItemView, RankingClient, RankingError};
use crate::error::ApiError;
use crate::models::{AnnotatorRecord, OwnerRef, SurveyRecord};
use crate::store::{InMemoryStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The caller has no annotator on this survey yet.
    #[error("you are not an annotator of the survey {0}")]
    NotAnnotator(String),

    #[error(transparent)]
    Ranking(#[from] RankingError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotAnnotator(_) => ApiError::unauthorized(err.to_string()),
            SessionError::Ranking(inner) => inner.into(),
        }
    }
}

/// The annotator state returned to the voting client.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct VoteView {
    pub id: String,
    pub name: String,
    pub metadata: Value,
    #[serde(rename = "itemsLeft")]
    pub items_left: i64,
    pub current: Option<ItemView>,
    pub previous: Option<ItemView>,
}

pub struct AnnotatorSession<'a> {
    ranking: &'a RankingClient,
    store: &'a RwLock<InMemoryStore>,
    survey: &'a SurveyRecord,
    owner: OwnerRef,
}

impl<'a> AnnotatorSession<'a> {
    pub fn new(
        ranking: &'a RankingClient,
        store: &'a RwLock<InMemoryStore>,
        survey: &'a SurveyRecord,
        owner: OwnerRef,
    ) -> Self {
        Self {
            ranking,
            store,
            survey,
            owner,
        }
    }

    /// Resolve this session's annotator, creating it remotely on first
    /// access. Every path through here ends with an assigned current item
    /// whenever the survey still has items left.
    pub async fn get_or_create(&self, name: &str) -> Result<VoteView, SessionError> {
        let wire = match self.load_existing().await? {
            Some(wire) => wire,
            None => self.create(name).await?,
        };
        self.view_of(self.ensure_current(wire).await?).await
    }

    /// Cast a vote on the current pair. Requires an existing annotator.
    pub async fn vote(&self, current_wins: bool) -> Result<VoteView, SessionError> {
        let wire = self.require_existing().await?;
        let action = self.ranking.post_action(&wire.vote, Some(current_wins)).await?;
        Ok(view_from_action(&wire, action))
    }

    /// Skip the current pair. Requires an existing annotator.
    pub async fn skip(&self) -> Result<VoteView, SessionError> {
        let wire = self.require_existing().await?;
        let action = self.ranking.post_action(&wire.skip, None).await?;
        Ok(view_from_action(&wire, action))
    }

    /// Look up the locally-mapped annotator and fetch its remote state.
    /// A stale mapping (remote 404) is dropped so the next access recreates it.
    async fn load_existing(&self) -> Result<Option<AnnotatorWire>, RankingError> {
        let record = {
            let store = self.store.read().await;
            store.annotator_for(self.owner, &self.survey.api_id)
        };
        let Some(record) = record else {
            return Ok(None);
        };
        match self
            .ranking
            .get_annotator(&self.survey.api_id, &record.api_id)
            .await
        {
            Ok(wire) => Ok(Some(wire)),
            Err(RankingError::NotFound) => {
                warn!(
                    survey_id = %self.survey.api_id,
                    annotator_id = %record.api_id,
                    "annotator mapping is stale, recreating"
                );
                let mut store = self.store.write().await;
                let _ = store.remove_annotator(&record.api_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn require_existing(&self) -> Result<AnnotatorWire, SessionError> {
        self.load_existing()
            .await?
            .ok_or_else(|| SessionError::NotAnnotator(self.survey.api_id.clone()))
    }

    /// Create the remote annotator and persist the mapping. Losing the
    /// insert race means another request created one first; the extra remote
    /// annotator is discarded and the winner's mapping is used.
    async fn create(&self, name: &str) -> Result<AnnotatorWire, SessionError> {
        let wire = self.ranking.create_annotator(&self.survey.api_id, name).await?;
        let record = AnnotatorRecord {
            api_id: wire.id.clone(),
            api_url: wire.url.clone(),
            owner: self.owner,
            survey_api_id: self.survey.api_id.clone(),
        };

        let inserted = {
            let mut store = self.store.write().await;
            store.insert_annotator(record)
        };
        match inserted {
            Ok(()) => Ok(wire),
            Err(StoreError::AlreadyExists(_)) => {
                debug!(
                    survey_id = %self.survey.api_id,
                    "lost annotator creation race, reloading existing mapping"
                );
                delete_remote_annotator(self.ranking, &self.survey.api_id, &wire.id).await;
                self.require_existing().await.map_err(|e| match e {
                    // The winner's mapping vanished between insert and reload.
                    SessionError::NotAnnotator(_) => RankingError::NotFound.into(),
                    other => other,
                })
            }
            Err(StoreError::NotFound(msg)) => {
                Err(RankingError::InvalidResponse(msg).into())
            }
        }
    }

    /// Force an item assignment when the engine has not made one yet. An
    /// annotator with no current item and items remaining gets an implicit
    /// losing vote, which makes the engine assign the next pair.
    async fn ensure_current(
        &self,
        wire: AnnotatorWire,
    ) -> Result<ResolvedState, RankingError> {
        if wire.current.is_none() && wire.items_left > 0 {
            let action = self.ranking.post_action(&wire.vote, Some(false)).await?;
            return Ok(ResolvedState::FromAction(wire, action));
        }
        Ok(ResolvedState::FromWire(wire))
    }

    /// Materialize current/previous items, following inline URLs when the
    /// engine did not respond with the items themselves.
    async fn view_of(&self, state: ResolvedState) -> Result<VoteView, SessionError> {
        match state {
            ResolvedState::FromAction(wire, action) => Ok(view_from_action(&wire, action)),
            ResolvedState::FromWire(wire) => {
                let current = self.follow(wire.current.as_deref()).await?;
                let previous = self.follow(wire.previous.as_deref()).await?;
                Ok(VoteView {
                    id: wire.id,
                    name: wire.name,
                    metadata: wire.metadata,
                    items_left: wire.items_left,
                    current,
                    previous,
                })
            }
        }
    }

    async fn follow(&self, url: Option<&str>) -> Result<Option<ItemView>, RankingError> {
        match url {
            Some(url) => {
                let item = self.ranking.get_item_at(url).await?;
                Ok(Some(ItemView::from(&item)))
            }
            None => Ok(None),
        }
    }
}

enum ResolvedState {
    FromWire(AnnotatorWire),
    FromAction(AnnotatorWire, ActionResponse),
}

fn view_from_action(wire: &AnnotatorWire, action: ActionResponse) -> VoteView {
    VoteView {
        id: wire.id.clone(),
        name: wire.name.clone(),
        metadata: wire.metadata.clone(),
        items_left: action.items_left,
        current: action.current.as_ref().map(ItemView::from),
        previous: action.previous.as_ref().map(ItemView::from),
    }
}

/// Best-effort deletion of a remote annotator; a missing remote annotator is
/// expected (it may already be gone) and never blocks local cleanup.
pub async fn delete_remote_annotator(
    ranking: &RankingClient,
    survey_api_id: &str,
    annotator_api_id: &str,
) {
    match ranking.delete_annotator(survey_api_id, annotator_api_id).await {
        Ok(()) => {}
        Err(RankingError::NotFound) => {
            debug!(
                survey_id = survey_api_id,
                annotator_id = annotator_api_id,
                "remote annotator already deleted"
            );
        }
        Err(e) => {
            warn!(
                survey_id = survey_api_id,
                annotator_id = annotator_api_id,
                error = %e,
                "failed to delete remote annotator"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn survey(api_id: &str) -> SurveyRecord {
        SurveyRecord {
            api_id: api_id.to_string(),
            api_url: format!("http://backend:8000/surveys/{api_id}/"),
            owner: OwnerRef::Anon(Uuid::new_v4()),
            password_hash: None,
            allow_anon: true,
        }
    }

    fn item_json(server: &MockServer, id: &str) -> Value {
        json!({
            "id": id,
            "url": format!("{}/surveys/s1/items/{id}/", server.uri()),
            "name": format!("item {id}"),
            "metadata": {},
            "active": true,
            "mu": 1.0,
            "sigma_squared": 0.5,
        })
    }

    fn annotator_json(server: &MockServer, current: Option<&str>, items_left: i64) -> Value {
        json!({
            "id": "a1",
            "url": format!("{}/surveys/s1/annotators/a1/", server.uri()),
            "name": "Anon 1234",
            "metadata": {},
            "current": current.map(|id| format!("{}/surveys/s1/items/{id}/", server.uri())),
            "previous": null,
            "vote": format!("{}/surveys/s1/annotators/a1/vote/", server.uri()),
            "skip": format!("{}/surveys/s1/annotators/a1/skip/", server.uri()),
            "items_left": items_left,
        })
    }

    #[tokio::test]
    async fn first_access_creates_once_and_forces_assignment() {
        let server = MockServer::start().await;
        // Creation returns an annotator without a current item.
        Mock::given(method("POST"))
            .and(path("/surveys/s1/annotators/"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(annotator_json(&server, None, 2)),
            )
            .expect(1)
            .mount(&server)
            .await;
        // The implicit losing vote assigns the first pair.
        Mock::given(method("POST"))
            .and(path("/surveys/s1/annotators/a1/vote/"))
            .and(body_json(json!({"current_wins": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": item_json(&server, "i1"),
                "previous": null,
                "vote": format!("{}/surveys/s1/annotators/a1/vote/", server.uri()),
                "skip": format!("{}/surveys/s1/annotators/a1/skip/", server.uri()),
                "items_left": 2,
            })))
            .expect(1)
            .mount(&server)
            .await;
        // Second access finds the mapping and re-syncs from the engine.
        Mock::given(method("GET"))
            .and(path("/surveys/s1/annotators/a1/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(annotator_json(&server, Some("i1"), 2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/surveys/s1/items/i1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(&server, "i1")))
            .mount(&server)
            .await;

        let ranking = RankingClient::new(server.uri(), "t").unwrap();
        let store = RwLock::new(InMemoryStore::new());
        let survey = survey("s1");
        let owner = OwnerRef::Anon(Uuid::new_v4());
        let session = AnnotatorSession::new(&ranking, &store, &survey, owner);

        let first = session.get_or_create("Anon 1234").await.unwrap();
        assert_eq!(first.id, "a1");
        assert_eq!(first.current.as_ref().unwrap().id, "i1");

        // Resolution is idempotent: one remote create across both calls.
        let second = session.get_or_create("Anon 1234").await.unwrap();
        assert_eq!(second.id, "a1");
        assert_eq!(second.current.as_ref().unwrap().id, "i1");
    }

    #[tokio::test]
    async fn stale_mapping_is_dropped_and_recreated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/surveys/s1/annotators/stale/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/surveys/s1/annotators/"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(annotator_json(&server, Some("i1"), 1)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/surveys/s1/items/i1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(&server, "i1")))
            .mount(&server)
            .await;

        let ranking = RankingClient::new(server.uri(), "t").unwrap();
        let store = RwLock::new(InMemoryStore::new());
        let survey = survey("s1");
        let owner = OwnerRef::Anon(Uuid::new_v4());
        store
            .write()
            .await
            .insert_annotator(AnnotatorRecord {
                api_id: "stale".into(),
                api_url: format!("{}/surveys/s1/annotators/stale/", server.uri()),
                owner,
                survey_api_id: "s1".into(),
            })
            .unwrap();

        let session = AnnotatorSession::new(&ranking, &store, &survey, owner);
        let view = session.get_or_create("Anon 1234").await.unwrap();
        assert_eq!(view.id, "a1");

        let store = store.read().await;
        assert_eq!(store.annotator_for(owner, "s1").unwrap().api_id, "a1");
    }

    #[tokio::test]
    async fn vote_requires_an_existing_annotator() {
        let server = MockServer::start().await;
        let ranking = RankingClient::new(server.uri(), "t").unwrap();
        let store = RwLock::new(InMemoryStore::new());
        let survey = survey("s1");
        let session =
            AnnotatorSession::new(&ranking, &store, &survey, OwnerRef::Anon(Uuid::new_v4()));

        let err = session.vote(true).await.unwrap_err();
        assert!(matches!(err, SessionError::NotAnnotator(_)));
    }

    #[tokio::test]
    async fn exhausted_survey_is_a_valid_terminal_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/surveys/s1/annotators/a1/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(annotator_json(&server, None, 0)),
            )
            .mount(&server)
            .await;

        let ranking = RankingClient::new(server.uri(), "t").unwrap();
        let store = RwLock::new(InMemoryStore::new());
        let survey = survey("s1");
        let owner = OwnerRef::Anon(Uuid::new_v4());
        store
            .write()
            .await
            .insert_annotator(AnnotatorRecord {
                api_id: "a1".into(),
                api_url: format!("{}/surveys/s1/annotators/a1/", server.uri()),
                owner,
                survey_api_id: "s1".into(),
            })
            .unwrap();

        let session = AnnotatorSession::new(&ranking, &store, &survey, owner);
        // No items left: no implicit vote is attempted, both pointers null.
        let view = session.get_or_create("Anon 1234").await.unwrap();
        assert_eq!(view.items_left, 0);
        assert!(view.current.is_none());
        assert!(view.previous.is_none());
    }

    #[test]
    fn vote_view_serializes_items_left_camel_case() {
        let view = VoteView {
            id: "a1".into(),
            name: "Anon 1234".into(),
            metadata: json!({}),
            items_left: 3,
            current: None,
            previous: None,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["itemsLeft"], 3);
        assert!(value["current"].is_null());
    }
}
