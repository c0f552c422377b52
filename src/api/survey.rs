// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Survey CRUD, access requests, and the ranking listing.
//!
//! Surveys live on the ranking engine; locally we keep only ownership and
//! the security attributes (password hash, `allowAnon`). Reads re-fetch the
//! engine's state and merge it with the local record.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{gate, AccessGate, Auth, RequireAuth},
    error::ApiError,
    models::{
        AccessRequest, ChangePasswordRequest, CreateSurveyRequest, Identity, OwnerRef,
        SurveyRecord, UpdateSurveyRequest,
    },
    ranking::{session, EditableSurveyWire, ItemView, NewSurveyWire, SurveyWire},
    state::AppState,
};

const RANKING_PAGE_SIZE: u64 = 10;

/// A survey as returned to clients: engine fields merged with the local
/// security attributes. The password hash itself never leaves the server,
/// only the `private` flag does.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SurveyView {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub max_time: u32,
    pub min_views: u32,
    #[serde(rename = "allowConcurrent")]
    pub allow_concurrent: bool,
    #[serde(rename = "allowAnon")]
    pub allow_anon: bool,
    pub private: bool,
}

fn survey_view(wire: &SurveyWire, record: &SurveyRecord) -> SurveyView {
    SurveyView {
        id: wire.id.clone(),
        name: wire.name.clone(),
        active: wire.active,
        max_time: wire.max_time,
        min_views: wire.min_views,
        allow_concurrent: wire.allow_concurrent,
        allow_anon: record.allow_anon,
        private: record.password_hash.is_some(),
    }
}

// -----------------------------------------------------------------------------
// Shared lookup/authorization helpers (also used by the annotator endpoints)
// -----------------------------------------------------------------------------

pub(super) async fn load_survey(state: &AppState, api_id: &str) -> Result<SurveyRecord, ApiError> {
    let store = state.store.read().await;
    store
        .survey(api_id)
        .ok_or_else(|| ApiError::not_found("Survey not found"))
}

/// Apply the access gate against the caller's grant cookie.
pub(super) fn ensure_access(
    identity: &Identity,
    survey: &SurveyRecord,
    jar: &CookieJar,
    state: &AppState,
) -> Result<(), ApiError> {
    let grant = gate::grant_from_jar(jar, &state.tokens);
    if AccessGate::can_access(identity, survey, &grant) {
        return Ok(());
    }
    Err(ApiError::unauthorized(format!(
        "You don't have permission to access the survey {}",
        survey.api_id
    )))
}

/// Owner-only operations answer 404 for everyone else, so a non-owner cannot
/// distinguish "absent" from "not yours".
fn require_owned(identity: &Identity, survey: &SurveyRecord) -> Result<(), ApiError> {
    if survey.is_owned_by(identity) {
        return Ok(());
    }
    Err(ApiError::not_found(
        "Survey does not exist or you do not have write access to it",
    ))
}

fn validate_survey_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if !(6..=50).contains(&len) {
        return Err(ApiError::validation(
            "Password must be between 6 and 50 characters",
        ));
    }
    Ok(())
}

fn owner_of(identity: &Identity) -> Result<OwnerRef, ApiError> {
    identity
        .owner_ref()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/survey",
    request_body = CreateSurveyRequest,
    tag = "Survey",
    responses(
        (status = 201, body = SurveyView),
        (status = 400, description = "Invalid password")
    )
)]
pub async fn create_survey(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Json(request): Json<CreateSurveyRequest>,
) -> Result<(StatusCode, Json<SurveyView>), ApiError> {
    let owner = owner_of(&identity)?;
    if let Some(password) = &request.password {
        validate_survey_password(password)?;
    }

    let wire = state
        .ranking
        .create_survey(&NewSurveyWire {
            name: request.name,
            metadata: request.metadata,
            max_time: request.max_time,
            min_views: request.min_views,
            allow_concurrent: request.allow_concurrent,
        })
        .await?;

    let password_hash = request
        .password
        .as_deref()
        .map(gate::hash_password)
        .transpose()?;
    let record = SurveyRecord {
        api_id: wire.id.clone(),
        api_url: wire.url.clone(),
        owner,
        password_hash,
        allow_anon: request.allow_anon,
    };
    {
        let mut store = state.store.write().await;
        store
            .insert_survey(record.clone())
            .map_err(|e| ApiError::server(e.to_string()))?;
    }

    tracing::info!(survey_id = %record.api_id, "created survey");
    Ok((StatusCode::CREATED, Json(survey_view(&wire, &record))))
}

/// Merge each local record with its engine state. A survey whose remote
/// counterpart is gone is skipped rather than failing the whole listing.
async fn collect_views(
    state: &AppState,
    records: Vec<SurveyRecord>,
) -> Result<Vec<SurveyView>, ApiError> {
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        match state.ranking.get_survey(&record.api_id).await {
            Ok(wire) => views.push(survey_view(&wire, &record)),
            Err(crate::ranking::RankingError::NotFound) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(views)
}

#[utoipa::path(
    get,
    path = "/api/survey/my",
    tag = "Survey",
    responses(
        (status = 200, body = [SurveyView]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_owned(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<Json<Vec<SurveyView>>, ApiError> {
    let owner = owner_of(&identity)?;
    let records = {
        let store = state.store.read().await;
        store.surveys_owned_by(owner)
    };
    Ok(Json(collect_views(&state, records).await?))
}

#[utoipa::path(
    get,
    path = "/api/survey/annotated",
    tag = "Survey",
    responses(
        (status = 200, body = [SurveyView]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_annotated(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<Json<Vec<SurveyView>>, ApiError> {
    let owner = owner_of(&identity)?;
    let records = {
        let store = state.store.read().await;
        store.surveys_annotated_by(owner)
    };
    Ok(Json(collect_views(&state, records).await?))
}

#[utoipa::path(
    get,
    path = "/api/survey/{survey_id}",
    params(("survey_id" = String, Path, description = "Survey id")),
    tag = "Survey",
    responses(
        (status = 200, body = SurveyView),
        (status = 401, description = "Access denied"),
        (status = 404, description = "Survey not found")
    )
)]
pub async fn get_survey(
    State(state): State<AppState>,
    Auth(identity): Auth,
    jar: CookieJar,
    Path(survey_id): Path<String>,
) -> Result<Json<SurveyView>, ApiError> {
    let record = load_survey(&state, &survey_id).await?;
    ensure_access(&identity, &record, &jar, &state)?;
    let wire = state.ranking.get_survey(&record.api_id).await?;
    Ok(Json(survey_view(&wire, &record)))
}

#[utoipa::path(
    patch,
    path = "/api/survey/{survey_id}",
    params(("survey_id" = String, Path, description = "Survey id")),
    request_body = UpdateSurveyRequest,
    tag = "Survey",
    responses(
        (status = 200, body = SurveyView),
        (status = 404, description = "Survey not found or not owned")
    )
)]
pub async fn update_survey(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(survey_id): Path<String>,
    Json(request): Json<UpdateSurveyRequest>,
) -> Result<Json<SurveyView>, ApiError> {
    let mut record = load_survey(&state, &survey_id).await?;
    require_owned(&identity, &record)?;

    let update = EditableSurveyWire {
        name: request.name,
        max_time: request.max_time,
        min_views: request.min_views,
        allow_concurrent: request.allow_concurrent,
    };
    // Remote fields go to the engine; the local record only changes when
    // `allowAnon` does.
    let wire = if update.is_empty() {
        state.ranking.get_survey(&record.api_id).await?
    } else {
        state.ranking.patch_survey(&record.api_id, &update).await?
    };

    if let Some(allow_anon) = request.allow_anon {
        record.allow_anon = allow_anon;
        let mut store = state.store.write().await;
        store
            .replace_survey(record.clone())
            .map_err(|e| ApiError::server(e.to_string()))?;
    }

    Ok(Json(survey_view(&wire, &record)))
}

#[utoipa::path(
    delete,
    path = "/api/survey/{survey_id}",
    params(("survey_id" = String, Path, description = "Survey id")),
    tag = "Survey",
    responses(
        (status = 204),
        (status = 404, description = "Survey not found or not owned")
    )
)]
pub async fn delete_survey(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(survey_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let record = load_survey(&state, &survey_id).await?;
    require_owned(&identity, &record)?;

    // Remote first: an engine that refuses the delete keeps the survey
    // intact on both sides. A missing remote survey is fine.
    match state.ranking.delete_survey(&record.api_id).await {
        Ok(()) | Err(crate::ranking::RankingError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let (_, annotators) = {
        let mut store = state.store.write().await;
        store
            .remove_survey(&record.api_id)
            .map_err(|e| ApiError::server(e.to_string()))?
    };
    for annotator in annotators {
        session::delete_remote_annotator(&state.ranking, &record.api_id, &annotator.api_id).await;
    }

    tracing::info!(survey_id = %record.api_id, "deleted survey");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/survey/{survey_id}/access",
    params(("survey_id" = String, Path, description = "Survey id")),
    request_body = AccessRequest,
    tag = "Survey",
    responses(
        (status = 200, description = "Grant cookie extended"),
        (status = 400, description = "Invalid password (delayed)")
    )
)]
pub async fn request_access(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(survey_id): Path<String>,
    Json(request): Json<AccessRequest>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let record = load_survey(&state, &survey_id).await?;
    let grant = gate::grant_from_jar(&jar, &state.tokens);
    let grant =
        AccessGate::request_access(&record, &request.password, grant, state.password_delay).await?;
    let jar = gate::store_grant(jar, &state.tokens, &grant)?;
    Ok((jar, Json(json!({ "message": "OK" }))))
}

#[utoipa::path(
    post,
    path = "/api/survey/{survey_id}/change-password",
    params(("survey_id" = String, Path, description = "Survey id")),
    request_body = ChangePasswordRequest,
    tag = "Survey",
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Old password invalid"),
        (status = 404, description = "Survey not found or not owned")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(survey_id): Path<String>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut record = load_survey(&state, &survey_id).await?;
    require_owned(&identity, &record)?;

    let old_matches = record
        .password_hash
        .as_deref()
        .map(|hash| bcrypt::verify(&request.old_password, hash).unwrap_or(false))
        .unwrap_or(false);
    if !old_matches {
        return Err(ApiError::validation(
            "Could not change password. Old password is invalid",
        )
        .with_detail("invalid_password"));
    }
    validate_survey_password(&request.new_password)?;

    record.password_hash = Some(gate::hash_password(&request.new_password)?);
    let mut store = state.store.write().await;
    store
        .replace_survey(record)
        .map_err(|e| ApiError::server(e.to_string()))?;
    Ok(Json(json!({ "message": "OK" })))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RankingQuery {
    /// Zero-based page index.
    #[serde(default)]
    pub page: u64,
}

/// One page of ranked items, best first.
#[derive(Debug, Serialize, ToSchema)]
pub struct RankingPageView {
    pub count: u64,
    pub page: u64,
    pub results: Vec<ItemView>,
}

#[utoipa::path(
    get,
    path = "/api/survey/{survey_id}/ranking",
    params(
        ("survey_id" = String, Path, description = "Survey id"),
        RankingQuery
    ),
    tag = "Survey",
    responses(
        (status = 200, body = RankingPageView),
        (status = 401, description = "Access denied")
    )
)]
pub async fn get_ranking(
    State(state): State<AppState>,
    Auth(identity): Auth,
    jar: CookieJar,
    Path(survey_id): Path<String>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<RankingPageView>, ApiError> {
    let record = load_survey(&state, &survey_id).await?;
    ensure_access(&identity, &record, &jar, &state)?;

    let page = state
        .ranking
        .ranking_page(&record.api_id, query.page, RANKING_PAGE_SIZE)
        .await?;
    Ok(Json(RankingPageView {
        count: page.count,
        page: query.page,
        results: page.results.iter().map(ItemView::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankingClient;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn survey_json(server: &MockServer, id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "url": format!("{}/surveys/{id}/", server.uri()),
            "name": "My survey",
            "metadata": {},
            "active": true,
            "max_time": 10,
            "min_views": 0,
            "allow_concurrent": false,
        })
    }

    async fn state_with_engine(server: &MockServer) -> AppState {
        AppState::default()
            .with_ranking(RankingClient::new(server.uri(), "t").unwrap())
            .with_password_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/surveys/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(survey_json(&server, "s1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/surveys/s1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(survey_json(&server, "s1")))
            .mount(&server)
            .await;

        let state = state_with_engine(&server).await;
        let owner = Identity::Anonymous { uuid: Uuid::new_v4() };

        let (status, Json(created)) = create_survey(
            State(state.clone()),
            RequireAuth(owner.clone()),
            Json(CreateSurveyRequest {
                name: "My survey".into(),
                allow_anon: true,
                password: None,
                metadata: None,
                max_time: Some(10),
                min_views: None,
                allow_concurrent: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.id, "s1");
        assert!(!created.private);

        // The owner reads it back through the gate.
        let Json(read) = get_survey(
            State(state),
            Auth(owner),
            CookieJar::new(),
            Path("s1".into()),
        )
        .await
        .unwrap();
        assert_eq!(read.id, "s1");
        assert!(read.allow_anon);
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_any_remote_call() {
        let server = MockServer::start().await;
        let state = state_with_engine(&server).await;

        let err = create_survey(
            State(state),
            RequireAuth(Identity::Anonymous { uuid: Uuid::new_v4() }),
            Json(CreateSurveyRequest {
                name: "My survey".into(),
                allow_anon: false,
                password: Some("short".into()),
                metadata: None,
                max_time: None,
                min_views: None,
                allow_concurrent: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listings_are_scoped_to_the_caller() {
        let server = MockServer::start().await;
        for id in ["s1", "s2"] {
            Mock::given(method("GET"))
                .and(url_path(format!("/surveys/{id}/")))
                .respond_with(ResponseTemplate::new(200).set_body_json(survey_json(&server, id)))
                .mount(&server)
                .await;
        }

        let state = state_with_engine(&server).await;
        let caller_uuid = Uuid::new_v4();
        let caller = Identity::Anonymous { uuid: caller_uuid };
        {
            let mut store = state.store.write().await;
            store
                .insert_survey(SurveyRecord {
                    api_id: "s1".into(),
                    api_url: format!("{}/surveys/s1/", server.uri()),
                    owner: OwnerRef::Anon(caller_uuid),
                    password_hash: None,
                    allow_anon: true,
                })
                .unwrap();
            store
                .insert_survey(SurveyRecord {
                    api_id: "s2".into(),
                    api_url: format!("{}/surveys/s2/", server.uri()),
                    owner: OwnerRef::Anon(Uuid::new_v4()),
                    password_hash: None,
                    allow_anon: true,
                })
                .unwrap();
            store
                .insert_annotator(crate::models::AnnotatorRecord {
                    api_id: "a1".into(),
                    api_url: format!("{}/surveys/s2/annotators/a1/", server.uri()),
                    owner: OwnerRef::Anon(caller_uuid),
                    survey_api_id: "s2".into(),
                })
                .unwrap();
        }

        let Json(owned) = list_owned(State(state.clone()), RequireAuth(caller.clone()))
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "s1");

        let Json(annotated) = list_annotated(State(state), RequireAuth(caller))
            .await
            .unwrap();
        assert_eq!(annotated.len(), 1);
        assert_eq!(annotated[0].id, "s2");
    }

    #[tokio::test]
    async fn non_owner_update_reads_as_not_found() {
        let server = MockServer::start().await;
        let state = state_with_engine(&server).await;
        state
            .store
            .write()
            .await
            .insert_survey(SurveyRecord {
                api_id: "s1".into(),
                api_url: format!("{}/surveys/s1/", server.uri()),
                owner: OwnerRef::Anon(Uuid::new_v4()),
                password_hash: None,
                allow_anon: true,
            })
            .unwrap();

        let err = update_survey(
            State(state),
            RequireAuth(Identity::Anonymous { uuid: Uuid::new_v4() }),
            Path("s1".into()),
            Json(UpdateSurveyRequest {
                name: None,
                allow_anon: Some(false),
                max_time: None,
                min_views: None,
                allow_concurrent: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn access_request_sets_a_grant_cookie() {
        let server = MockServer::start().await;
        let state = state_with_engine(&server).await;
        state
            .store
            .write()
            .await
            .insert_survey(SurveyRecord {
                api_id: "s1".into(),
                api_url: format!("{}/surveys/s1/", server.uri()),
                owner: OwnerRef::Anon(Uuid::new_v4()),
                password_hash: Some(bcrypt::hash("hunter22", 4).unwrap()),
                allow_anon: true,
            })
            .unwrap();

        let (jar, Json(body)) = request_access(
            State(state.clone()),
            CookieJar::new(),
            Path("s1".into()),
            Json(AccessRequest {
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["message"], "OK");

        let grant = gate::grant_from_jar(&jar, &state.tokens);
        assert!(grant.contains("s1"));

        // The grant now opens the gate for a stranger.
        let record = load_survey(&state, "s1").await.unwrap();
        let stranger = Identity::Anonymous { uuid: Uuid::new_v4() };
        assert!(ensure_access(&stranger, &record, &jar, &state).is_ok());
    }

    #[tokio::test]
    async fn wrong_access_password_is_a_delayed_400() {
        let server = MockServer::start().await;
        let state = state_with_engine(&server).await;
        state
            .store
            .write()
            .await
            .insert_survey(SurveyRecord {
                api_id: "s1".into(),
                api_url: format!("{}/surveys/s1/", server.uri()),
                owner: OwnerRef::Anon(Uuid::new_v4()),
                password_hash: Some(bcrypt::hash("hunter22", 4).unwrap()),
                allow_anon: true,
            })
            .unwrap();

        let err = request_access(
            State(state),
            CookieJar::new(),
            Path("s1".into()),
            Json(AccessRequest {
                password: "wrong".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, Some("invalid_password".into()));
    }

    #[tokio::test]
    async fn change_password_requires_the_old_one() {
        let server = MockServer::start().await;
        let state = state_with_engine(&server).await;
        let owner_uuid = Uuid::new_v4();
        state
            .store
            .write()
            .await
            .insert_survey(SurveyRecord {
                api_id: "s1".into(),
                api_url: format!("{}/surveys/s1/", server.uri()),
                owner: OwnerRef::Anon(owner_uuid),
                password_hash: Some(bcrypt::hash("hunter22", 4).unwrap()),
                allow_anon: true,
            })
            .unwrap();
        let owner = Identity::Anonymous { uuid: owner_uuid };

        let err = change_password(
            State(state.clone()),
            RequireAuth(owner.clone()),
            Path("s1".into()),
            Json(ChangePasswordRequest {
                old_password: "wrong".into(),
                new_password: "new-password".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        change_password(
            State(state.clone()),
            RequireAuth(owner),
            Path("s1".into()),
            Json(ChangePasswordRequest {
                old_password: "hunter22".into(),
                new_password: "new-password".into(),
            }),
        )
        .await
        .unwrap();

        let record = load_survey(&state, "s1").await.unwrap();
        assert!(bcrypt::verify("new-password", record.password_hash.as_deref().unwrap()).unwrap());
    }
}
