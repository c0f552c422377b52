// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The voting endpoints. Each identity gets at most one annotator per
//! survey; the first `GET` lazily creates it on the ranking engine and the
//! vote/skip endpoints advance it.

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::CookieJar;

use crate::{
    auth::RequireAuth,
    error::ApiError,
    models::{Identity, OwnerRef, SurveyRecord, VoteRequest},
    ranking::session::{AnnotatorSession, VoteView},
    state::AppState,
};

use super::survey::{ensure_access, load_survey};

async fn gated_survey(
    state: &AppState,
    identity: &Identity,
    jar: &CookieJar,
    survey_id: &str,
) -> Result<(SurveyRecord, OwnerRef), ApiError> {
    let record = load_survey(state, survey_id).await?;
    ensure_access(identity, &record, jar, state)?;
    let owner = identity
        .owner_ref()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    Ok((record, owner))
}

#[utoipa::path(
    get,
    path = "/api/survey/{survey_id}/annotator",
    params(("survey_id" = String, Path, description = "Survey id")),
    tag = "Annotator",
    responses(
        (status = 200, body = VoteView),
        (status = 401, description = "Access denied"),
        (status = 404, description = "Survey not found")
    )
)]
pub async fn get_annotator(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    jar: CookieJar,
    Path(survey_id): Path<String>,
) -> Result<Json<VoteView>, ApiError> {
    let (record, owner) = gated_survey(&state, &identity, &jar, &survey_id).await?;
    let name = identity
        .annotator_name()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let session = AnnotatorSession::new(&state.ranking, &state.store, &record, owner);
    let view = session.get_or_create(&name).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/survey/{survey_id}/annotator/vote",
    params(("survey_id" = String, Path, description = "Survey id")),
    request_body = VoteRequest,
    tag = "Annotator",
    responses(
        (status = 200, body = VoteView),
        (status = 401, description = "Access denied or no annotator yet")
    )
)]
pub async fn vote(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    jar: CookieJar,
    Path(survey_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteView>, ApiError> {
    let (record, owner) = gated_survey(&state, &identity, &jar, &survey_id).await?;
    let session = AnnotatorSession::new(&state.ranking, &state.store, &record, owner);
    let view = session.vote(request.current_wins).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/survey/{survey_id}/annotator/skip",
    params(("survey_id" = String, Path, description = "Survey id")),
    tag = "Annotator",
    responses(
        (status = 200, body = VoteView),
        (status = 401, description = "Access denied or no annotator yet")
    )
)]
pub async fn skip(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    jar: CookieJar,
    Path(survey_id): Path<String>,
) -> Result<Json<VoteView>, ApiError> {
    let (record, owner) = gated_survey(&state, &identity, &jar, &survey_id).await?;
    let session = AnnotatorSession::new(&state.ranking, &state.store, &record, owner);
    let view = session.skip().await?;
    Ok(Json(view))
}
