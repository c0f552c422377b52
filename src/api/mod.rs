// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AccessRequest, AuthRequest, ChangePasswordRequest, CreateSurveyRequest, TokenPair,
        UpdateSurveyRequest, VoteRequest,
    },
    ranking::{session::VoteView, ItemView},
    state::AppState,
};

pub mod annotator;
pub mod auth;
pub mod health;
pub mod survey;
pub mod user;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/auth/social/{provider}", post(auth::social_login))
        .route("/auth/anon/token", post(auth::anon_token))
        .route("/auth/token/refresh", post(auth::refresh_token))
        .route("/auth/logout", get(auth::logout))
        .route("/user", get(user::current_user))
        .route("/survey", post(survey::create_survey))
        .route("/survey/my", get(survey::list_owned))
        .route("/survey/annotated", get(survey::list_annotated))
        .route(
            "/survey/{survey_id}",
            get(survey::get_survey)
                .patch(survey::update_survey)
                .delete(survey::delete_survey),
        )
        .route("/survey/{survey_id}/access", post(survey::request_access))
        .route(
            "/survey/{survey_id}/change-password",
            post(survey::change_password),
        )
        .route("/survey/{survey_id}/ranking", get(survey::get_ranking))
        .route("/survey/{survey_id}/annotator", get(annotator::get_annotator))
        .route("/survey/{survey_id}/annotator/vote", post(annotator::vote))
        .route("/survey/{survey_id}/annotator/skip", post(annotator::skip));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::social_login,
        auth::anon_token,
        auth::refresh_token,
        auth::logout,
        user::current_user,
        survey::create_survey,
        survey::list_owned,
        survey::list_annotated,
        survey::get_survey,
        survey::update_survey,
        survey::delete_survey,
        survey::request_access,
        survey::change_password,
        survey::get_ranking,
        annotator::get_annotator,
        annotator::vote,
        annotator::skip,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            AuthRequest,
            TokenPair,
            CreateSurveyRequest,
            UpdateSurveyRequest,
            AccessRequest,
            ChangePasswordRequest,
            VoteRequest,
            survey::SurveyView,
            survey::RankingPageView,
            ItemView,
            VoteView,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Token issuance and session management"),
        (name = "User", description = "Current identity"),
        (name = "Survey", description = "Survey management and access control"),
        (name = "Annotator", description = "Pairwise voting sessions"),
        (name = "Health", description = "Service probes")
    )
)]
struct ApiDoc;
