// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, refresh, and logout endpoints.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::{
    auth::{gate, AnonymousAdapter, AuthError, AuthSessionCore},
    error::ApiError,
    models::{AuthRequest, TokenPair},
    state::AppState,
};

/// OAuth login for a registered provider. The same endpoint serves the
/// refresh flow when the body carries a refresh token.
#[utoipa::path(
    post,
    path = "/api/auth/social/{provider}",
    params(("provider" = String, Path, description = "OAuth provider slug")),
    request_body = AuthRequest,
    tag = "Auth",
    responses(
        (status = 200, body = TokenPair),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "Unknown provider")
    )
)]
pub async fn social_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let provider = state
        .provider(&provider)
        .ok_or(AuthError::UnknownProvider(provider))?;
    let core = AuthSessionCore::new(&state.tokens, &state.store);
    let pair = core.execute_flow(provider, &request).await?;
    Ok(Json(pair))
}

/// Anonymous login: no credentials, a fresh identity per call.
#[utoipa::path(
    post,
    path = "/api/auth/anon/token",
    tag = "Auth",
    responses((status = 200, body = TokenPair))
)]
pub async fn anon_token(
    State(state): State<AppState>,
    request: Option<Json<AuthRequest>>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = request.unwrap_or_default();
    let core = AuthSessionCore::new(&state.tokens, &state.store);
    let pair = core.execute_flow(&AnonymousAdapter, &request).await?;
    Ok(Json(pair))
}

/// Mint a new token pair from a refresh token. Works for registered and
/// anonymous identities alike.
#[utoipa::path(
    post,
    path = "/api/auth/token/refresh",
    request_body = AuthRequest,
    tag = "Auth",
    responses(
        (status = 200, body = TokenPair),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let core = AuthSessionCore::new(&state.tokens, &state.store);
    let pair = core.refresh(&request).await?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogoutQuery {
    /// Optional URI to redirect to after the grant cookie is cleared.
    pub logout_uri: Option<String>,
}

/// Clear the access-grant cookie. Tokens are client-held and simply
/// discarded; the server only forgets the survey grants.
#[utoipa::path(
    get,
    path = "/api/auth/logout",
    params(LogoutQuery),
    tag = "Auth",
    responses(
        (status = 200, description = "Cookie cleared"),
        (status = 303, description = "Cookie cleared, redirecting")
    )
)]
pub async fn logout(jar: CookieJar, Query(query): Query<LogoutQuery>) -> Response {
    let jar = gate::clear_grant(jar);
    match query.logout_uri {
        Some(uri) => (jar, Redirect::to(&uri)).into_response(),
        None => (jar, Json(json!({ "message": "OK" }))).into_response(),
    }
}
