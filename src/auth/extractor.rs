// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the caller identity.
//!
//! `Auth` never rejects: any verification failure collapses to
//! [`Identity::Unauthenticated`], and authorization decisions happen behind
//! it. `RequireAuth` is the strict variant for routes that need a principal:
//!
//! ```rust,ignore
//! async fn my_handler(RequireAuth(identity): RequireAuth) -> impl IntoResponse {
//!     // identity is Registered or Anonymous, never Unauthenticated
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::ApiError;
use crate::models::Identity;
use crate::state::AppState;

/// Resolves the caller identity, failing closed to `Unauthenticated`.
pub struct Auth(pub Identity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Auth(resolve_identity(parts, state).await))
    }
}

/// Rejects with 401 unless the caller is authenticated.
pub struct RequireAuth(pub Identity);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = resolve_identity(parts, state).await;
        if !identity.is_authenticated() {
            return Err(ApiError::unauthorized("Authentication required"));
        }
        Ok(RequireAuth(identity))
    }
}

/// Bearer-token verification. A missing header, malformed or expired token,
/// or a registered claim whose user no longer exists all resolve to
/// `Unauthenticated`.
async fn resolve_identity(parts: &Parts, state: &AppState) -> Identity {
    let Some(token) = bearer_token(parts) else {
        return Identity::Unauthenticated;
    };
    let Ok(claims) = state.tokens.verify_access(token) else {
        return Identity::Unauthenticated;
    };
    if claims.registered {
        let Some(email) = claims.email.as_deref() else {
            return Identity::Unauthenticated;
        };
        // Claims are a pointer, not the record: always re-fetch the
        // canonical user.
        let store = state.store.read().await;
        return match store.find_user_by_email(email) {
            Some(user) => Identity::Registered(user),
            None => Identity::Unauthenticated,
        };
    }
    claims.as_anonymous().unwrap_or(Identity::Unauthenticated)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
