// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every failure in the token codec, the login flows, and the provider
//! exchange is one of these variants. They map onto the HTTP boundary via
//! [`ApiError`]; the user-visible messages for token and credential failures
//! are deliberately indistinct.

use axum::http::StatusCode;

use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Caller-supplied OAuth client credentials do not match the configured app.
    #[error("invalid client credentials")]
    InvalidCredentials,

    /// A required request field is absent.
    #[error("missing required field: {0}")]
    MissingParameter(&'static str),

    /// No OAuth provider registered under this name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider token or user-info exchange failed.
    #[error("provider exchange failed: {0}")]
    ProviderExchange(String),

    /// The provider responded, but the payload is unusable (no email, no id).
    #[error("provider profile is missing {0}")]
    IncompleteProfile(&'static str),

    /// Token signature did not verify, or the token is structurally invalid.
    #[error("invalid token")]
    InvalidToken,

    /// Token verified but is past its expiry.
    #[error("token expired")]
    Expired,

    /// Refresh token verified but no identity can be rebuilt from it.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Signing a new token failed.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Building the provider HTTP client failed.
    #[error("http client construction failed: {0}")]
    ClientBuild(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::InvalidRefreshToken => ApiError::unauthorized(err.to_string()),
            AuthError::UnknownProvider(_) => ApiError::not_found(err.to_string()),
            AuthError::MissingParameter(_) | AuthError::IncompleteProfile(_) => {
                ApiError::validation(err.to_string())
            }
            AuthError::ProviderExchange(_) | AuthError::Signing(_) | AuthError::ClientBuild(_) => {
                ApiError::server(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_map_to_401() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::InvalidToken,
            AuthError::Expired,
            AuthError::InvalidRefreshToken,
        ] {
            assert_eq!(ApiError::from(err).status, StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn provider_failures_map_to_5xx_or_4xx() {
        let api: ApiError = AuthError::ProviderExchange("timeout".into()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);

        let api: ApiError = AuthError::IncompleteProfile("email").into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);

        let api: ApiError = AuthError::UnknownProvider("gitlab".into()).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
    }
}
