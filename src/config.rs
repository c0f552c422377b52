// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! typed configuration structs loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | Access-token and cookie signing secret | `my_secret` (dev only) |
//! | `JWT_REFRESH_SECRET` | Refresh-token signing secret | `my_other_secret` (dev only) |
//! | `JWT_LIFETIME` | Access-token lifetime in seconds | `3600` |
//! | `JWT_REFRESH_LIFETIME` | Registered refresh-token lifetime in seconds | `86400` |
//! | `JWT_ANON_REFRESH_LIFETIME` | Anonymous refresh-token lifetime in seconds | `2592000` |
//! | `GITHUB_CLIENT_ID` | GitHub OAuth app client id | Required for github login |
//! | `GITHUB_CLIENT_SECRET` | GitHub OAuth app client secret | Required for github login |
//! | `PAIRWISE_API_URL` | Ranking engine base URL | `http://backend:8000` |
//! | `PAIRWISE_API_TOKEN` | Ranking engine API token | Required |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

/// Default access-token lifetime (1 hour).
pub const DEFAULT_ACCESS_LIFETIME_SECS: u64 = 3600;

/// Default refresh-token lifetime for registered users (1 day).
pub const DEFAULT_REFRESH_LIFETIME_SECS: u64 = 86400;

/// Default refresh-token lifetime for anonymous users (30 days).
///
/// Anonymous identities have no other way to re-establish themselves, so the
/// refresh window is deliberately long.
pub const DEFAULT_ANON_REFRESH_LIFETIME_SECS: u64 = 86400 * 30;

/// Delay imposed before surfacing a survey password mismatch.
pub const PASSWORD_MISMATCH_DELAY: Duration = Duration::from_secs(5);

/// Token lifetimes and signing secrets for the auth core.
///
/// Invariant: the access lifetime is shorter than both refresh lifetimes.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret for the access-token channel (also signs the access-grant cookie).
    pub access_secret: String,
    /// Independent secret for the refresh-token channel, so leaking one channel
    /// does not compromise the other.
    pub refresh_secret: String,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub anon_refresh_lifetime: Duration,
}

impl TokenConfig {
    /// Load from the environment, falling back to development defaults.
    pub fn from_env() -> Self {
        Self {
            access_secret: env_or_default("JWT_SECRET", "my_secret"),
            refresh_secret: env_or_default("JWT_REFRESH_SECRET", "my_other_secret"),
            access_lifetime: env_duration_secs("JWT_LIFETIME", DEFAULT_ACCESS_LIFETIME_SECS),
            refresh_lifetime: env_duration_secs(
                "JWT_REFRESH_LIFETIME",
                DEFAULT_REFRESH_LIFETIME_SECS,
            ),
            anon_refresh_lifetime: env_duration_secs(
                "JWT_ANON_REFRESH_LIFETIME",
                DEFAULT_ANON_REFRESH_LIFETIME_SECS,
            ),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: "my_secret".to_string(),
            refresh_secret: "my_other_secret".to_string(),
            access_lifetime: Duration::from_secs(DEFAULT_ACCESS_LIFETIME_SECS),
            refresh_lifetime: Duration::from_secs(DEFAULT_REFRESH_LIFETIME_SECS),
            anon_refresh_lifetime: Duration::from_secs(DEFAULT_ANON_REFRESH_LIFETIME_SECS),
        }
    }
}

/// OAuth application credentials for a single provider.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    /// Load credentials for a provider from `<PROVIDER>_CLIENT_ID` /
    /// `<PROVIDER>_CLIENT_SECRET`. Returns `None` if either is unset, in which
    /// case the provider's login route rejects all requests.
    pub fn from_env(provider: &str) -> Option<Self> {
        let prefix = provider.to_ascii_uppercase();
        Some(Self {
            client_id: env_optional(&format!("{prefix}_CLIENT_ID"))?,
            client_secret: env_optional(&format!("{prefix}_CLIENT_SECRET"))?,
        })
    }
}

pub fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

pub fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_duration_secs(name: &str, default: u64) -> Duration {
    let secs = env_optional(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
