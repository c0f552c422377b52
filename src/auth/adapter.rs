// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login flows.
//!
//! Every way of establishing an identity goes through one state machine:
//! [`AuthSessionCore::execute_flow`] picks the flow once per request (refresh
//! iff the body carries a refresh token or says `grant_type=refresh_token`)
//! and dispatches to an [`IdentityAdapter`]. Adapters produce an [`Identity`];
//! the core turns it into a [`TokenPair`]. Failures stay typed the whole way,
//! there is no silent downgrade to `Unauthenticated` here.
//!
//! The OAuth adapter is table-driven: a provider is an entry of endpoints
//! plus a payload normalizer, so adding one means adding an entry.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::claims::TokenClaims;
use super::codec::TokenCodec;
use super::error::AuthError;
use crate::config::OAuthCredentials;
use crate::models::{AuthRequest, Identity, TokenPair, UserData};
use crate::store::{InMemoryStore, StoreError};

const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";

/// Which of the two token flows a request selects. Evaluated exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    AccessToken,
    RefreshToken,
}

impl FlowKind {
    pub fn of(request: &AuthRequest) -> Self {
        let wants_refresh = request.refresh_token.is_some()
            || request.grant_type.as_deref() == Some("refresh_token");
        if wants_refresh {
            FlowKind::RefreshToken
        } else {
            FlowKind::AccessToken
        }
    }
}

/// An identity source for the access-token flow.
pub trait IdentityAdapter {
    /// Reject the request before any I/O if its credentials are unacceptable.
    fn validate_credentials(&self, request: &AuthRequest) -> Result<(), AuthError>;

    /// Turn the request into an authenticated identity.
    fn resolve(
        &self,
        request: &AuthRequest,
        store: &RwLock<InMemoryStore>,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}

// =============================================================================
// OAuth adapter
// =============================================================================

type Normalizer = fn(Value) -> Result<UserData, AuthError>;

/// One registered OAuth provider: endpoints, app credentials, and the
/// function that turns the provider's profile payload into [`UserData`].
#[derive(Clone)]
pub struct OAuthProvider {
    name: &'static str,
    token_url: String,
    user_info_url: String,
    credentials: OAuthCredentials,
    normalize: Normalizer,
    http: Client,
}

impl OAuthProvider {
    fn build(
        name: &'static str,
        token_url: impl Into<String>,
        user_info_url: impl Into<String>,
        credentials: OAuthCredentials,
        normalize: Normalizer,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(concat!("pairvote-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AuthError::ClientBuild(e.to_string()))?;
        Ok(Self {
            name,
            token_url: token_url.into(),
            user_info_url: user_info_url.into(),
            credentials,
            normalize,
            http,
        })
    }

    pub fn github(credentials: OAuthCredentials) -> Result<Self, AuthError> {
        Self::build(
            "github",
            GITHUB_TOKEN_URL,
            GITHUB_USER_URL,
            credentials,
            normalize_github,
        )
    }

    /// Same provider against different endpoints. Test hook.
    pub fn with_endpoints(
        mut self,
        token_url: impl Into<String>,
        user_info_url: impl Into<String>,
    ) -> Self {
        self.token_url = token_url.into();
        self.user_info_url = user_info_url.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Exchange the authorization code for a provider access token, fetch
    /// the profile behind it, and normalize.
    ///
    /// The exchange body forwards `redirect_uri` and `grant_type` when the
    /// login request carried them; providers reject an exchange whose
    /// `redirect_uri` differs from the authorize request's.
    async fn fetch_user_data(
        &self,
        code: &str,
        request: &AuthRequest,
    ) -> Result<UserData, AuthError> {
        let mut exchange = serde_json::json!({
            "code": code,
            "client_id": self.credentials.client_id,
            "client_secret": self.credentials.client_secret,
        });
        if let Some(redirect_uri) = &request.redirect_uri {
            exchange["redirect_uri"] = Value::String(redirect_uri.clone());
        }
        if let Some(grant_type) = &request.grant_type {
            exchange["grant_type"] = Value::String(grant_type.clone());
        }
        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .json(&exchange)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchange(e.to_string()))?;
        let tokens: Value = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchange(e.to_string()))?;
        let access_token = tokens
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthError::ProviderExchange(format!("{} returned no access token", self.name))
            })?;

        let profile: Value = self
            .http
            .get(&self.user_info_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchange(e.to_string()))?;

        (self.normalize)(profile)
    }
}

impl IdentityAdapter for OAuthProvider {
    fn validate_credentials(&self, request: &AuthRequest) -> Result<(), AuthError> {
        let client_id = request
            .client_id
            .as_deref()
            .ok_or(AuthError::MissingParameter("client_id"))?;
        let client_secret = request
            .client_secret
            .as_deref()
            .ok_or(AuthError::MissingParameter("client_secret"))?;
        if client_id != self.credentials.client_id
            || client_secret != self.credentials.client_secret
        {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(())
    }

    async fn resolve(
        &self,
        request: &AuthRequest,
        store: &RwLock<InMemoryStore>,
    ) -> Result<Identity, AuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or(AuthError::MissingParameter("code"))?;
        let data = self.fetch_user_data(code, request).await?;
        let user = resolve_or_create_user(store, data).await?;
        Ok(Identity::Registered(user))
    }
}

/// github profile payload → [`UserData`]. A profile without an email can
/// never become a registered identity.
fn normalize_github(raw: Value) -> Result<UserData, AuthError> {
    let email = raw
        .get("email")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::IncompleteProfile("email"))?
        .to_string();
    let external_user_id = match raw.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Err(AuthError::IncompleteProfile("id")),
    };
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| raw.get("login").and_then(Value::as_str))
        .ok_or(AuthError::IncompleteProfile("name"))?
        .to_string();
    let picture = raw
        .get("avatar_url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(UserData {
        email,
        external_user_id,
        name,
        picture,
        provider: "github".to_string(),
        profile_data: raw,
    })
}

/// First match by email wins; a lost creation race resolves to the winner's
/// record.
async fn resolve_or_create_user(
    store: &RwLock<InMemoryStore>,
    data: UserData,
) -> Result<crate::models::UserRecord, AuthError> {
    {
        let store = store.read().await;
        if let Some(user) = store.find_user_by_email(&data.email) {
            return Ok(user);
        }
    }
    let email = data.email.clone();
    let created = {
        let mut store = store.write().await;
        store.create_user(data)
    };
    match created {
        Ok(user) => {
            info!(email = %user.email, "registered new user");
            Ok(user)
        }
        Err(StoreError::AlreadyExists(_)) => {
            let store = store.read().await;
            store
                .find_user_by_email(&email)
                .ok_or_else(|| AuthError::ProviderExchange("user record vanished".into()))
        }
        Err(StoreError::NotFound(msg)) => Err(AuthError::ProviderExchange(msg)),
    }
}

// =============================================================================
// Anonymous adapter
// =============================================================================

/// Anonymous login: no credentials, no I/O, a fresh uuid per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAdapter;

impl IdentityAdapter for AnonymousAdapter {
    fn validate_credentials(&self, _request: &AuthRequest) -> Result<(), AuthError> {
        Ok(())
    }

    async fn resolve(
        &self,
        _request: &AuthRequest,
        _store: &RwLock<InMemoryStore>,
    ) -> Result<Identity, AuthError> {
        Ok(Identity::Anonymous {
            uuid: Uuid::new_v4(),
        })
    }
}

// =============================================================================
// Session core
// =============================================================================

/// The shared login/refresh state machine.
pub struct AuthSessionCore<'a> {
    codec: &'a TokenCodec,
    store: &'a RwLock<InMemoryStore>,
}

impl<'a> AuthSessionCore<'a> {
    pub fn new(codec: &'a TokenCodec, store: &'a RwLock<InMemoryStore>) -> Self {
        Self { codec, store }
    }

    /// Run one login request through the adapter and mint a token pair.
    pub async fn execute_flow<A: IdentityAdapter>(
        &self,
        adapter: &A,
        request: &AuthRequest,
    ) -> Result<TokenPair, AuthError> {
        match FlowKind::of(request) {
            FlowKind::AccessToken => {
                adapter.validate_credentials(request)?;
                let identity = adapter.resolve(request, self.store).await?;
                self.codec.issue_pair(&identity)
            }
            FlowKind::RefreshToken => self.refresh(request).await,
        }
    }

    /// Verify the refresh token and rebuild the identity it stands for.
    pub async fn refresh(&self, request: &AuthRequest) -> Result<TokenPair, AuthError> {
        let token = request
            .refresh_token
            .as_deref()
            .ok_or(AuthError::InvalidRefreshToken)?;
        let claims = self
            .codec
            .verify_refresh(token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        let identity = self.rebuild_identity(&claims).await?;
        debug!(registered = claims.registered, "refreshed token pair");
        self.codec.issue_pair(&identity)
    }

    async fn rebuild_identity(&self, claims: &TokenClaims) -> Result<Identity, AuthError> {
        if claims.registered {
            let email = claims
                .email
                .as_deref()
                .ok_or(AuthError::InvalidRefreshToken)?;
            let store = self.store.read().await;
            return store
                .find_user_by_email(email)
                .map(Identity::Registered)
                .ok_or(AuthError::InvalidRefreshToken);
        }
        claims.as_anonymous().ok_or(AuthError::InvalidRefreshToken)
    }
}
