// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::auth::adapter::OAuthProvider;
use crate::auth::codec::TokenCodec;
use crate::auth::error::AuthError;
use crate::config::{OAuthCredentials, TokenConfig, PASSWORD_MISMATCH_DELAY};
use crate::ranking::{RankingClient, RankingError};
use crate::store::InMemoryStore;

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Shared application state: every dependency a handler needs, threaded
/// explicitly instead of living in globals.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<InMemoryStore>>,
    pub tokens: Arc<TokenCodec>,
    pub ranking: RankingClient,
    /// OAuth provider registry, keyed by provider slug.
    pub providers: Arc<HashMap<String, OAuthProvider>>,
    /// Sleep imposed on a survey password mismatch. Production keeps the
    /// default; tests shrink it.
    pub password_delay: Duration,
}

impl AppState {
    pub fn new(store: InMemoryStore, tokens: TokenCodec, ranking: RankingClient) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            tokens: Arc::new(tokens),
            ranking,
            providers: Arc::new(HashMap::new()),
            password_delay: PASSWORD_MISMATCH_DELAY,
        }
    }

    /// Build the production state from the environment.
    pub fn from_env() -> Result<Self, StateError> {
        let mut state = Self::new(
            InMemoryStore::new(),
            TokenCodec::new(TokenConfig::from_env()),
            RankingClient::from_env()?,
        );
        if let Some(credentials) = OAuthCredentials::from_env("github") {
            state = state.with_provider(OAuthProvider::github(credentials)?);
        } else {
            tracing::warn!("github OAuth credentials not configured, social login disabled");
        }
        Ok(state)
    }

    pub fn with_provider(mut self, provider: OAuthProvider) -> Self {
        let mut providers = (*self.providers).clone();
        providers.insert(provider.name().to_string(), provider);
        self.providers = Arc::new(providers);
        self
    }

    pub fn with_password_delay(mut self, delay: Duration) -> Self {
        self.password_delay = delay;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingClient) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn provider(&self, name: &str) -> Option<&OAuthProvider> {
        self.providers.get(name)
    }
}

impl Default for AppState {
    fn default() -> Self {
        let ranking = RankingClient::new("http://backend:8000", "test-token")
            .expect("default ranking client config is valid");
        Self::new(
            InMemoryStore::new(),
            TokenCodec::new(TokenConfig::default()),
            ranking,
        )
    }
}
