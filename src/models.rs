// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Core data types: the resolved caller [`Identity`], locally persisted
//! records ([`UserRecord`], [`SurveyRecord`], [`AnnotatorRecord`]), and the
//! request/response structures of the REST API. All API-facing types derive
//! `Serialize`/`Deserialize` and `ToSchema` for OpenAPI documentation.
//!
//! ## Identity
//!
//! [`Identity`] is the principal attached to every request. Exactly one
//! variant is active per request; `Registered` and `Anonymous` are both
//! "authenticated", `Unauthenticated` carries no claims and is the fail-closed
//! terminal state of token verification.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Identity
// =============================================================================

/// The resolved caller principal.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// A registered user, resolved to its canonical store record.
    Registered(UserRecord),
    /// An anonymous but authenticated voter, identified only by a UUID.
    Anonymous { uuid: Uuid },
    /// No valid credentials. Carries no claims; authorization checks reject it.
    Unauthenticated,
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Identity::Unauthenticated)
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Identity::Registered(_))
    }

    /// Display name used when creating a remote annotator.
    pub fn annotator_name(&self) -> Option<String> {
        match self {
            Identity::Registered(user) => Some(user.name.clone()),
            Identity::Anonymous { uuid } => {
                let short = uuid.to_string();
                let prefix = short.split('-').next().unwrap_or(&short).to_string();
                Some(format!("Anon {prefix}"))
            }
            Identity::Unauthenticated => None,
        }
    }

    /// Owner reference for records created by this identity.
    pub fn owner_ref(&self) -> Option<OwnerRef> {
        match self {
            Identity::Registered(user) => Some(OwnerRef::User(user.id)),
            Identity::Anonymous { uuid } => Some(OwnerRef::Anon(*uuid)),
            Identity::Unauthenticated => None,
        }
    }

    /// Serialize for the `/user` endpoint. Never exposes internals beyond the
    /// stored profile.
    pub fn serialize(&self) -> Value {
        match self {
            Identity::Registered(user) => serde_json::json!({
                "isAuthenticated": true,
                "isRegistered": true,
                "email": user.email,
                "name": user.name,
                "picture": user.picture,
                "identities": user.identities,
            }),
            Identity::Anonymous { uuid } => serde_json::json!({
                "isAuthenticated": true,
                "isRegistered": false,
                "uuid": uuid,
            }),
            Identity::Unauthenticated => serde_json::json!({
                "isAuthenticated": false,
                "isRegistered": false,
            }),
        }
    }
}

/// Reference to the owner of a survey or annotator record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OwnerRef {
    /// A registered user's store id.
    User(Uuid),
    /// An anonymous identity's uuid.
    Anon(Uuid),
}

// =============================================================================
// User records
// =============================================================================

/// A linked identity-provider account on a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderIdentity {
    /// Provider slug (e.g. `github`).
    pub provider: String,
    /// The provider's own id for this user.
    #[serde(rename = "userId")]
    pub external_user_id: String,
    /// Raw provider profile payload, kept for audit/debug.
    #[serde(rename = "profileData")]
    pub profile_data: Value,
}

/// A registered user as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub id: Uuid,
    /// Unique; the lookup key for resolve-or-create and refresh flows.
    pub email: String,
    pub name: String,
    pub picture: String,
    pub identities: Vec<ProviderIdentity>,
    pub created_at: DateTime<Utc>,
}

/// Normalized provider user payload, the common shape every OAuth variant
/// produces before user resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub email: String,
    pub external_user_id: String,
    pub name: String,
    pub picture: String,
    pub provider: String,
    pub profile_data: Value,
}

// =============================================================================
// Survey / annotator records
// =============================================================================

/// A survey as persisted locally. The ranking engine owns everything about
/// the survey's content; this record holds only the linkage and the security
/// attributes the engine knows nothing about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    /// Ranking engine id for this survey.
    pub api_id: String,
    /// Ranking engine URL for this survey (followed, never reconstructed).
    pub api_url: String,
    pub owner: OwnerRef,
    /// bcrypt hash; `None` means the survey is public.
    pub password_hash: Option<String>,
    /// Whether anonymous identities may annotate.
    pub allow_anon: bool,
}

impl SurveyRecord {
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        identity.owner_ref().is_some_and(|owner| owner == self.owner)
    }
}

/// The local mapping from an identity to its remote annotator for one survey.
/// At most one exists per (owner, survey); the store enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorRecord {
    /// Ranking engine id for this annotator.
    pub api_id: String,
    /// Ranking engine URL for this annotator.
    pub api_url: String,
    pub owner: OwnerRef,
    pub survey_api_id: String,
}

// =============================================================================
// Auth wire types
// =============================================================================

/// Access + refresh token pair returned by every login flow.
///
/// Invariant: the access token expires before the refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Inbound payload of the OAuth login and refresh endpoints.
///
/// The presence of `refresh_token` (or `grant_type=refresh_token`) selects the
/// refresh flow; it is evaluated once per request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AuthRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Client-held record of which password-protected surveys have been unlocked.
/// Travels as a signed cookie; opaque to the client. Set semantics: appending
/// the same survey twice yields one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(rename = "surveyAccess", default)]
    pub survey_access: BTreeSet<String>,
}

impl AccessGrant {
    pub fn contains(&self, survey_api_id: &str) -> bool {
        self.survey_access.contains(survey_api_id)
    }

    /// Set union; idempotent.
    pub fn with_survey(mut self, survey_api_id: impl Into<String>) -> Self {
        self.survey_access.insert(survey_api_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.survey_access.is_empty()
    }
}

// =============================================================================
// Survey API request/response types
// =============================================================================

/// Request to create a survey.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSurveyRequest {
    pub name: String,
    #[serde(rename = "allowAnon", default)]
    pub allow_anon: bool,
    /// 6..=50 chars when present; hashed before storage.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(rename = "maxTime", default)]
    pub max_time: Option<u32>,
    #[serde(rename = "minViews", default)]
    pub min_views: Option<u32>,
    #[serde(rename = "allowConcurrent", default)]
    pub allow_concurrent: Option<bool>,
}

/// Owner-only survey update.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateSurveyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "allowAnon", default)]
    pub allow_anon: Option<bool>,
    #[serde(rename = "maxTime", default)]
    pub max_time: Option<u32>,
    #[serde(rename = "minViews", default)]
    pub min_views: Option<u32>,
    #[serde(rename = "allowConcurrent", default)]
    pub allow_concurrent: Option<bool>,
}

/// Body of `POST /survey/{id}/access`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub password: String,
}

/// Body of `POST /survey/{id}/change-password`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(rename = "oldPassword")]
    pub old_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

/// Body of `POST /survey/{id}/annotator/vote`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoteRequest {
    #[serde(rename = "currentWins")]
    pub current_wins: bool,
}
