// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims carried by access and refresh tokens.
//!
//! Claims hold the minimal identity subset needed to rebuild an [`Identity`]
//! later: registered users are keyed by email (the canonical record is always
//! re-fetched from the store), anonymous users carry only their uuid. The
//! `registered` marker is what distinguishes the two at verification time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Identity, UserRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiry, stamped by the codec at issue time.
    #[serde(default)]
    pub exp: i64,
    /// Issued-at, stamped by the codec at issue time.
    #[serde(default)]
    pub iat: i64,
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

impl TokenClaims {
    pub fn registered(user: &UserRecord) -> Self {
        Self {
            exp: 0,
            iat: 0,
            registered: true,
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
            uuid: None,
        }
    }

    pub fn anonymous(uuid: Uuid) -> Self {
        Self {
            exp: 0,
            iat: 0,
            registered: false,
            email: None,
            name: None,
            uuid: Some(uuid),
        }
    }

    /// Claims for an identity. `None` for [`Identity::Unauthenticated`],
    /// which never gets a token.
    pub fn for_identity(identity: &Identity) -> Option<Self> {
        match identity {
            Identity::Registered(user) => Some(Self::registered(user)),
            Identity::Anonymous { uuid } => Some(Self::anonymous(*uuid)),
            Identity::Unauthenticated => None,
        }
    }

    /// Rebuild an anonymous identity directly from the claims.
    ///
    /// Registered claims cannot be rebuilt here: the canonical user record
    /// lives in the store and must be looked up by email.
    pub fn as_anonymous(&self) -> Option<Identity> {
        if self.registered {
            return None;
        }
        self.uuid.map(|uuid| Identity::Anonymous { uuid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn registered_claims_carry_email_and_name() {
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: "Ada".into(),
            picture: String::new(),
            identities: vec![],
            created_at: Utc::now(),
        };
        let claims = TokenClaims::registered(&user);
        assert!(claims.registered);
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert!(claims.uuid.is_none());
        assert!(claims.as_anonymous().is_none());
    }

    #[test]
    fn anonymous_claims_rebuild_the_identity() {
        let uuid = Uuid::new_v4();
        let claims = TokenClaims::anonymous(uuid);
        assert_eq!(claims.as_anonymous(), Some(Identity::Anonymous { uuid }));
    }

    #[test]
    fn unauthenticated_never_gets_claims() {
        assert!(TokenClaims::for_identity(&Identity::Unauthenticated).is_none());
    }

    #[test]
    fn empty_fields_are_not_serialized() {
        let claims = TokenClaims::anonymous(Uuid::nil());
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value,
            json!({
                "exp": 0,
                "iat": 0,
                "registered": false,
                "uuid": Uuid::nil(),
            })
        );
    }
}
