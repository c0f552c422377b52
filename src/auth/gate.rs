// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Survey access authorization.
//!
//! [`AccessGate::can_access`] is a pure function over (identity, survey,
//! grant) with a fixed short-circuit order: ownership, then public
//! compatibility, then an unlocked grant, then deny. Grants travel as a
//! signed `user_cache` cookie and only ever grow.
//!
//! A password mismatch is answered only after a fixed delay, so probing a
//! survey password costs seconds per attempt.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use super::codec::TokenCodec;
use super::error::AuthError;
use crate::error::ApiError;
use crate::models::{AccessGrant, Identity, SurveyRecord};

/// Cookie holding the signed access grant.
pub const GRANT_COOKIE: &str = "user_cache";

pub struct AccessGate;

impl AccessGate {
    /// Whether this identity may read the survey or vote on it.
    ///
    /// Order matters and short-circuits: the owner is never asked for a
    /// password, even on a password-protected survey.
    pub fn can_access(identity: &Identity, survey: &SurveyRecord, grant: &AccessGrant) -> bool {
        if survey.is_owned_by(identity) {
            return true;
        }
        if survey.password_hash.is_none() && (survey.allow_anon || identity.is_registered()) {
            return true;
        }
        grant.contains(&survey.api_id)
    }

    /// Trade a password for an extended grant. The mismatch path sleeps for
    /// `delay` before answering; the success path answers immediately with
    /// the union of the old grant and this survey. A passwordless survey
    /// matches any supplied password, so an explicit access request always
    /// unlocks it.
    pub async fn request_access(
        survey: &SurveyRecord,
        supplied_password: &str,
        grant: AccessGrant,
        delay: Duration,
    ) -> Result<AccessGrant, ApiError> {
        let matches = match survey.password_hash.as_deref() {
            Some(hash) => bcrypt::verify(supplied_password, hash).unwrap_or(false),
            None => true,
        };

        if !matches {
            debug!(survey_id = %survey.api_id, "survey password mismatch");
            tokio::time::sleep(delay).await;
            return Err(
                ApiError::validation("Invalid password").with_detail("invalid_password")
            );
        }
        Ok(grant.with_survey(survey.api_id.clone()))
    }
}

/// Hash a new survey password for storage.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, 10).map_err(|e| ApiError::server(format!("failed to hash password: {e}")))
}

/// Read the access grant out of the request cookies. A missing or invalid
/// cookie is an empty grant.
pub fn grant_from_jar(jar: &CookieJar, codec: &TokenCodec) -> AccessGrant {
    jar.get(GRANT_COOKIE)
        .map(|cookie| codec.verify_grant(cookie.value()))
        .unwrap_or_default()
}

/// Sign the grant and set it on the jar.
pub fn store_grant(
    jar: CookieJar,
    codec: &TokenCodec,
    grant: &AccessGrant,
) -> Result<CookieJar, AuthError> {
    let value = codec.sign_grant(grant)?;
    let cookie = Cookie::build((GRANT_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    Ok(jar.add(cookie))
}

/// Drop the grant cookie.
pub fn clear_grant(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build((GRANT_COOKIE, "")).path("/").build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::models::OwnerRef;
    use std::time::Instant;
    use uuid::Uuid;

    fn survey(owner: OwnerRef, password: Option<&str>, allow_anon: bool) -> SurveyRecord {
        SurveyRecord {
            api_id: "s1".to_string(),
            api_url: "http://backend:8000/surveys/s1/".to_string(),
            owner,
            password_hash: password.map(|p| bcrypt::hash(p, 4).unwrap()),
            allow_anon,
        }
    }

    #[test]
    fn owner_always_has_access() {
        let uuid = Uuid::new_v4();
        let identity = Identity::Anonymous { uuid };
        // Password-protected, anon-hostile: ownership still wins.
        let survey = survey(OwnerRef::Anon(uuid), Some("hunter22"), false);
        assert!(AccessGate::can_access(
            &identity,
            &survey,
            &AccessGrant::default()
        ));
    }

    #[test]
    fn public_survey_respects_allow_anon() {
        let anon = Identity::Anonymous { uuid: Uuid::new_v4() };
        let open = survey(OwnerRef::Anon(Uuid::new_v4()), None, true);
        let registered_only = survey(OwnerRef::Anon(Uuid::new_v4()), None, false);

        assert!(AccessGate::can_access(&anon, &open, &AccessGrant::default()));
        assert!(!AccessGate::can_access(
            &anon,
            &registered_only,
            &AccessGrant::default()
        ));
    }

    #[test]
    fn grant_unlocks_a_protected_survey() {
        let anon = Identity::Anonymous { uuid: Uuid::new_v4() };
        let protected = survey(OwnerRef::Anon(Uuid::new_v4()), Some("hunter22"), true);

        assert!(!AccessGate::can_access(
            &anon,
            &protected,
            &AccessGrant::default()
        ));
        let grant = AccessGrant::default().with_survey("s1");
        assert!(AccessGate::can_access(&anon, &protected, &grant));
    }

    #[tokio::test]
    async fn correct_password_extends_the_grant() {
        let protected = survey(OwnerRef::Anon(Uuid::new_v4()), Some("hunter22"), true);
        let grant = AccessGrant::default().with_survey("other");

        let updated =
            AccessGate::request_access(&protected, "hunter22", grant, Duration::from_millis(1))
                .await
                .unwrap();
        assert!(updated.contains("s1"));
        assert!(updated.contains("other"));

        // Union is idempotent.
        let again = AccessGate::request_access(
            &protected,
            "hunter22",
            updated.clone(),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(again, updated);
    }

    #[tokio::test]
    async fn wrong_password_is_delayed() {
        let protected = survey(OwnerRef::Anon(Uuid::new_v4()), Some("hunter22"), true);
        let delay = Duration::from_millis(50);

        let started = Instant::now();
        let err = AccessGate::request_access(&protected, "wrong", AccessGrant::default(), delay)
            .await
            .unwrap_err();
        assert!(started.elapsed() >= delay);
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, Some("invalid_password".into()));
    }

    #[tokio::test]
    async fn passwordless_survey_unlocks_for_any_password() {
        // Matters for allow_anon=false passwordless surveys: an explicit
        // access request is the anonymous caller's only way in.
        let open = survey(OwnerRef::Anon(Uuid::new_v4()), None, false);
        let grant = AccessGate::request_access(
            &open,
            "anything",
            AccessGrant::default(),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert!(grant.contains("s1"));

        let anon = Identity::Anonymous { uuid: Uuid::new_v4() };
        assert!(AccessGate::can_access(&anon, &open, &grant));
    }

    #[test]
    fn grant_cookie_roundtrip() {
        let codec = TokenCodec::new(TokenConfig::default());
        let grant = AccessGrant::default().with_survey("s1");

        let jar = store_grant(CookieJar::new(), &codec, &grant).unwrap();
        assert_eq!(grant_from_jar(&jar, &codec), grant);

        let jar = clear_grant(jar);
        assert!(grant_from_jar(&jar, &codec).is_empty());
    }
}
