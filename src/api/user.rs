// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;
use serde_json::Value;

use crate::auth::RequireAuth;
use crate::error::ApiError;

/// The caller's own identity, as the frontend consumes it.
#[utoipa::path(
    get,
    path = "/api/user",
    tag = "User",
    responses(
        (status = 200, description = "Serialized identity"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn current_user(RequireAuth(identity): RequireAuth) -> Result<Json<Value>, ApiError> {
    Ok(Json(identity.serialize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use uuid::Uuid;

    #[tokio::test]
    async fn anonymous_identity_serializes_flags() {
        let uuid = Uuid::new_v4();
        let Json(body) = current_user(RequireAuth(Identity::Anonymous { uuid }))
            .await
            .unwrap();
        assert_eq!(body["isAuthenticated"], true);
        assert_eq!(body["isRegistered"], false);
        assert_eq!(body["uuid"], uuid.to_string());
    }
}
