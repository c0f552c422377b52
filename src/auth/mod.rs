// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token-based sessions for two kinds of voters behind one protocol.
//!
//! ## Auth Flow
//!
//! 1. Client logs in: `POST /auth/social/github` (OAuth code exchange) or
//!    `POST /auth/anon/token` (fresh anonymous uuid, no credentials)
//! 2. Server answers with an access/refresh [`TokenPair`](crate::models::TokenPair)
//! 3. Client sends `Authorization: Bearer <access token>` on every request
//! 4. When the access token expires, `POST /auth/token/refresh` mints a new
//!    pair from the refresh token
//!
//! ## Security
//!
//! - Access and refresh tokens are signed with independent secrets
//! - Registered claims are a pointer: the canonical user is re-fetched from
//!   the store on every request
//! - Verification failures fail closed to `Unauthenticated`
//! - Survey access grants travel as a signed cookie; password mismatches are
//!   answered after a fixed delay

pub mod adapter;
pub mod claims;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod gate;

pub use adapter::{AnonymousAdapter, AuthSessionCore, FlowKind, IdentityAdapter, OAuthProvider};
pub use claims::TokenClaims;
pub use codec::TokenCodec;
pub use error::AuthError;
pub use extractor::{Auth, RequireAuth};
pub use gate::AccessGate;
