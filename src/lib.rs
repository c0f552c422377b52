// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pairvote - Pairwise Comparison Survey Service
//!
//! BFF for pairwise-comparison surveys. Surveys and their items live on an
//! external ranking engine; this service adds identity, survey ownership and
//! access control, and per-identity annotator sessions on top of it.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token issuance, identity resolution, survey access gate
//! - `ranking` - Ranking engine client and annotator voting sessions
//! - `store` - In-memory records (users, surveys, annotator mappings)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod ranking;
pub mod state;
pub mod store;
