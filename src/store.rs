// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory store for users, surveys, and annotator mappings.
//!
//! The ranking engine is the source of truth for survey content and voting
//! state; this store holds only the local linkage records. Uniqueness
//! constraints live here, not in session logic: user emails are unique, and
//! at most one annotator mapping exists per (owner, survey). Concurrent
//! first-access races surface as [`StoreError::AlreadyExists`], which callers
//! treat as "reload the existing record", never as a hard failure.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{AnnotatorRecord, OwnerRef, SurveyRecord, UserData, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
pub struct InMemoryStore {
    users: HashMap<Uuid, UserRecord>,
    /// Unique-email index into `users`.
    users_by_email: HashMap<String, Uuid>,
    surveys: HashMap<String, SurveyRecord>,
    annotators: HashMap<String, AnnotatorRecord>,
    /// Uniqueness constraint on (owner, survey): maps to the annotator api id.
    annotators_by_owner: HashMap<(OwnerRef, String), String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    pub fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users_by_email
            .get(email)
            .and_then(|id| self.users.get(id))
            .cloned()
    }

    /// Create a user from a normalized provider payload.
    ///
    /// Fails with `AlreadyExists` if the email is taken; resolve-or-create
    /// callers re-read on that outcome (first match by email wins).
    pub fn create_user(&mut self, data: UserData) -> StoreResult<UserRecord> {
        if self.users_by_email.contains_key(&data.email) {
            return Err(StoreError::AlreadyExists(format!("user {}", data.email)));
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            email: data.email.clone(),
            name: data.name,
            picture: data.picture,
            identities: vec![crate::models::ProviderIdentity {
                provider: data.provider,
                external_user_id: data.external_user_id,
                profile_data: data.profile_data,
            }],
            created_at: Utc::now(),
        };
        self.users_by_email.insert(data.email, user.id);
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    // -------------------------------------------------------------------------
    // Surveys
    // -------------------------------------------------------------------------

    pub fn survey(&self, api_id: &str) -> Option<SurveyRecord> {
        self.surveys.get(api_id).cloned()
    }

    pub fn insert_survey(&mut self, survey: SurveyRecord) -> StoreResult<()> {
        if self.surveys.contains_key(&survey.api_id) {
            return Err(StoreError::AlreadyExists(format!(
                "survey {}",
                survey.api_id
            )));
        }
        self.surveys.insert(survey.api_id.clone(), survey);
        Ok(())
    }

    /// Replace an existing survey record with an updated value.
    pub fn replace_survey(&mut self, survey: SurveyRecord) -> StoreResult<()> {
        if !self.surveys.contains_key(&survey.api_id) {
            return Err(StoreError::NotFound(format!("survey {}", survey.api_id)));
        }
        self.surveys.insert(survey.api_id.clone(), survey);
        Ok(())
    }

    /// All surveys owned by this identity, ordered by api id.
    pub fn surveys_owned_by(&self, owner: OwnerRef) -> Vec<SurveyRecord> {
        let mut owned: Vec<SurveyRecord> = self
            .surveys
            .values()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.api_id.cmp(&b.api_id));
        owned
    }

    /// All surveys this identity has an annotator mapping on, ordered by
    /// api id. A mapping whose survey record is gone is skipped.
    pub fn surveys_annotated_by(&self, owner: OwnerRef) -> Vec<SurveyRecord> {
        let mut annotated: Vec<SurveyRecord> = self
            .annotators_by_owner
            .keys()
            .filter(|(o, _)| *o == owner)
            .filter_map(|(_, survey_api_id)| self.surveys.get(survey_api_id).cloned())
            .collect();
        annotated.sort_by(|a, b| a.api_id.cmp(&b.api_id));
        annotated
    }

    /// Remove a survey and all of its annotator mappings. Returns the removed
    /// annotators so the caller can attempt best-effort remote cleanup.
    pub fn remove_survey(&mut self, api_id: &str) -> StoreResult<(SurveyRecord, Vec<AnnotatorRecord>)> {
        let survey = self
            .surveys
            .remove(api_id)
            .ok_or_else(|| StoreError::NotFound(format!("survey {api_id}")))?;

        let removed: Vec<AnnotatorRecord> = self
            .annotators
            .values()
            .filter(|a| a.survey_api_id == api_id)
            .cloned()
            .collect();
        for annotator in &removed {
            self.annotators.remove(&annotator.api_id);
            self.annotators_by_owner
                .remove(&(annotator.owner, annotator.survey_api_id.clone()));
        }

        Ok((survey, removed))
    }

    // -------------------------------------------------------------------------
    // Annotators
    // -------------------------------------------------------------------------

    pub fn annotator_for(&self, owner: OwnerRef, survey_api_id: &str) -> Option<AnnotatorRecord> {
        self.annotators_by_owner
            .get(&(owner, survey_api_id.to_string()))
            .and_then(|api_id| self.annotators.get(api_id))
            .cloned()
    }

    /// Insert an annotator mapping, enforcing one mapping per (owner, survey).
    pub fn insert_annotator(&mut self, annotator: AnnotatorRecord) -> StoreResult<()> {
        let owner_key = (annotator.owner, annotator.survey_api_id.clone());
        if self.annotators_by_owner.contains_key(&owner_key) {
            return Err(StoreError::AlreadyExists(format!(
                "annotator for survey {}",
                annotator.survey_api_id
            )));
        }
        if self.annotators.contains_key(&annotator.api_id) {
            return Err(StoreError::AlreadyExists(format!(
                "annotator {}",
                annotator.api_id
            )));
        }
        self.annotators_by_owner
            .insert(owner_key, annotator.api_id.clone());
        self.annotators.insert(annotator.api_id.clone(), annotator);
        Ok(())
    }

    pub fn remove_annotator(&mut self, api_id: &str) -> StoreResult<AnnotatorRecord> {
        let annotator = self
            .annotators
            .remove(api_id)
            .ok_or_else(|| StoreError::NotFound(format!("annotator {api_id}")))?;
        self.annotators_by_owner
            .remove(&(annotator.owner, annotator.survey_api_id.clone()));
        Ok(annotator)
    }
}
