//! Storage repository traits
//!
//! Every operation reads the whole document and, for writes, replaces it in
//! one step. Backends only implement `load_document` and `save_document`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::document::{Document, ExportBundle, UserPlans};
use super::migrations::{fold_legacy_layout, has_legacy_layout};
use super::normalize::{ensure_user_buckets, normalize_document, normalize_plan};
use crate::error::{Error, Result};
use crate::models::{Plan, Session, User};

const MULTI_USER_KEYS: [&str; 3] = ["users", "plansByUser", "activePlanByUser"];

/// Plan and account persistence
pub trait PlanRepository {
    /// Read the migrated, normalized document
    fn load_document(&self) -> Result<Document>;

    /// Replace the stored document atomically
    fn save_document(&self, document: &Document) -> Result<()>;

    /// Plans and active plan id of one user
    fn load(&self, username: &str) -> Result<UserPlans> {
        Ok(self.load_document()?.user_plans(username))
    }

    /// Replace one user's plans
    fn save(&self, username: &str, plans: &[Plan]) -> Result<()> {
        let mut document = self.load_document()?;
        if document.user(username).is_none() {
            return Err(Error::NotFound(format!("user {username}")));
        }
        // Stored plans pass the same normalizer as loaded ones
        let now = Utc::now();
        let plans = plans
            .iter()
            .filter_map(|plan| {
                let record = serde_json::to_value(plan).ok()?;
                normalize_plan(&record, now)
            })
            .collect();
        document.plans_by_user.insert(username.to_string(), plans);
        self.commit(document)
    }

    /// Point a user at one of their plans, or clear the pointer
    fn set_active_plan(&self, username: &str, plan_id: Option<&str>) -> Result<()> {
        let mut document = self.load_document()?;
        match plan_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                document
                    .active_plan_by_user
                    .insert(username.to_string(), id.to_string());
            }
            None => {
                document.active_plan_by_user.remove(username);
            }
        }
        self.commit(document)
    }

    fn users(&self) -> Result<Vec<User>> {
        Ok(self.load_document()?.users)
    }

    fn find_user(&self, username: &str) -> Result<Option<User>> {
        let username = username.trim();
        Ok(self.load_document()?.user(username).cloned())
    }

    /// Insert or replace a user, keeping their plans
    fn upsert_user(&self, user: &User) -> Result<()> {
        if user.username.trim().is_empty() || user.password_hash.trim().is_empty() {
            return Err(Error::Validation("invalid user payload".to_string()));
        }
        let mut document = self.load_document()?;
        document.users.retain(|u| u.username != user.username);
        document.users.push(user.clone());
        self.commit(document)
    }

    fn session(&self) -> Result<Option<Session>> {
        Ok(self.load_document()?.session)
    }

    fn set_session(&self, session: &Session) -> Result<()> {
        let mut document = self.load_document()?;
        document.session = Some(session.clone());
        self.commit(document)
    }

    fn clear_session(&self) -> Result<()> {
        let mut document = self.load_document()?;
        if document.session.take().is_none() {
            return Ok(());
        }
        self.commit(document)
    }

    #[instrument(skip(self))]
    fn export_bundle(&self, now: DateTime<Utc>) -> Result<ExportBundle> {
        Ok(self.load_document()?.export(now))
    }

    /// Replace the whole store with an interchange document
    ///
    /// Nothing is written when the payload is rejected. Accepts the
    /// multi-user bundle and the single-user `{user, plans, activePlanId}`
    /// layout. The session is cleared on success.
    #[instrument(skip(self, payload))]
    fn import_bundle(&self, payload: &Value, now: DateTime<Utc>) -> Result<Document> {
        let document = match parse_bundle(payload, now) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Import rejected");
                return Err(e);
            }
        };
        self.save_document(&document)?;
        info!(
            users = document.users.len(),
            plans = document.plans_by_user.values().map(Vec::len).sum::<usize>(),
            "Import complete"
        );
        Ok(document)
    }

    /// Re-establish bucket consistency and persist
    fn commit(&self, mut document: Document) -> Result<()> {
        ensure_user_buckets(
            &document.users,
            &mut document.plans_by_user,
            &mut document.active_plan_by_user,
        );
        if let Some(session) = &document.session {
            if document.user(&session.username).is_none() {
                document.session = None;
            }
        }
        self.save_document(&document)
    }
}

/// Validate and normalize an interchange document without touching storage
pub fn parse_bundle(payload: &Value, now: DateTime<Utc>) -> Result<Document> {
    let root = payload
        .as_object()
        .ok_or_else(|| Error::Import("invalid import payload".to_string()))?;

    if let Some(version) = root.get("version").and_then(Value::as_u64) {
        if version > u64::from(super::document::CURRENT_SCHEMA_VERSION) {
            return Err(Error::Import(format!(
                "bundle version {version} is newer than this build supports"
            )));
        }
    }

    let multi_user = MULTI_USER_KEYS.iter().any(|key| root.contains_key(*key));
    let source = if multi_user {
        check_shape(root.get("users"), Value::is_array, "users must be a list")?;
        check_shape(root.get("plansByUser"), Value::is_object, "plansByUser must be an object")?;
        check_shape(
            root.get("activePlanByUser"),
            Value::is_object,
            "activePlanByUser must be an object",
        )?;
        payload.clone()
    } else if has_legacy_layout(root) {
        fold_legacy_layout(payload.clone())
    } else {
        return Err(Error::Import("payload contains no users or plans".to_string()));
    };

    let mut document = normalize_document(&source, now);
    document.session = None;
    Ok(document)
}

fn check_shape(value: Option<&Value>, expected: fn(&Value) -> bool, message: &str) -> Result<()> {
    match value {
        Some(value) if !value.is_null() && !expected(value) => {
            Err(Error::Import(message.to_string()))
        }
        _ => Ok(()),
    }
}
