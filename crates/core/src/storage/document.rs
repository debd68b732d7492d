//! The persisted multi-user document

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Plan, Session, User};

/// Document layout written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Everything stored for one installation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub schema_version: u32,
    pub users: Vec<User>,
    pub plans_by_user: BTreeMap<String, Vec<Plan>>,
    pub active_plan_by_user: BTreeMap<String, String>,
    pub session: Option<Session>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            users: Vec::new(),
            plans_by_user: BTreeMap::new(),
            active_plan_by_user: BTreeMap::new(),
            session: None,
        }
    }
}

impl Document {
    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Plans and active pointer of one user; empty for unknown users
    pub fn user_plans(&self, username: &str) -> UserPlans {
        if self.user(username).is_none() {
            return UserPlans::default();
        }
        UserPlans {
            plans: self.plans_by_user.get(username).cloned().unwrap_or_default(),
            active_plan_id: self.active_plan_by_user.get(username).cloned(),
        }
    }

    pub fn export(&self, now: DateTime<Utc>) -> ExportBundle {
        ExportBundle {
            version: CURRENT_SCHEMA_VERSION,
            exported_at: now,
            users: self.users.clone(),
            plans_by_user: self.plans_by_user.clone(),
            active_plan_by_user: self.active_plan_by_user.clone(),
        }
    }
}

/// One user's slice of the document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlans {
    pub plans: Vec<Plan>,
    pub active_plan_id: Option<String>,
}

/// Interchange document produced by export and accepted by import
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub plans_by_user: BTreeMap<String, Vec<Plan>>,
    pub active_plan_by_user: BTreeMap<String, String>,
}
