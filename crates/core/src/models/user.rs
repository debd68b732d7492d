//! User and session models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A local user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            username,
            password_hash,
            created_at: now,
        }
    }
}

/// Signed-in session for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Fixed lifetime of a session from issuance
    pub const TTL_HOURS: i64 = 24;

    pub fn new(username: String, now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            username,
            issued_at: now,
            expires_at: now + Duration::hours(Self::TTL_HOURS),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
