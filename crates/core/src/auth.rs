//! Local accounts and sessions

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::models::{Session, User};
use crate::storage::PlanRepository;

const LOGIN_FAILED: &str = "invalid username or password";

/// Argon2 PHC string with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Authentication(format!("failed to hash password: {e}")))
}

/// Lowercase hex SHA-256, the digest carried by imported documents
pub fn sha256_hex(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Argon2 hash verified against when the username is unknown
fn placeholder_hash() -> Option<&'static str> {
    static PLACEHOLDER: OnceLock<Option<String>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| hash_password("zenith-placeholder").ok())
        .as_deref()
}

fn is_legacy_digest(stored: &str) -> bool {
    stored.len() == 64 && stored.chars().all(|c| c.is_ascii_hexdigit())
}

/// Check a password against an Argon2 PHC string or a legacy SHA-256 digest
pub fn verify_password(password: &str, stored: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(stored) {
        return Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
    }
    is_legacy_digest(stored) && sha256_hex(password) == stored.to_ascii_lowercase()
}

/// Registration, login and session checks over a repository
pub struct AuthService<'r, R: PlanRepository> {
    repo: &'r R,
}

impl<'r, R: PlanRepository> AuthService<'r, R> {
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Create an account with an empty plan list and sign it in
    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str, now: DateTime<Utc>) -> Result<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::Validation(
                "username and password are required".to_string(),
            ));
        }
        if self.repo.find_user(username)?.is_some() {
            return Err(Error::Authentication(
                "username already exists, choose another one".to_string(),
            ));
        }

        let user = User::new(username.to_string(), hash_password(password)?, now);
        self.repo.upsert_user(&user)?;

        let session = Session::new(user.username, now);
        self.repo.set_session(&session)?;
        info!(username, "Registered new user");
        Ok(session)
    }

    /// Sign in; unknown users and wrong passwords fail the same way
    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str, now: DateTime<Utc>) -> Result<Session> {
        let username = username.trim();
        let user = match self.repo.find_user(username)? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            Some(_) => return Err(Error::Authentication(LOGIN_FAILED.to_string())),
            None => {
                if let Some(placeholder) = placeholder_hash() {
                    verify_password(password, placeholder);
                }
                return Err(Error::Authentication(LOGIN_FAILED.to_string()));
            }
        };

        if is_legacy_digest(&user.password_hash) {
            debug!(username, "Upgrading legacy password digest");
            let upgraded = User {
                password_hash: hash_password(password)?,
                ..user.clone()
            };
            self.repo.upsert_user(&upgraded)?;
        }

        let session = Session::new(user.username, now);
        self.repo.set_session(&session)?;
        Ok(session)
    }

    /// The stored session, cleared when it expired or its user is gone
    #[instrument(skip(self))]
    pub fn current_session(&self, now: DateTime<Utc>) -> Result<Option<Session>> {
        let Some(session) = self.repo.session()? else {
            return Ok(None);
        };
        if !session.is_valid_at(now) || self.repo.find_user(&session.username)?.is_none() {
            debug!(username = %session.username, "Discarding stale session");
            self.repo.clear_session()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Username of the signed-in user
    pub fn require_session(&self, now: DateTime<Utc>) -> Result<Session> {
        self.current_session(now)?
            .ok_or_else(|| Error::Authentication("not signed in".to_string()))
    }

    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<()> {
        self.repo.clear_session()
    }

    /// Known usernames in alphabetical order
    pub fn usernames(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.repo.users()?.into_iter().map(|u| u.username).collect();
        names.sort();
        Ok(names)
    }
}
