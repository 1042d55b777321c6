//! # auth-adapters
//!
//! Config-driven implementation of `AuthProvider`: a fixed list of admin
//! identities, one Argon2-hashed moderator password and one Argon2-hashed
//! intake key for the transport bridge.

use std::collections::HashSet;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use domains::{AuthProvider, Submitter, UserId};
use tracing::warn;

pub struct StaticAuthProvider {
    /// Lowercased, without a leading `@`.
    admin_usernames: HashSet<String>,
    admin_ids: HashSet<UserId>,
    moderator_hash: Option<String>,
    intake_hash: Option<String>,
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

impl StaticAuthProvider {
    pub fn new<I, S>(admin_usernames: I, admin_ids: impl IntoIterator<Item = UserId>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            admin_usernames: admin_usernames
                .into_iter()
                .map(|u| normalize_handle(u.as_ref()))
                .filter(|u| !u.is_empty())
                .collect(),
            admin_ids: admin_ids.into_iter().collect(),
            moderator_hash: None,
            intake_hash: None,
        }
    }

    /// Without a hash every moderator password is refused.
    pub fn with_moderator_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        if PasswordHash::new(&hash).is_err() {
            warn!("moderator password hash is not a valid PHC string; moderation over HTTP is disabled");
        }
        self.moderator_hash = Some(hash);
        self
    }

    /// Without a hash every intake request is refused.
    pub fn with_intake_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        if PasswordHash::new(&hash).is_err() {
            warn!("intake key hash is not a valid PHC string; intake over HTTP is disabled");
        }
        self.intake_hash = Some(hash);
        self
    }
}

fn verify_against(hash: Option<&str>, secret: &str) -> bool {
    let Some(hash) = hash else {
        return false;
    };
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    /// Matches either the numeric id or the handle (case-insensitive).
    fn is_privileged(&self, submitter: &Submitter) -> bool {
        self.admin_ids.contains(&submitter.id)
            || submitter
                .handle
                .as_deref()
                .map(normalize_handle)
                .is_some_and(|h| self.admin_usernames.contains(&h))
    }

    /// Verifies the password against the configured Argon2 hash.
    async fn verify_moderator_password(&self, password: &str) -> bool {
        verify_against(self.moderator_hash.as_deref(), password)
    }

    async fn verify_intake_key(&self, key: &str) -> bool {
        verify_against(self.intake_hash.as_deref(), key)
    }
}

/// Produces a PHC string suitable for `auth.moderator_password_hash` or
/// `auth.intake_key_hash`.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("could not hash password: {e}"))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter(id: UserId, handle: Option<&str>) -> Submitter {
        Submitter {
            id,
            name: "Someone".into(),
            handle: handle.map(str::to_string),
        }
    }

    #[test]
    fn privilege_by_id_or_handle() {
        let auth = StaticAuthProvider::new(["@EditorDesk"], [1001]);
        assert!(auth.is_privileged(&submitter(1001, None)));
        assert!(auth.is_privileged(&submitter(5, Some("editordesk"))));
        assert!(!auth.is_privileged(&submitter(5, Some("reader"))));
        assert!(!auth.is_privileged(&submitter(5, None)));
    }

    #[tokio::test]
    async fn moderator_password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        let auth = StaticAuthProvider::new(Vec::<String>::new(), []).with_moderator_hash(hash);
        assert!(auth.verify_moderator_password("hunter2").await);
        assert!(!auth.verify_moderator_password("hunter3").await);
    }

    #[tokio::test]
    async fn missing_or_broken_hash_refuses_everything() {
        let auth = StaticAuthProvider::new(Vec::<String>::new(), []);
        assert!(!auth.verify_moderator_password("").await);
        assert!(!auth.verify_intake_key("").await);
        let auth = auth.with_moderator_hash("not-a-phc-string");
        assert!(!auth.verify_moderator_password("anything").await);
    }

    #[tokio::test]
    async fn intake_key_is_separate_from_the_moderator_password() {
        let auth = StaticAuthProvider::new(Vec::<String>::new(), [])
            .with_moderator_hash(hash_password("moderate").unwrap())
            .with_intake_hash(hash_password("relay").unwrap());
        assert!(auth.verify_intake_key("relay").await);
        assert!(!auth.verify_intake_key("moderate").await);
        assert!(!auth.verify_moderator_password("relay").await);
    }
}
