//! The `users.json` password table: existence checks, registration, and verification.

use crate::error::{Error, ErrorKind, Result};
use argon2::{Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::SaltString;
use rand_core::OsRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Memory cost in KiB, chosen to approximate libsodium's `MEMLIMIT_INTERACTIVE`.
const ARGON2_MEM_COST_KIB: u32 = 19 * 1024;
/// Iteration count, chosen to approximate libsodium's `OPSLIMIT_INTERACTIVE`.
const ARGON2_TIME_COST: u32 = 2;
/// Degree of parallelism; single-threaded like the interactive libsodium profile.
const ARGON2_PARALLELISM: u32 = 1;

/// The persistent user table, backed by a single JSON object file under the server root.
pub struct Credentials {
    path: PathBuf,
    users: Mutex<HashMap<String, String>>,
}

impl Credentials {
    /// Loads `<root>/users.json`, creating an empty table if the file doesn't exist yet.
    pub async fn load(root: &Path) -> Result<Self> {
        let path = root.join("users.json");
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "malformed users.json", e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::with_source(ErrorKind::FileOpenFailed, "failed to read users.json", e)),
        };
        Ok(Credentials {
            path,
            users: Mutex::new(users),
        })
    }

    /// Whether `user` has a registered password hash.
    pub async fn exists(&self, user: &str) -> bool {
        self.users.lock().await.contains_key(user)
    }

    /// Registers a new user with the given password, hashing it with Argon2id. Fails with
    /// [`ErrorKind::UserExists`] if the username is already taken.
    pub async fn register(&self, user: &str, password: &str) -> Result<()> {
        let mut users = self.users.lock().await;
        if users.contains_key(user) {
            return Err(Error::from(ErrorKind::UserExists));
        }
        let hash = hash_password(password)?;
        users.insert(user.to_string(), hash);
        self.persist(&users).await?;
        info!(username = user, "registered new user");
        Ok(())
    }

    /// Verifies `password` against the stored hash for `user`. Returns `false` for unknown
    /// users rather than distinguishing the two failure modes, so callers can't use timing or
    /// error-shape differences to enumerate usernames.
    pub async fn verify(&self, user: &str, password: &str) -> Result<bool> {
        let users = self.users.lock().await;
        let Some(hash) = users.get(user) else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(hash).map_err(|e| Error::with_source(ErrorKind::AuthenticationFailed, "stored hash is malformed", e))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    }

    async fn persist(&self, users: &HashMap<String, String>) -> Result<()> {
        let body = serde_json::to_vec_pretty(users).expect("HashMap<String, String> always serializes");
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed writing users.json.tmp", e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed renaming users.json.tmp into place", e))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let params = Params::new(ARGON2_MEM_COST_KIB, ARGON2_TIME_COST, ARGON2_PARALLELISM, None)
        .map_err(|e| Error::with_source(ErrorKind::AuthenticationFailed, "invalid argon2 parameters", e))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::with_source(ErrorKind::AuthenticationFailed, "failed hashing password", e))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn registers_and_verifies_a_new_user() {
        let dir = tempdir().unwrap();
        let creds = Credentials::load(dir.path()).await.unwrap();
        assert!(!creds.exists("alice").await);
        creds.register("alice", "hunter2").await.unwrap();
        assert!(creds.exists("alice").await);
        assert!(creds.verify("alice", "hunter2").await.unwrap());
        assert!(!creds.verify("alice", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn refuses_to_register_an_existing_user_twice() {
        let dir = tempdir().unwrap();
        let creds = Credentials::load(dir.path()).await.unwrap();
        creds.register("alice", "hunter2").await.unwrap();
        let err = creds.register("alice", "other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserExists);
    }

    #[tokio::test]
    async fn verify_of_unknown_user_is_false_not_an_error() {
        let dir = tempdir().unwrap();
        let creds = Credentials::load(dir.path()).await.unwrap();
        assert!(!creds.verify("ghost", "whatever").await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reload() {
        let dir = tempdir().unwrap();
        {
            let creds = Credentials::load(dir.path()).await.unwrap();
            creds.register("alice", "hunter2").await.unwrap();
        }
        let reloaded = Credentials::load(dir.path()).await.unwrap();
        assert!(reloaded.verify("alice", "hunter2").await.unwrap());
    }
}
