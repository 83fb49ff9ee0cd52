//! Credential manager: signup / signin and the salted secret encoding.
//!
//! Stored secrets look like `<salt>.<hash>`:
//! - salt: 8 random bytes from the OS RNG, hex encoded (16 chars), one per identity
//! - hash: Argon2id(plaintext, salt) with a fixed 32-byte output, hex encoded
//!
//! The plaintext only lives for the duration of the derivation and is never
//! stored or logged.
use std::{fmt, sync::Arc};

use argon2::{Algorithm, Argon2, Params, Version};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::repos::{
    RepoError, UserRow, UserStore,
    user_repo::{NewUser, UserChanges},
};

pub const SALT_LEN: usize = 8;
pub const HASH_LEN: usize = 32;
/// Derivations allowed on the blocking pool at once; the rest wait.
pub const DEFAULT_MAX_CONCURRENT_DERIVATIONS: usize = 4;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("email already in use")]
    DuplicateIdentity,
    #[error("user not found")]
    IdentityNotFound,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("store error: {0}")]
    Store(#[from] RepoError),
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// Argon2 cost parameters. Output length is fixed at [`HASH_LEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Rejects combinations argon2 would refuse at hash time.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, CredentialError> {
        let params = Self {
            memory_kib,
            iterations,
            parallelism,
        };
        params.argon2()?;
        Ok(params)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, CredentialError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(HASH_LEN),
        )
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// `salt.hash` as persisted in `users.password`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretEncoding {
    pub salt: String,
    pub hash: String,
}

impl SecretEncoding {
    pub fn parse(encoded: &str) -> Option<Self> {
        let (salt, hash) = encoded.split_once('.')?;
        if salt.is_empty() || hash.is_empty() {
            return None;
        }
        Some(Self {
            salt: salt.to_string(),
            hash: hash.to_string(),
        })
    }
}

impl fmt::Display for SecretEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.salt, self.hash)
    }
}

impl fmt::Debug for SecretEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEncoding").finish_non_exhaustive()
    }
}

pub fn generate_salt() -> Result<String, CredentialError> {
    let mut bytes = [0u8; SALT_LEN];
    getrandom::fill(&mut bytes).map_err(|e| CredentialError::Kdf(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Deterministic for a given (plaintext, salt, params). CPU and memory heavy:
/// call through [`CredentialManager`] so it runs on the blocking pool.
pub fn derive_hash(params: &KdfParams, plaintext: &[u8], salt: &str) -> Result<String, CredentialError> {
    let mut out = [0u8; HASH_LEN];
    params
        .argon2()?
        .hash_password_into(plaintext, salt.as_bytes(), &mut out)
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;
    Ok(hex::encode(out))
}

#[derive(Clone)]
pub struct CredentialManager {
    users: Arc<dyn UserStore>,
    kdf: KdfParams,
    admin_emails: Arc<[String]>,
    derivations: Arc<Semaphore>,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("kdf", &self.kdf)
            .field("admin_emails", &self.admin_emails.len())
            .field("derivation_permits", &self.derivations.available_permits())
            .finish()
    }
}

impl CredentialManager {
    pub fn new(users: Arc<dyn UserStore>, kdf: KdfParams, admin_emails: Vec<String>) -> Self {
        Self {
            users,
            kdf,
            admin_emails: admin_emails.into(),
            derivations: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_DERIVATIONS)),
        }
    }

    /// Cap on concurrent Argon2 runs. Each one holds `kdf.memory_kib` of memory
    /// and a blocking thread. `0` is treated as `1`.
    pub fn with_max_concurrent_derivations(mut self, max: usize) -> Self {
        self.derivations = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Create a new identity.
    ///
    /// The duplicate check and the insert are two separate store calls, so two
    /// concurrent signups for the same email can both pass the check. The
    /// store's UNIQUE constraint catches the loser, whose `Conflict` is
    /// reported here as `DuplicateIdentity`.
    pub async fn signup(&self, email: &str, plaintext: String) -> Result<UserRow, CredentialError> {
        if !self.users.find_by_email(email).await?.is_empty() {
            return Err(CredentialError::DuplicateIdentity);
        }

        let password = self.encode_secret(plaintext).await?;
        let admin = self.admin_emails.iter().any(|a| a == email);

        let user = self
            .users
            .insert(NewUser {
                email,
                password: &password,
                admin,
            })
            .await
            .map_err(|e| match e {
                RepoError::Conflict => CredentialError::DuplicateIdentity,
                other => CredentialError::Store(other),
            })?;

        tracing::info!(user_id = user.id, admin = user.admin, "signed up");
        Ok(user)
    }

    pub async fn signin(&self, email: &str, plaintext: String) -> Result<UserRow, CredentialError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .into_iter()
            .next()
            .ok_or(CredentialError::IdentityNotFound)?;

        let Some(stored) = SecretEncoding::parse(&user.password) else {
            tracing::warn!(user_id = user.id, "stored secret is not a salt.hash encoding");
            return Err(CredentialError::InvalidCredential);
        };

        let derived = self.derive(plaintext, stored.salt.clone()).await?;
        if !bool::from(derived.as_bytes().ct_eq(stored.hash.as_bytes())) {
            return Err(CredentialError::InvalidCredential);
        }

        tracing::info!(user_id = user.id, "signed in");
        Ok(user)
    }

    /// Fresh salt + derivation, composed as `salt.hash`.
    pub async fn encode_secret(&self, plaintext: String) -> Result<String, CredentialError> {
        let salt = generate_salt()?;
        let hash = self.derive(plaintext, salt.clone()).await?;
        Ok(SecretEncoding { salt, hash }.to_string())
    }

    /// Update an identity, re-encoding the secret when a new one is given.
    pub async fn update(
        &self,
        id: i64,
        email: Option<&str>,
        plaintext: Option<String>,
        admin: Option<bool>,
    ) -> Result<Option<UserRow>, CredentialError> {
        let password = match plaintext {
            Some(p) => Some(self.encode_secret(p).await?),
            None => None,
        };

        self.users
            .update(id, UserChanges {
                email,
                password: password.as_deref(),
                admin,
            })
            .await
            .map_err(|e| match e {
                RepoError::Conflict => CredentialError::DuplicateIdentity,
                other => CredentialError::Store(other),
            })
    }

    async fn derive(&self, plaintext: String, salt: String) -> Result<String, CredentialError> {
        let kdf = self.kdf;
        let permit = self
            .derivations
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CredentialError::Kdf(e.to_string()))?;

        // held by the task, not this future
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            derive_hash(&kdf, plaintext.as_bytes(), &salt)
        })
        .await
        .map_err(|e| CredentialError::Kdf(e.to_string()))?
    }
}
