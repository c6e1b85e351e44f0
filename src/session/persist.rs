//! Signed on-disk session.
//!
//! The file holds the serialized session next to an HMAC-SHA256 signature of
//! it, keyed with the configured session secret. A file that fails
//! verification or is older than the maximum age is rejected.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use super::AuthenticatedSession;
use crate::api::BearerToken;
use crate::config::SessionConfig;
use crate::models::UserProfile;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed session file: {0}")]
    Malformed(String),

    #[error("Session signature mismatch")]
    BadSignature,

    #[error("Session expired (issued {0})")]
    Expired(DateTime<Utc>),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    payload: String,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    token: String,
    user: UserProfile,
    issued_at: DateTime<Utc>,
}

pub struct SessionFile {
    path: PathBuf,
    secret: String,
    max_age: Duration,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>, secret: impl Into<String>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            secret: secret.into(),
            max_age,
        }
    }

    /// `None` when no secret is configured.
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        let secret = config.secret.as_ref().filter(|s| !s.is_empty())?;
        Some(Self::new(&config.store_path, secret.clone(), config.max_age()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sign(&self, payload: &str) -> Result<String, PersistError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PersistError::Malformed(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, payload: &str, signature: &str) -> bool {
        let expected = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(payload.as_bytes());

        mac.verify_slice(&expected).is_ok()
    }

    pub fn save(&self, session: &AuthenticatedSession) -> Result<(), PersistError> {
        self.save_at(session, Utc::now())
    }

    /// Write the session atomically, replacing any previous file.
    pub fn save_at(
        &self,
        session: &AuthenticatedSession,
        issued_at: DateTime<Utc>,
    ) -> Result<(), PersistError> {
        let stored = StoredSession {
            token: session.token.as_str().to_string(),
            user: session.user.clone(),
            issued_at,
        };
        let payload =
            serde_json::to_string(&stored).map_err(|e| PersistError::Malformed(e.to_string()))?;
        let envelope = Envelope {
            signature: self.sign(&payload)?,
            payload,
        };
        let content = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| PersistError::Malformed(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut file, &content)?;
        file.persist(&self.path).map_err(|e| PersistError::Io(e.error))?;

        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Option<AuthenticatedSession>, PersistError> {
        self.load_at(Utc::now())
    }

    /// Read and verify the session file. A missing file is `Ok(None)`.
    pub fn load_at(&self, now: DateTime<Utc>) -> Result<Option<AuthenticatedSession>, PersistError> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope =
            serde_json::from_slice(&content).map_err(|e| PersistError::Malformed(e.to_string()))?;
        if !self.verify(&envelope.payload, &envelope.signature) {
            return Err(PersistError::BadSignature);
        }

        let stored: StoredSession = serde_json::from_str(&envelope.payload)
            .map_err(|e| PersistError::Malformed(e.to_string()))?;
        // an expiry past the representable range never expires
        match stored.issued_at.checked_add_signed(self.max_age) {
            Some(expires_at) if expires_at < now => {
                return Err(PersistError::Expired(stored.issued_at));
            }
            _ => {}
        }
        if stored.token.is_empty() {
            return Err(PersistError::Malformed("empty token".to_string()));
        }

        Ok(Some(AuthenticatedSession {
            token: BearerToken::new(stored.token),
            user: stored.user,
        }))
    }

    /// Delete the file if present.
    pub fn remove(&self) -> Result<(), PersistError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
