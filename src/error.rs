//! Error types shared by the ToolShare client.
//!
//! Every failure the client can observe falls into one of the variants of
//! [`ClientError`]. Form validation failures are collected per field by
//! [`ValidationErrors`] so that all problems with a form are reported at once.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Errors surfaced by the API client, the session store and the mutation handlers.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("Connection failed: {0}")]
    Transport(String),

    /// The backend rejected the credential (401/403).
    #[error("Not authorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The backend answered with any other non-success status.
    #[error("Server returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Image upload failed: {0}")]
    Upload(String),
}

impl ClientError {
    /// True for 401/403 answers from the backend.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    /// HTTP status, when the failure came from a backend response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized { status, .. } | ClientError::Backend { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Message to show the user: the backend's own message when it sent one,
    /// validation details for form errors, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Backend { message, .. } | ClientError::Unauthorized { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            ClientError::Validation(errors) => errors.to_string(),
            ClientError::NotAuthenticated => self.to_string(),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Field-level validation failures for a single form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. A field may collect several messages.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a single-field check, if any.
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Messages recorded for `field`.
    pub fn field(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// `Ok(())` when nothing was recorded.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            if let Some(message) = self.errors.values().next().and_then(|v| v.first()) {
                return write!(f, "{}", message);
            }
        }

        write!(f, "Validation failed for {} fields", self.errors.len())?;
        for (field, messages) in &self.errors {
            write!(f, "\n  {}: {}", field, messages.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
