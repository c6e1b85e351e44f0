//! Client session lifecycle.
//!
//! [`SessionStore`] is the single owner of the signed-in identity. It is
//! constructed explicitly, handed to fetchers and mutation handlers, and
//! publishes every transition on a watch channel.
//!
//! ```text
//! Loading ──initialize──▶ LoggedOut ──sign_in──▶ Loading ──ok──▶ LoggedIn
//!                                       ▲                  └─err─▶ LoggedOut
//!                                       └──────── sign_out ◀──────────┘
//! ```

pub mod persist;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::BearerToken;
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::models::{UserId, UserProfile};
use crate::validation::validate_login_form;

pub use persist::{PersistError, SessionFile};

/// Login form input.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token and profile issued by the backend on sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSession {
    pub token: BearerToken,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Session {
    LoggedOut,
    #[default]
    Loading,
    LoggedIn(AuthenticatedSession),
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self {
            Session::LoggedOut => SessionStatus::Unauthenticated,
            Session::Loading => SessionStatus::Loading,
            Session::LoggedIn(_) => SessionStatus::Authenticated,
        }
    }

    pub fn token(&self) -> Option<&BearerToken> {
        match self {
            Session::LoggedIn(s) => Some(&s.token),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Session::LoggedIn(s) => Some(&s.user),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Loading,
    Authenticated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Unauthenticated => f.write_str("unauthenticated"),
            SessionStatus::Loading => f.write_str("loading"),
            SessionStatus::Authenticated => f.write_str("authenticated"),
        }
    }
}

/// Exchanges credentials for a backend-issued session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthenticatedSession, ClientError>;
}

pub struct SessionStore {
    state: watch::Sender<Session>,
    authenticator: Arc<dyn Authenticator>,
    persistence: Option<SessionFile>,
    logout_on_unauthorized: bool,
}

impl SessionStore {
    /// A store in `Loading`, with no persistence. Call [`initialize`](Self::initialize)
    /// to settle the initial state.
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        let (state, _) = watch::channel(Session::Loading);
        Self {
            state,
            authenticator,
            persistence: None,
            logout_on_unauthorized: false,
        }
    }

    pub fn from_config(authenticator: Arc<dyn Authenticator>, config: &SessionConfig) -> Self {
        let mut store = Self::new(authenticator).logout_on_unauthorized(config.logout_on_unauthorized);
        store.persistence = SessionFile::from_config(config);
        store
    }

    pub fn with_persistence(mut self, file: SessionFile) -> Self {
        self.persistence = Some(file);
        self
    }

    pub fn logout_on_unauthorized(mut self, enabled: bool) -> Self {
        self.logout_on_unauthorized = enabled;
        self
    }

    fn publish(&self, session: Session) {
        let status = session.status();
        let previous = self.state.send_replace(session);
        if previous.status() != status {
            debug!(from = %previous.status(), to = %status, "Session transition");
        }
    }

    /// Restore a persisted session if one is available and valid.
    pub fn initialize(&self) -> SessionStatus {
        let restored = match &self.persistence {
            None => None,
            Some(file) => match file.load() {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %file.path().display(), error = %e, "Discarding persisted session");
                    if let Err(e) = file.remove() {
                        warn!(error = %e, "Failed to remove persisted session");
                    }
                    None
                }
            },
        };

        match restored {
            Some(session) => {
                info!(user_id = %session.user.id, "Session restored");
                self.publish(Session::LoggedIn(session));
            }
            None => self.publish(Session::LoggedOut),
        }
        self.status()
    }

    /// Validate the login form, then exchange the credentials for a session.
    ///
    /// Invalid input leaves the state untouched. A rejected exchange ends in
    /// `LoggedOut` with nothing stored.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<UserProfile, ClientError> {
        validate_login_form(&credentials)?;

        self.publish(Session::Loading);
        match self.authenticator.authenticate(&credentials).await {
            Ok(session) => {
                if let Some(file) = &self.persistence {
                    if let Err(e) = file.save(&session) {
                        warn!(error = %e, "Failed to persist session");
                    }
                }
                info!(user_id = %session.user.id, "Signed in");
                let user = session.user.clone();
                self.publish(Session::LoggedIn(session));
                Ok(user)
            }
            Err(e) => {
                warn!(email = %credentials.email, error = %e, "Sign-in failed");
                self.clear_persisted();
                self.publish(Session::LoggedOut);
                Err(e)
            }
        }
    }

    /// Drop the local token and profile. Nothing is revoked server-side.
    pub fn sign_out(&self) {
        self.clear_persisted();
        if self.status() == SessionStatus::Authenticated {
            info!("Signed out");
        }
        self.publish(Session::LoggedOut);
    }

    fn clear_persisted(&self) {
        if let Some(file) = &self.persistence {
            if let Err(e) = file.remove() {
                warn!(error = %e, "Failed to remove persisted session");
            }
        }
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    pub fn token(&self) -> Option<BearerToken> {
        self.state.borrow().token().cloned()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user().cloned()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state.borrow().user().map(|u| u.id)
    }

    /// The active session, or [`ClientError::NotAuthenticated`].
    pub fn require(&self) -> Result<AuthenticatedSession, ClientError> {
        match &*self.state.borrow() {
            Session::LoggedIn(session) => Ok(session.clone()),
            _ => Err(ClientError::NotAuthenticated),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Handle a failed backend call made with `token`. Returns true when the
    /// failure ended the session. Failures for a token that has since been
    /// replaced are ignored.
    pub fn report_unauthorized(&self, error: &ClientError, token: &BearerToken) -> bool {
        if !error.is_unauthorized() {
            return false;
        }
        if self.token().as_ref() != Some(token) {
            debug!(status = ?error.status(), "Ignoring authorization failure for a replaced token");
            return false;
        }

        if self.logout_on_unauthorized {
            warn!(status = ?error.status(), "Backend rejected the session token, signing out");
            self.sign_out();
            true
        } else {
            warn!(status = ?error.status(), "Backend rejected the session token");
            false
        }
    }

    /// Tear the store down. Subscribers observe `LoggedOut` and then a closed
    /// channel. The persisted session is left in place.
    pub fn dispose(self) {
        self.publish(Session::LoggedOut);
        debug!("Session store disposed");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::api::mock::ScriptedTransport;
    use crate::api::{ApiClient, Method};

    #[tokio::test]
    async fn test_new_store_is_loading_until_initialized() {
        let store = SessionStore::new(Arc::new(StaticAuthenticator::new(1)));
        assert_eq!(store.status(), SessionStatus::Loading);
        assert_eq!(store.initialize(), SessionStatus::Unauthenticated);
    }

    struct GatedAuthenticator {
        inner: StaticAuthenticator,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl Authenticator for GatedAuthenticator {
        async fn authenticate(&self, credentials: &Credentials) -> Result<AuthenticatedSession, ClientError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            self.inner.authenticate(credentials).await
        }
    }

    #[tokio::test]
    async fn test_valid_sign_in_passes_through_loading() {
        let auth = Arc::new(GatedAuthenticator {
            inner: StaticAuthenticator::new(5),
            gate: tokio::sync::Semaphore::new(0),
        });
        let store = Arc::new(SessionStore::new(auth.clone()));
        store.initialize();

        let pending = tokio::spawn({
            let store = store.clone();
            let credentials = auth.inner.credentials();
            async move { store.sign_in(credentials).await }
        });
        while store.status() != SessionStatus::Loading {
            tokio::task::yield_now().await;
        }
        assert!(store.token().is_none());

        auth.gate.add_permits(1);
        let user = pending.await.unwrap().unwrap();
        assert_eq!(user.id, UserId(5));
        assert_eq!(store.status(), SessionStatus::Authenticated);
        assert_eq!(store.token().unwrap().as_str(), "token-5");
    }

    #[tokio::test]
    async fn test_sign_in_token_is_attached_to_later_requests() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Post,
            "/session",
            200,
            r#"{"id": 9, "name": "Caio", "email": "caio@example.com", "token": "abc.def"}"#,
        );
        transport.respond(Method::Get, "/tool", 200, r#"{"tools": []}"#);

        let client = ApiClient::new(transport.clone());
        let store = SessionStore::new(Arc::new(client.clone()));
        store.initialize();

        store
            .sign_in(Credentials::new("caio@example.com", "pw"))
            .await
            .unwrap();
        assert_eq!(store.user_id(), Some(UserId(9)));

        let token = store.token().unwrap();
        client.list_tools(&token).await.unwrap();

        let sent = transport.requests();
        assert!(sent[0].bearer.is_none());
        assert_eq!(sent[1].bearer.as_ref().unwrap().header_value(), "Bearer abc.def");
    }

    #[tokio::test]
    async fn test_invalid_sign_in_stays_logged_out() {
        let auth = Arc::new(StaticAuthenticator::new(5));
        let store = SessionStore::new(auth.clone());
        store.initialize();

        let err = store
            .sign_in(Credentials::new(auth.email.clone(), "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message("Login failed"), "Invalid credentials");
        assert_eq!(store.status(), SessionStatus::Unauthenticated);
        assert!(store.token().is_none());
        assert!(store.user().is_none());
    }

    #[tokio::test]
    async fn test_malformed_form_sends_nothing() {
        let auth = Arc::new(StaticAuthenticator::new(5));
        let store = SessionStore::new(auth.clone());
        store.initialize();

        let err = store
            .sign_in(Credentials::new("not-an-email", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(*auth.calls.lock(), 0);
        assert_eq!(store.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let store = signed_in_store(3).await;
        store.sign_out();
        assert_eq!(store.status(), SessionStatus::Unauthenticated);
        assert!(matches!(store.require(), Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_persisted_session_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let auth = Arc::new(StaticAuthenticator::new(4));

        let first = SessionStore::new(auth.clone()).with_persistence(SessionFile::new(
            &path,
            "secret",
            chrono::Duration::hours(1),
        ));
        first.initialize();
        first.sign_in(auth.credentials()).await.unwrap();

        let second = SessionStore::new(auth.clone()).with_persistence(SessionFile::new(
            &path,
            "secret",
            chrono::Duration::hours(1),
        ));
        assert_eq!(second.initialize(), SessionStatus::Authenticated);
        assert_eq!(second.token().unwrap().as_str(), "token-4");

        second.sign_out();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_tampered_persisted_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let auth = Arc::new(StaticAuthenticator::new(4));
        let file = || SessionFile::new(&path, "secret", chrono::Duration::hours(1));

        let first = SessionStore::new(auth.clone()).with_persistence(file());
        first.initialize();
        first.sign_in(auth.credentials()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("Ana", "Eve")).unwrap();

        let second = SessionStore::new(auth).with_persistence(file());
        assert_eq!(second.initialize(), SessionStatus::Unauthenticated);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_report_unauthorized_respects_flag() {
        let unauthorized = ClientError::Unauthorized {
            status: 401,
            message: "jwt expired".to_string(),
        };

        let lenient = signed_in_store(1).await;
        let token = lenient.token().unwrap();
        assert!(!lenient.report_unauthorized(&unauthorized, &token));
        assert_eq!(lenient.status(), SessionStatus::Authenticated);

        let strict = signed_in_store(1).await.logout_on_unauthorized(true);
        let token = strict.token().unwrap();
        let backend = ClientError::Backend {
            status: 500,
            message: String::new(),
        };
        assert!(!strict.report_unauthorized(&backend, &token));
        assert!(strict.report_unauthorized(&unauthorized, &token));
        assert_eq!(strict.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_unauthorized_for_replaced_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let auth = Arc::new(StaticAuthenticator::new(6));
        let store = SessionStore::new(auth.clone())
            .with_persistence(SessionFile::new(&path, "secret", chrono::Duration::hours(1)))
            .logout_on_unauthorized(true);
        store.initialize();

        store.sign_in(auth.credentials()).await.unwrap();
        let old = store.token().unwrap();
        store.sign_out();
        store.sign_in(auth.credentials()).await.unwrap();
        let current = store.token().unwrap();
        assert_ne!(old, current);

        let unauthorized = ClientError::Unauthorized {
            status: 401,
            message: "jwt expired".to_string(),
        };
        assert!(!store.report_unauthorized(&unauthorized, &old));
        assert_eq!(store.token(), Some(current));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_dispose_closes_subscriptions() {
        let store = signed_in_store(2).await;
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.dispose();
        assert!(rx.has_changed().unwrap_or(true));
        assert_eq!(rx.borrow_and_update().status(), SessionStatus::Unauthenticated);
        assert!(rx.changed().await.is_err());
    }
}
