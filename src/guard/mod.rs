//! Navigation guard.
//!
//! Every page is classified by a [`PathPolicy`]; the [`RouteGuard`] combines
//! that with the current session status to allow the navigation or redirect it.

use std::sync::Arc;

use tracing::debug;

use crate::session::{SessionStatus, SessionStore};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const MY_TOOLS_PATH: &str = "/minhas-ferramentas";
pub const MY_RESERVATIONS_PATH: &str = "/minhas-reservas";
pub const TOOL_PATH_PREFIX: &str = "/tool";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Only meaningful without a session (landing, login, register).
    PublicOnly,
    Protected,
    Open,
}

pub trait PathPolicy: Send + Sync {
    fn classify(&self, path: &str) -> PathKind;
}

/// Source of the current session status.
pub trait SessionStatusSource {
    fn session_status(&self) -> SessionStatus;
}

impl SessionStatusSource for SessionStore {
    fn session_status(&self) -> SessionStatus {
        self.status()
    }
}

impl SessionStatusSource for SessionStatus {
    fn session_status(&self) -> SessionStatus {
        *self
    }
}

impl<T: SessionStatusSource + ?Sized> SessionStatusSource for Arc<T> {
    fn session_status(&self) -> SessionStatus {
        (**self).session_status()
    }
}

impl<T: SessionStatusSource + ?Sized> SessionStatusSource for &T {
    fn session_status(&self) -> SessionStatus {
        (**self).session_status()
    }
}

/// Strip the query string, fragment and trailing slashes.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        HOME_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// The marketplace's page layout.
#[derive(Debug, Clone)]
pub struct MarketplacePaths {
    public_only: Vec<String>,
    protected: Vec<String>,
}

impl Default for MarketplacePaths {
    fn default() -> Self {
        Self {
            public_only: vec![
                HOME_PATH.to_string(),
                LOGIN_PATH.to_string(),
                REGISTER_PATH.to_string(),
            ],
            protected: vec![
                DASHBOARD_PATH.to_string(),
                MY_TOOLS_PATH.to_string(),
                MY_RESERVATIONS_PATH.to_string(),
                TOOL_PATH_PREFIX.to_string(),
            ],
        }
    }
}

impl PathPolicy for MarketplacePaths {
    fn classify(&self, path: &str) -> PathKind {
        let path = normalize_path(path);
        if self.public_only.iter().any(|p| *p == path) {
            PathKind::PublicOnly
        } else if self.protected.iter().any(|p| is_under(&path, p)) {
            PathKind::Protected
        } else {
            PathKind::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(String),
}

impl Navigation {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Navigation::Allow)
    }
}

pub struct RouteGuard<P, S> {
    policy: P,
    source: S,
}

impl<S: SessionStatusSource> RouteGuard<MarketplacePaths, S> {
    pub fn for_marketplace(source: S) -> Self {
        Self::new(MarketplacePaths::default(), source)
    }
}

impl<P: PathPolicy, S: SessionStatusSource> RouteGuard<P, S> {
    pub fn new(policy: P, source: S) -> Self {
        Self { policy, source }
    }

    /// Decide a navigation to `target`. `Loading` counts as not signed in.
    pub fn navigate(&self, target: &str) -> Navigation {
        let status = self.source.session_status();
        let decision = match (self.policy.classify(target), status) {
            (PathKind::PublicOnly, SessionStatus::Authenticated) => {
                Navigation::Redirect(DASHBOARD_PATH.to_string())
            }
            (PathKind::Protected, SessionStatus::Authenticated) => Navigation::Allow,
            (PathKind::Protected, _) => Navigation::Redirect(LOGIN_PATH.to_string()),
            _ => Navigation::Allow,
        };

        debug!(target = %target, status = %status, decision = ?decision, "Route guard");
        decision
    }
}

/// Path of the detail page for a tool.
pub fn tool_path(id: impl std::fmt::Display) -> String {
    format!("{}/{}", TOOL_PATH_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(status: SessionStatus) -> RouteGuard<MarketplacePaths, SessionStatus> {
        RouteGuard::for_marketplace(status)
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/dashboard/"), "/dashboard");
        assert_eq!(normalize_path("/login?next=/dashboard"), "/login");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/?q=1"), "/");
        assert_eq!(normalize_path("tool/3"), "/tool/3");
    }

    #[test]
    fn test_classification() {
        let paths = MarketplacePaths::default();
        assert_eq!(paths.classify("/"), PathKind::PublicOnly);
        assert_eq!(paths.classify("/register/"), PathKind::PublicOnly);
        assert_eq!(paths.classify("/tool/12"), PathKind::Protected);
        assert_eq!(paths.classify("/minhas-reservas?tab=received"), PathKind::Protected);
        assert_eq!(paths.classify("/toolbox"), PathKind::Open);
        assert_eq!(paths.classify("/chat"), PathKind::Open);
    }

    #[test]
    fn test_protected_redirects_without_session() {
        for status in [SessionStatus::Unauthenticated, SessionStatus::Loading] {
            for path in ["/dashboard", "/minhas-ferramentas", "/minhas-reservas", "/tool/7"] {
                assert_eq!(
                    guard(status).navigate(path),
                    Navigation::Redirect(LOGIN_PATH.to_string()),
                    "{} while {}",
                    path,
                    status
                );
            }
        }
        assert!(guard(SessionStatus::Authenticated).navigate("/tool/7").is_allowed());
    }

    #[test]
    fn test_public_only_redirects_with_session() {
        let signed_in = guard(SessionStatus::Authenticated);
        for path in ["/", "/login", "/register"] {
            assert_eq!(
                signed_in.navigate(path),
                Navigation::Redirect(DASHBOARD_PATH.to_string())
            );
        }
        assert!(guard(SessionStatus::Unauthenticated).navigate("/login").is_allowed());
        assert!(guard(SessionStatus::Loading).navigate("/register").is_allowed());
    }

    #[tokio::test]
    async fn test_guard_follows_store() {
        let store = Arc::new(crate::session::testing::signed_in_store(1).await);
        let guard = RouteGuard::for_marketplace(store.clone());
        assert!(guard.navigate("/dashboard").is_allowed());

        store.sign_out();
        assert_eq!(guard.navigate("/dashboard"), Navigation::Redirect(LOGIN_PATH.to_string()));
        assert_eq!(guard.navigate(&tool_path(4)), Navigation::Redirect(LOGIN_PATH.to_string()));
    }
}
