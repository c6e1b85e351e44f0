//! Authenticated polling of backend collections.
//!
//! A [`Poller`] is mounted per view. While the session is signed in it polls
//! its [`CollectionSource`] on a fixed interval, immediately on mount, and
//! whenever the filter or the session token changes. Every poll runs as its
//! own task tagged with an increasing request id, so polls may overlap; how a
//! late response is treated is the configured [`StalePolicy`].

mod sources;
mod store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::BearerToken;
use crate::config::{PollingConfig, StalePolicy};
use crate::error::ClientError;
use crate::session::{Session, SessionStore};

pub use sources::{
    fetch_tool_detail, fetch_user_directory, NotificationsSource, ReservationsSource, ToolDetail,
    ToolsSource,
};
pub use store::{CollectionStore, Snapshot};

/// A backend collection a view can poll.
#[async_trait]
pub trait CollectionSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Filter: Clone + PartialEq + Send + Sync + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        token: &BearerToken,
        filter: &Self::Filter,
    ) -> Result<Vec<Self::Item>, ClientError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub stale_policy: StalePolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            stale_policy: config.stale_policy,
        }
    }
}

/// Issues tagged polls against a source and applies their results.
pub struct PollDriver<S: CollectionSource> {
    source: S,
    store: Arc<CollectionStore<S::Item>>,
    session: Weak<SessionStore>,
    session_rx: watch::Receiver<Session>,
    next_request: AtomicU64,
    policy: StalePolicy,
}

impl<S: CollectionSource> PollDriver<S> {
    pub fn new(
        source: S,
        store: Arc<CollectionStore<S::Item>>,
        session: &Arc<SessionStore>,
        policy: StalePolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            store,
            session: Arc::downgrade(session),
            session_rx: session.subscribe(),
            next_request: AtomicU64::new(0),
            policy,
        })
    }

    pub fn store(&self) -> &Arc<CollectionStore<S::Item>> {
        &self.store
    }

    /// Start one poll with the current token. `None` when signed out.
    pub fn issue(self: &Arc<Self>, filter: S::Filter) -> Option<JoinHandle<()>> {
        let token = self.session_rx.borrow().token().cloned()?;
        Some(self.issue_with(token, filter))
    }

    fn issue_with(self: &Arc<Self>, token: BearerToken, filter: S::Filter) -> JoinHandle<()> {
        let request_id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let driver = Arc::clone(self);

        tokio::spawn(async move {
            let source = driver.source.name();
            let result = driver.source.fetch(&token, &filter).await;

            match &result {
                Ok(items) => debug!(
                    source = source,
                    request_id = request_id,
                    items = items.len(),
                    "Poll completed"
                ),
                Err(e) => {
                    warn!(source = source, request_id = request_id, error = %e, "Poll failed");
                    if let Some(session) = driver.session.upgrade() {
                        session.report_unauthorized(e, &token);
                    }
                }
            }

            driver.store.apply_fetch(request_id, result, driver.policy);
        })
    }
}

/// A mounted view. Polling stops when this is dropped or unmounted.
pub struct Poller<S: CollectionSource> {
    driver: Arc<PollDriver<S>>,
    filter: watch::Sender<S::Filter>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<S: CollectionSource> Poller<S> {
    pub fn mount(
        source: S,
        session: &Arc<SessionStore>,
        filter: S::Filter,
        options: PollOptions,
    ) -> Self {
        let store = Arc::new(CollectionStore::new());
        let driver = PollDriver::new(source, store, session, options.stale_policy);
        let (filter_tx, filter_rx) = watch::channel(filter);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_poll_loop(
            Arc::clone(&driver),
            session.subscribe(),
            filter_rx,
            options.interval,
            cancel.clone(),
        ));

        Self {
            driver,
            filter: filter_tx,
            cancel,
            task: Some(task),
        }
    }

    pub fn store(&self) -> Arc<CollectionStore<S::Item>> {
        Arc::clone(self.driver.store())
    }

    pub fn snapshot(&self) -> Snapshot<S::Item> {
        self.driver.store().snapshot()
    }

    pub fn filter(&self) -> S::Filter {
        self.filter.borrow().clone()
    }

    /// Change the filter. A changed filter triggers an immediate poll.
    pub fn set_filter(&self, filter: S::Filter) {
        self.filter.send_if_modified(|current| {
            if *current == filter {
                false
            } else {
                *current = filter;
                true
            }
        });
    }

    /// Poll once now, outside the interval.
    pub fn refetch(&self) -> Option<JoinHandle<()>> {
        self.driver.issue(self.filter())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling and wait for the loop to exit. In-flight polls still land.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<S: CollectionSource> Drop for Poller<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop<S: CollectionSource>(
    driver: Arc<PollDriver<S>>,
    mut session_rx: watch::Receiver<Session>,
    mut filter_rx: watch::Receiver<S::Filter>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let source = driver.source.name();

    loop {
        let mut token = loop {
            let current = session_rx.borrow_and_update().token().cloned();
            if let Some(token) = current {
                break token;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        debug!(source = source, "Session closed, poller exiting");
                        return;
                    }
                }
            }
        };

        info!(source = source, interval_ms = interval.as_millis() as u64, "Polling started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = source, "Polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let filter = filter_rx.borrow().clone();
                    driver.issue_with(token.clone(), filter);
                }
                changed = filter_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let filter = filter_rx.borrow_and_update().clone();
                    debug!(source = source, "Filter changed");
                    driver.issue_with(token.clone(), filter);
                    ticker.reset();
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        info!(source = source, "Session closed, polling stopped");
                        return;
                    }
                    let next = session_rx.borrow_and_update().token().cloned();
                    match next {
                        Some(next) if next == token => {}
                        Some(next) => {
                            debug!(source = source, "Session token changed");
                            token = next;
                            let filter = filter_rx.borrow().clone();
                            driver.issue_with(token.clone(), filter);
                            ticker.reset();
                        }
                        None => {
                            info!(source = source, "Signed out, polling paused");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::ScriptedTransport;
    use crate::api::{ApiClient, Method};
    use crate::session::testing::{signed_in_store, StaticAuthenticator};
    use crate::session::{Credentials, SessionStatus};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    const TICK: Duration = Duration::from_millis(1000);

    fn options(policy: StalePolicy) -> PollOptions {
        PollOptions {
            interval: TICK,
            stale_policy: policy,
        }
    }

    #[derive(Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        filters: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl CollectionSource for CountingSource {
        type Item = usize;
        type Filter = u32;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self, _token: &BearerToken, filter: &u32) -> Result<Vec<usize>, ClientError> {
            self.filters.lock().push(*filter);
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![n])
        }
    }

    /// Each poll waits for the response released for its filter value.
    struct GatedSource {
        gates: Mutex<HashMap<u32, oneshot::Receiver<Vec<&'static str>>>>,
    }

    #[async_trait]
    impl CollectionSource for GatedSource {
        type Item = &'static str;
        type Filter = u32;

        fn name(&self) -> &'static str {
            "gated"
        }

        async fn fetch(
            &self,
            _token: &BearerToken,
            filter: &u32,
        ) -> Result<Vec<&'static str>, ClientError> {
            let gate = self.gates.lock().remove(filter);
            match gate {
                Some(rx) => rx.await.map_err(|e| ClientError::Transport(e.to_string())),
                None => Err(ClientError::Transport("no gate".to_string())),
            }
        }
    }

    /// Issue two polls, then resolve the later one first.
    async fn overlapping_polls(policy: StalePolicy) -> Vec<&'static str> {
        let session = Arc::new(signed_in_store(1).await);
        let (early_tx, early_rx) = oneshot::channel();
        let (late_tx, late_rx) = oneshot::channel();
        let source = GatedSource {
            gates: Mutex::new([(1, early_rx), (2, late_rx)].into_iter().collect()),
        };
        let driver = PollDriver::new(source, Arc::new(CollectionStore::new()), &session, policy);

        let earlier = driver.issue(1).unwrap();
        let later = driver.issue(2).unwrap();

        late_tx.send(vec!["fresh"]).unwrap();
        later.await.unwrap();
        early_tx.send(vec!["stale"]).unwrap();
        earlier.await.unwrap();

        driver.store().items()
    }

    #[tokio::test]
    async fn test_last_write_wins_applies_late_stale_response() {
        assert_eq!(overlapping_polls(StalePolicy::LastWriteWins).await, vec!["stale"]);
    }

    #[tokio::test]
    async fn test_discard_stale_keeps_newer_response() {
        assert_eq!(overlapping_polls(StalePolicy::DiscardStale).await, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_issue_requires_session() {
        let session = Arc::new(signed_in_store(1).await);
        let driver = PollDriver::new(
            CountingSource::default(),
            Arc::new(CollectionStore::new()),
            &session,
            StalePolicy::LastWriteWins,
        );
        session.sign_out();
        assert!(driver.issue(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_mount_and_every_interval() {
        let session = Arc::new(signed_in_store(1).await);
        let source = CountingSource::default();
        let calls = source.calls.clone();

        let poller = Poller::mount(source, &session, 0, options(StalePolicy::LastWriteWins));
        assert!(poller.snapshot().loading);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!poller.snapshot().loading);

        tokio::time::sleep(TICK * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(poller.store().items(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_polls_immediately() {
        let session = Arc::new(signed_in_store(1).await);
        let source = CountingSource::default();
        let filters = source.filters.clone();

        let poller = Poller::mount(source, &session, 1, options(StalePolicy::LastWriteWins));
        tokio::time::sleep(Duration::from_millis(10)).await;

        poller.set_filter(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*filters.lock(), vec![1, 2]);

        // setting the same filter again is not a change
        poller.set_filter(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(filters.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_pauses_on_sign_out_and_resumes_on_sign_in() {
        let session = Arc::new(signed_in_store(1).await);
        let source = CountingSource::default();
        let calls = source.calls.clone();
        let _poller = Poller::mount(source, &session, 0, options(StalePolicy::LastWriteWins));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        session.sign_out();
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        session
            .sign_in(Credentials::new("ana@example.com", "secret"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_and_drop_stop_polling() {
        let session = Arc::new(signed_in_store(1).await);

        let source = CountingSource::default();
        let calls = source.calls.clone();
        let poller = Poller::mount(source, &session, 0, options(StalePolicy::LastWriteWins));
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.unmount().await;
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let source = CountingSource::default();
        let calls = source.calls.clone();
        let poller = Poller::mount(source, &session, 0, options(StalePolicy::LastWriteWins));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(poller);
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_ends_poll_loop() {
        let session = Arc::new(signed_in_store(1).await);
        let poller = Poller::mount(
            CountingSource::default(),
            &session,
            0,
            options(StalePolicy::LastWriteWins),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(poller.is_running());

        match Arc::try_unwrap(session) {
            Ok(store) => store.dispose(),
            Err(_) => panic!("poller must not keep the session alive"),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!poller.is_running());
    }

    async fn poll_with_401(logout_on_unauthorized: bool) -> (SessionStatus, Snapshot<crate::models::Notification>) {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/notifications", 401, r#"{"message":"jwt expired"}"#);

        let session = Arc::new(
            signed_in_store(1)
                .await
                .logout_on_unauthorized(logout_on_unauthorized),
        );
        let poller = Poller::mount(
            NotificationsSource::new(ApiClient::new(transport)),
            &session,
            (),
            options(StalePolicy::LastWriteWins),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        (session.status(), poller.snapshot())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_poll_signs_out_when_configured() {
        let (status, snapshot) = poll_with_401(true).await;
        assert_eq!(status, SessionStatus::Unauthenticated);
        assert!(!snapshot.loading);
        assert!(snapshot.last_error.unwrap().contains("jwt expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_poll_keeps_session_by_default() {
        let (status, snapshot) = poll_with_401(false).await;
        assert_eq!(status, SessionStatus::Authenticated);
        assert!(snapshot.items.is_empty());
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_refetching_unchanged_collection_is_stable() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Get,
            "/tool",
            200,
            r#"{"tools": [{"id": 1, "userId": 2, "name": "Trena", "price": 3, "status": "disponível"}]}"#,
        );
        let session = Arc::new(signed_in_store(1).await);
        let driver = PollDriver::new(
            ToolsSource::new(ApiClient::new(transport)),
            Arc::new(CollectionStore::new()),
            &session,
            StalePolicy::LastWriteWins,
        );

        driver.issue(()).unwrap().await.unwrap();
        let first = driver.store().snapshot();
        driver.issue(()).unwrap().await.unwrap();
        assert_eq!(driver.store().snapshot(), first);
    }

    #[derive(Default)]
    struct TokenRecordingSource {
        tokens: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CollectionSource for TokenRecordingSource {
        type Item = ();
        type Filter = ();

        fn name(&self) -> &'static str {
            "token-recording"
        }

        async fn fetch(&self, token: &BearerToken, _filter: &()) -> Result<Vec<()>, ClientError> {
            self.tokens.lock().push(token.as_str().to_string());
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_change_repolls_and_restarts_interval() {
        let auth = Arc::new(StaticAuthenticator::new(1));
        let session = Arc::new(SessionStore::new(auth.clone()));
        session.initialize();
        session.sign_in(auth.credentials()).await.unwrap();

        let source = TokenRecordingSource::default();
        let tokens = source.tokens.clone();
        let _poller = Poller::mount(source, &session, (), options(StalePolicy::LastWriteWins));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*tokens.lock(), vec!["token-1"]);

        // the loop only observes the final state, so this is a direct token swap
        session.sign_in(auth.credentials()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*tokens.lock(), vec!["token-1", "token-1-2"]);

        // no tick at t=1000: the interval restarted at t=500
        tokio::time::sleep(Duration::from_millis(890)).await;
        assert_eq!(tokens.lock().len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*tokens.lock(), vec!["token-1", "token-1-2", "token-1-2"]);
    }

    /// Answers 401 once its gate is released.
    struct LateRejectionSource {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl CollectionSource for LateRejectionSource {
        type Item = ();
        type Filter = ();

        fn name(&self) -> &'static str {
            "late-rejection"
        }

        async fn fetch(&self, _token: &BearerToken, _filter: &()) -> Result<Vec<()>, ClientError> {
            let gate = self.gate.lock().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            Err(ClientError::Unauthorized {
                status: 401,
                message: "jwt expired".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_late_unauthorized_for_old_token_keeps_new_session() {
        let auth = Arc::new(StaticAuthenticator::new(1));
        let session = Arc::new(SessionStore::new(auth.clone()).logout_on_unauthorized(true));
        session.initialize();
        session.sign_in(auth.credentials()).await.unwrap();

        let (release, gate) = oneshot::channel();
        let driver = PollDriver::new(
            LateRejectionSource {
                gate: Mutex::new(Some(gate)),
            },
            Arc::new(CollectionStore::new()),
            &session,
            StalePolicy::LastWriteWins,
        );
        let in_flight = driver.issue(()).unwrap();

        session.sign_out();
        session.sign_in(auth.credentials()).await.unwrap();
        let current = session.token().unwrap();
        assert_eq!(current.as_str(), "token-1-2");

        release.send(()).unwrap();
        in_flight.await.unwrap();

        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.token(), Some(current));
        assert!(driver.store().last_error().is_some());
    }
}
