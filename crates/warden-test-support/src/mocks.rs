//! Scripted collaborators for the auth pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use url::Url;
use warden_auth::{
    AdapterError, AdapterLoadError, AdapterLoader, AdapterResult, ClientDescriptor,
    IdentityAdapter, InitOptions, LocalSession, SessionEvent,
};

#[derive(Debug, Clone)]
struct Session {
    authenticated: bool,
    token: Option<String>,
    expired: bool,
}

/// Identity adapter whose every answer is scripted up front.
///
/// By default `initialize` succeeds with token `token-1`, the token is valid,
/// and `refresh` reports "already valid".
pub struct ScriptedAdapter {
    subject: Option<String>,
    init_result: AdapterResult<bool>,
    init_token: Option<String>,
    refresh_result: AdapterResult<bool>,
    refreshed_token: Option<String>,
    refresh_delay: Option<Duration>,
    logout_result: AdapterResult<()>,
    session: Mutex<Session>,
    initialize_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    init_options: Mutex<Vec<InitOptions>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ScriptedAdapter {
    /// Adapter that logs `subject` in successfully.
    #[must_use]
    pub fn new(subject: &str) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            subject: Some(subject.to_string()),
            init_result: Ok(true),
            init_token: Some("token-1".to_string()),
            refresh_result: Ok(false),
            refreshed_token: None,
            refresh_delay: None,
            logout_result: Ok(()),
            session: Mutex::new(Session {
                authenticated: false,
                token: None,
                expired: false,
            }),
            initialize_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            init_options: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Start with an established session holding `token`.
    #[must_use]
    pub fn authenticated(self, token: &str) -> Self {
        *lock(&self.session) = Session {
            authenticated: true,
            token: Some(token.to_string()),
            expired: false,
        };
        self
    }

    /// Report the current token as expired.
    #[must_use]
    pub fn expired(self) -> Self {
        lock(&self.session).expired = true;
        self
    }

    /// Fail initialisation with `error`.
    #[must_use]
    pub fn failing_init(mut self, error: AdapterError) -> Self {
        self.init_result = Err(error);
        self
    }

    /// Finish initialisation without a session.
    #[must_use]
    pub fn init_unauthenticated(mut self) -> Self {
        self.init_result = Ok(false);
        self
    }

    /// Establish the session without a token.
    #[must_use]
    pub fn without_token(mut self) -> Self {
        self.init_token = None;
        self
    }

    /// Expose no subject identifier.
    #[must_use]
    pub fn without_subject(mut self) -> Self {
        self.subject = None;
        self
    }

    /// Renew the token to `token` on refresh.
    #[must_use]
    pub fn refreshing_to(mut self, token: &str) -> Self {
        self.refresh_result = Ok(true);
        self.refreshed_token = Some(token.to_string());
        self
    }

    /// Reject every refresh with `error`.
    #[must_use]
    pub fn failing_refresh(mut self, error: AdapterError) -> Self {
        self.refresh_result = Err(error);
        self
    }

    /// Fail every logout with [`AdapterError::LogoutFailed`], keeping the session.
    #[must_use]
    pub fn failing_logout(mut self, reason: &str) -> Self {
        self.logout_result = Err(AdapterError::LogoutFailed {
            reason: reason.to_string(),
        });
        self
    }

    /// Sleep for `delay` inside every refresh.
    #[must_use]
    pub const fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Number of `initialize` calls.
    #[must_use]
    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh` calls.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of `logout` calls.
    #[must_use]
    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Options passed to every `initialize` call, in order.
    #[must_use]
    pub fn init_options_seen(&self) -> Vec<InitOptions> {
        lock(&self.init_options).clone()
    }

    /// Simulate the identity provider ending the session out-of-band.
    pub fn fire_external_logout(&self) {
        {
            let mut session = lock(&self.session);
            session.authenticated = false;
            session.token = None;
        }
        let _ = self.events.send(SessionEvent::LoggedOut);
    }
}

#[async_trait]
impl IdentityAdapter for ScriptedAdapter {
    async fn initialize(&self, options: &InitOptions) -> AdapterResult<bool> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.init_options).push(options.clone());
        let authenticated = self.init_result.clone()?;
        if authenticated {
            let mut session = lock(&self.session);
            session.authenticated = true;
            session.token.clone_from(&self.init_token);
        }
        Ok(authenticated)
    }

    async fn refresh(&self, _min_validity: Duration) -> AdapterResult<bool> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        let refreshed = self.refresh_result.clone()?;
        let mut session = lock(&self.session);
        if !session.expired {
            return Ok(false);
        }
        if refreshed && let Some(token) = &self.refreshed_token {
            session.token = Some(token.clone());
            session.expired = false;
            session.authenticated = true;
        }
        drop(session);
        Ok(refreshed)
    }

    async fn logout(&self) -> AdapterResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_result.clone()?;
        let mut session = lock(&self.session);
        session.authenticated = false;
        session.token = None;
        drop(session);
        Ok(())
    }

    fn is_token_expired(&self, _leeway: Duration) -> bool {
        lock(&self.session).expired
    }

    fn is_authenticated(&self) -> bool {
        lock(&self.session).authenticated
    }

    fn subject(&self) -> Option<String> {
        if lock(&self.session).authenticated {
            self.subject.clone()
        } else {
            None
        }
    }

    fn token(&self) -> Option<String> {
        lock(&self.session).token.clone()
    }

    fn session_events(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        Some(self.events.subscribe())
    }
}

/// Host session that records how often its local logout ran.
#[derive(Default)]
pub struct RecordingSession {
    logouts: AtomicUsize,
    notify: Notify,
}

impl RecordingSession {
    /// Number of local logouts.
    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    /// Wait until at least one local logout ran; returns `false` on timeout.
    pub async fn wait_for_logout(&self, timeout: Duration) -> bool {
        if self.logouts() > 0 {
            return true;
        }
        let notified = self.notify.notified();
        if self.logouts() > 0 {
            return true;
        }
        tokio::time::timeout(timeout, notified).await.is_ok()
    }
}

#[async_trait]
impl LocalSession for RecordingSession {
    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Loader that hands out a prepared adapter and records requested bundle URLs.
pub struct StaticLoader {
    adapter: Arc<dyn IdentityAdapter>,
    requested: Mutex<Vec<Url>>,
}

impl StaticLoader {
    /// Loader returning `adapter` for every request.
    #[must_use]
    pub fn new(adapter: Arc<dyn IdentityAdapter>) -> Self {
        Self {
            adapter,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Bundle URLs requested so far.
    #[must_use]
    pub fn requested(&self) -> Vec<Url> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl AdapterLoader for StaticLoader {
    async fn load(
        &self,
        script_url: &Url,
        _descriptor: &ClientDescriptor,
    ) -> Result<Arc<dyn IdentityAdapter>, AdapterLoadError> {
        lock(&self.requested).push(script_url.clone());
        Ok(Arc::clone(&self.adapter))
    }
}

/// Loader whose bundle is always missing.
#[derive(Debug, Default)]
pub struct FailingLoader;

#[async_trait]
impl AdapterLoader for FailingLoader {
    async fn load(
        &self,
        script_url: &Url,
        _descriptor: &ClientDescriptor,
    ) -> Result<Arc<dyn IdentityAdapter>, AdapterLoadError> {
        Err(AdapterLoadError::Status {
            url: script_url.to_string(),
            status: 404,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::InitToken;

    #[tokio::test]
    async fn scripted_refresh_renews_expired_token() {
        let adapter = ScriptedAdapter::new("alice")
            .authenticated("old")
            .expired()
            .refreshing_to("new");
        assert!(adapter.is_token_expired(Duration::from_secs(10)));
        assert_eq!(adapter.refresh(Duration::from_secs(10)).await, Ok(true));
        assert_eq!(adapter.token().as_deref(), Some("new"));
        assert_eq!(adapter.refresh(Duration::from_secs(10)).await, Ok(false));
        assert_eq!(adapter.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn scripted_initialize_records_options() {
        let adapter = ScriptedAdapter::new("alice");
        let options = InitOptions::Token(InitToken::bare("abc"));
        assert_eq!(adapter.initialize(&options).await, Ok(true));
        assert_eq!(adapter.init_options_seen(), vec![options]);
        assert_eq!(adapter.subject().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn scripted_logout_failure_keeps_session() {
        let adapter = ScriptedAdapter::new("alice")
            .authenticated("token-1")
            .failing_logout("provider unavailable");
        assert!(matches!(
            adapter.logout().await,
            Err(AdapterError::LogoutFailed { .. })
        ));
        assert_eq!(adapter.logout_calls(), 1);
        assert!(adapter.is_authenticated());
    }

    #[tokio::test]
    async fn recording_session_wakes_waiters() {
        let session = Arc::new(RecordingSession::default());
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.wait_for_logout(Duration::from_secs(1)).await })
        };
        tokio::task::yield_now().await;
        session.logout().await;
        assert!(waiter.await.expect("waiter task"));
        assert_eq!(session.logouts(), 1);
    }
}
