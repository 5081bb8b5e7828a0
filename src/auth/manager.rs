//! Token lifecycle: validity checks, code exchange and serialized refresh

use std::sync::{Arc, RwLock};

use super::session::{unix_now, AuthSession, SessionStore};
use super::tokens::TokenEndpoint;
use crate::error::VkError;
use crate::singleflight::SingleFlight;

/// Sole owner of the `AuthSession`. Everyone else reads snapshots.
///
/// Cheap to clone; clones share the session and the refresh slot.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    session: RwLock<AuthSession>,
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn SessionStore>,
    refresh: SingleFlight<(), Result<AuthSession, VkError>>,
}

impl TokenManager {
    pub fn new(
        session: AuthSession,
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(session),
                endpoint,
                store,
                refresh: SingleFlight::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> AuthSession {
        self.inner.snapshot()
    }

    /// Return a valid session, refreshing first if needed.
    ///
    /// Concurrent callers that find the session expired share one refresh.
    pub async fn ensure_valid(&self) -> Result<AuthSession, VkError> {
        let session = self.snapshot();
        if session.is_valid() {
            return Ok(session);
        }
        if !session.has_refresh_token() {
            tracing::debug!("No valid access token and no refresh token");
            return Err(VkError::Unauthenticated);
        }
        self.refresh().await
    }

    /// Refresh after the API rejected `rejected_token`.
    ///
    /// If the session already holds a different valid token (another caller
    /// refreshed meanwhile) that one is returned without a new request.
    pub async fn refresh_rejected(&self, rejected_token: &str) -> Result<AuthSession, VkError> {
        let session = self.snapshot();
        if session.is_valid() && session.access_token.as_deref() != Some(rejected_token) {
            return Ok(session);
        }
        self.refresh().await
    }

    /// Issue a refresh, or join the one already in flight.
    pub async fn refresh(&self) -> Result<AuthSession, VkError> {
        let inner = self.inner.clone();
        self.inner
            .refresh
            .run((), move || async move { inner.do_refresh().await })
            .await
    }

    /// Exchange an authorization code obtained out-of-band.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthSession, VkError> {
        tracing::info!("Exchanging authorization code for token...");
        let resp = self.inner.endpoint.exchange_code(code).await?;

        let mut session = AuthSession::default();
        if !session.apply_token_response(&resp, unix_now()) {
            return Err(VkError::Auth(resp.failure_reason()));
        }
        self.inner.replace(session.clone());
        tracing::info!("Authorized as user {:?}", session.user_id);
        Ok(session)
    }

    /// Drop all credentials (logout or unrecoverable failure).
    pub fn clear(&self) {
        self.inner.replace(AuthSession::default());
    }
}

impl Inner {
    fn snapshot(&self) -> AuthSession {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace(&self, session: AuthSession) {
        let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
        *current = session;
        self.persist(&current);
    }

    /// Install `next` only if the session still equals `expected`,
    /// otherwise hand back what is there now.
    fn replace_if_unchanged(
        &self,
        expected: &AuthSession,
        next: AuthSession,
    ) -> Result<(), AuthSession> {
        let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
        if *current != *expected {
            return Err(current.clone());
        }
        *current = next;
        self.persist(&current);
        Ok(())
    }

    fn persist(&self, session: &AuthSession) {
        if let Err(e) = self.store.save_session(session) {
            tracing::warn!("Failed to persist session: {:#}", e);
        }
    }

    async fn do_refresh(&self) -> Result<AuthSession, VkError> {
        let original = self.snapshot();
        let Some(refresh_token) = original.refresh_token.clone().filter(|t| !t.is_empty()) else {
            return Err(VkError::Unauthenticated);
        };

        tracing::info!("Refreshing access token...");
        let resp = self.endpoint.refresh(&refresh_token).await?;

        let mut session = original.clone();
        if !session.apply_token_response(&resp, unix_now()) {
            let reason = resp.failure_reason();
            tracing::warn!("Token refresh rejected: {}", reason);
            if let Err(current) = self.replace_if_unchanged(&original, AuthSession::default()) {
                return superseded(current);
            }
            return Err(VkError::SessionExpired(reason));
        }

        match self.replace_if_unchanged(&original, session.clone()) {
            Ok(()) => {
                tracing::info!("Token refresh complete");
                Ok(session)
            }
            Err(current) => {
                tracing::info!("Session changed during refresh, discarding refreshed token");
                superseded(current)
            }
        }
    }
}

/// Outcome of a refresh whose session was cleared or replaced meanwhile.
fn superseded(current: AuthSession) -> Result<AuthSession, VkError> {
    if current.is_valid() {
        Ok(current)
    } else {
        Err(VkError::Unauthenticated)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::auth::tokens::TokenResponse;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn manager(session: AuthSession, endpoint: Arc<FakeEndpoint>) -> (TokenManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (TokenManager::new(session, endpoint, store.clone()), store)
    }

    #[tokio::test]
    async fn test_valid_session_returns_immediately() {
        let endpoint = Arc::new(FakeEndpoint::granting("new"));
        let (tm, _) = manager(valid_session("current"), endpoint.clone());

        let session = assert_ok!(tm.ensure_valid().await);
        assert_eq!(session.access_token.as_deref(), Some("current"));
        assert_eq!(endpoint.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_refreshes_and_keeps_refresh_token() {
        let endpoint = Arc::new(FakeEndpoint::granting("new"));
        let (tm, store) = manager(expired_session(), endpoint.clone());

        let session = assert_ok!(tm.ensure_valid().await);
        assert_eq!(session.access_token.as_deref(), Some("new"));
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
        assert!(session.is_valid());
        assert_eq!(store.last(), Some(session));
        assert_eq!(endpoint.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_no_credentials_is_unauthenticated() {
        let endpoint = Arc::new(FakeEndpoint::granting("new"));
        let (tm, _) = manager(AuthSession::default(), endpoint.clone());

        assert_eq!(tm.ensure_valid().await, Err(VkError::Unauthenticated));
        assert_eq!(endpoint.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let endpoint = Arc::new(FakeEndpoint::replying(Ok(TokenResponse {
            error: Some("invalid_grant".into()),
            error_description: Some("Token revoked".into()),
            ..Default::default()
        })));
        let (tm, store) = manager(expired_session(), endpoint);

        let err = assert_err!(tm.ensure_valid().await);
        assert_eq!(err, VkError::SessionExpired("Token revoked".into()));
        assert!(tm.snapshot().is_empty());
        assert_eq!(store.last(), Some(AuthSession::default()));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_session() {
        let endpoint = Arc::new(FakeEndpoint::replying(Err(VkError::Transport(
            "connection reset".into(),
        ))));
        let (tm, _) = manager(expired_session(), endpoint);

        let err = assert_err!(tm.ensure_valid().await);
        assert!(matches!(err, VkError::Transport(_)));
        assert_eq!(tm.snapshot(), expired_session());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mut fake = FakeEndpoint::granting("new");
        fake.delay = Duration::from_millis(50);
        let endpoint = Arc::new(fake);
        let (tm, _) = manager(expired_session(), endpoint.clone());

        let calls = (0..8).map(|_| {
            let tm = tm.clone();
            tokio::spawn(async move { tm.ensure_valid().await })
        });
        for result in futures::future::join_all(calls).await {
            let session = result.unwrap().unwrap();
            assert_eq!(session.access_token.as_deref(), Some("new"));
        }
        assert_eq!(endpoint.refresh_count(), 1);
    }

    fn slow_endpoint(reply: Result<TokenResponse, VkError>) -> Arc<FakeEndpoint> {
        let mut fake = FakeEndpoint::replying(reply);
        fake.delay = Duration::from_millis(50);
        Arc::new(fake)
    }

    fn granted(token: &str) -> Result<TokenResponse, VkError> {
        Ok(TokenResponse {
            access_token: Some(token.to_string()),
            expires_in: Some(3600),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_refresh_is_not_undone() {
        let endpoint = slow_endpoint(granted("new"));
        let (tm, store) = manager(expired_session(), endpoint.clone());

        let pending = {
            let tm = tm.clone();
            tokio::spawn(async move { tm.refresh().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(endpoint.refresh_count(), 1);

        tm.clear();
        assert_eq!(pending.await.unwrap(), Err(VkError::Unauthenticated));
        assert!(tm.snapshot().is_empty());
        assert_eq!(store.last(), Some(AuthSession::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_refresh_is_kept() {
        let endpoint = slow_endpoint(granted("new"));
        let (tm, store) = manager(expired_session(), endpoint.clone());

        let pending = {
            let tm = tm.clone();
            tokio::spawn(async move { tm.refresh().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(endpoint.refresh_count(), 1);

        let login = assert_ok!(tm.exchange_code("good").await);
        let session = assert_ok!(pending.await.unwrap());
        assert_eq!(session, login);
        assert_eq!(tm.snapshot().access_token.as_deref(), Some("from-code"));
        assert_eq!(store.last(), Some(login));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_refresh_leaves_new_login_alone() {
        let endpoint = slow_endpoint(Ok(TokenResponse {
            error: Some("invalid_grant".into()),
            ..Default::default()
        }));
        let (tm, _) = manager(expired_session(), endpoint.clone());

        let pending = {
            let tm = tm.clone();
            tokio::spawn(async move { tm.refresh().await })
        };
        tokio::task::yield_now().await;

        let login = assert_ok!(tm.exchange_code("good").await);
        assert_eq!(assert_ok!(pending.await.unwrap()), login);
        assert_eq!(tm.snapshot(), login);
    }

    #[tokio::test]
    async fn test_refresh_rejected_skips_already_rotated_token() {
        let endpoint = Arc::new(FakeEndpoint::granting("newer"));
        let (tm, _) = manager(valid_session("rotated"), endpoint.clone());

        let session = assert_ok!(tm.refresh_rejected("old").await);
        assert_eq!(session.access_token.as_deref(), Some("rotated"));
        assert_eq!(endpoint.refresh_count(), 0);

        let session = assert_ok!(tm.refresh_rejected("rotated").await);
        assert_eq!(session.access_token.as_deref(), Some("newer"));
        assert_eq!(endpoint.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let endpoint = Arc::new(FakeEndpoint::granting("unused"));
        let (tm, store) = manager(AuthSession::default(), endpoint);

        let session = assert_ok!(tm.exchange_code("good").await);
        assert_eq!(session.access_token.as_deref(), Some("from-code"));
        assert_eq!(store.last(), Some(session));

        let err = assert_err!(tm.exchange_code("bad").await);
        assert_eq!(err, VkError::Auth("invalid_grant".into()));
    }
}
