//! Phone-number login flow.
//!
//! `submit` opens a login session on the server and subscribes to its
//! realtime channel; the external bot then walks the user through approval
//! and the resulting events are folded into phase transitions with
//! [`LoginFlow::handle_event`]. The flow ends in [`AuthPhase::Authenticated`]
//! (token pair fetched and stored) or [`AuthPhase::Failed`].
//!
//! Terminal phases are sticky: the transport may reorder or duplicate
//! events, so once `Authenticated` or `Failed` is reached every further
//! event is discarded and only an explicit [`LoginFlow::reset`] leaves the
//! phase.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::realtime::{channel_name, AuthEvent, RealtimeConnector, Subscription};

/// Phase of the login flow. `Authenticated` and `Failed` are terminal until
/// reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    PhoneInput,
    AwaitingBot,
    Authenticating,
    Authenticated,
    Failed,
}

/// Last approval status observed on the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Pending,
    BotStarted,
    PhoneShared,
    Approved,
    Rejected,
}

/// The active login session. Exactly one per flow; destroyed on success,
/// failure, or reset.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session_id: String,
    pub phone_number: String,
}

/// Status line for presentation code. The flow itself stores no display
/// text beyond the failure message.
pub fn describe(phase: AuthPhase, status: AuthStatus) -> &'static str {
    match phase {
        AuthPhase::PhoneInput => "Enter your phone number",
        AuthPhase::Authenticated => "Login approved",
        AuthPhase::Failed => match status {
            AuthStatus::Rejected => "Login was rejected",
            _ => "Login failed",
        },
        AuthPhase::AwaitingBot | AuthPhase::Authenticating => match status {
            AuthStatus::Pending => "Waiting for the bot to connect...",
            AuthStatus::BotStarted => "Bot connected",
            AuthStatus::PhoneShared => "Phone number confirmed",
            AuthStatus::Approved => "Login approved",
            AuthStatus::Rejected => "Login was rejected",
        },
    }
}

/// Drives the phone-number login state machine.
pub struct LoginFlow {
    api: Arc<ApiClient>,
    realtime: Arc<dyn RealtimeConnector>,
    phase: AuthPhase,
    status: AuthStatus,
    session: Option<LoginSession>,
    subscription: Option<Box<dyn Subscription>>,
    error: Option<String>,
}

impl LoginFlow {
    pub fn new(api: Arc<ApiClient>, realtime: Arc<dyn RealtimeConnector>) -> Self {
        Self {
            api,
            realtime,
            phase: AuthPhase::PhoneInput,
            status: AuthStatus::Pending,
            session: None,
            subscription: None,
            error: None,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn status(&self) -> AuthStatus {
        self.status
    }

    pub fn session(&self) -> Option<&LoginSession> {
        self.session.as_ref()
    }

    /// The failure message, once the phase is `Failed`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, AuthPhase::Authenticated | AuthPhase::Failed)
    }

    /// Open a login session for `phone_number` and subscribe to its events.
    pub async fn submit(&mut self, phone_number: &str) -> Result<(), ApiError> {
        if self.phase != AuthPhase::PhoneInput {
            return Err(ApiError::LoginInitFailed(
                "a login attempt is already in progress".to_string(),
            ));
        }
        self.error = None;

        let response = match self.api.init_auth(phone_number).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login initiation failed");
                self.fail("Could not start login");
                return Err(ApiError::LoginInitFailed(e.to_string()));
            }
        };

        // Replace any stale subscription before opening a new one.
        self.release_subscription();

        let channel = channel_name(&response.session_id);
        match self.realtime.subscribe(&channel).await {
            Ok(subscription) => {
                info!(session_id = %response.session_id, "Login session opened");
                self.subscription = Some(subscription);
                self.session = Some(LoginSession {
                    session_id: response.session_id,
                    phone_number: phone_number.to_string(),
                });
                self.phase = AuthPhase::AwaitingBot;
                self.status = AuthStatus::Pending;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Realtime subscription failed");
                self.fail("Could not start login");
                Err(ApiError::LoginInitFailed(e.to_string()))
            }
        }
    }

    /// Next event from the realtime subscription, in delivery order.
    pub async fn next_event(&mut self) -> Option<AuthEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next_event().await,
            None => None,
        }
    }

    /// Fold one realtime event into the state machine.
    ///
    /// Terminal phases discard every event; unknown names never reach this
    /// point (the decoder drops them).
    pub async fn handle_event(&mut self, event: AuthEvent) -> Result<(), ApiError> {
        if self.is_terminal() {
            debug!(?event, "Discarding event in terminal phase");
            return Ok(());
        }
        if !matches!(self.phase, AuthPhase::AwaitingBot | AuthPhase::Authenticating) {
            debug!(?event, "Discarding event without an active login session");
            return Ok(());
        }

        match event {
            AuthEvent::BotStarted => {
                if self.phase == AuthPhase::AwaitingBot {
                    self.status = AuthStatus::BotStarted;
                    self.phase = AuthPhase::Authenticating;
                }
                Ok(())
            }
            AuthEvent::PhoneShared => {
                self.status = AuthStatus::PhoneShared;
                self.phase = AuthPhase::Authenticating;
                Ok(())
            }
            AuthEvent::Approved => {
                self.status = AuthStatus::Approved;
                self.finish_login().await
            }
            AuthEvent::Rejected { reason } => {
                self.status = AuthStatus::Rejected;
                if let Some(reason) = reason {
                    debug!(%reason, "Login rejected");
                }
                self.fail("Login was rejected");
                Ok(())
            }
        }
    }

    /// Pump events until the flow reaches a terminal phase or the channel
    /// closes. Returns the phase reached.
    pub async fn drive(&mut self) -> AuthPhase {
        while !self.is_terminal() {
            match self.next_event().await {
                Some(event) => {
                    if let Err(e) = self.handle_event(event).await {
                        debug!(error = %e, "Event handling failed");
                    }
                }
                None => break,
            }
        }
        self.phase
    }

    /// Abandon the current attempt and return to `PhoneInput`.
    pub fn reset(&mut self) {
        self.release_subscription();
        self.session = None;
        self.phase = AuthPhase::PhoneInput;
        self.status = AuthStatus::Pending;
        self.error = None;
    }

    /// Fetch the final token pair and hand it to the credential store.
    async fn finish_login(&mut self) -> Result<(), ApiError> {
        let Some(session) = self.session.clone() else {
            self.fail("Could not fetch tokens");
            return Err(ApiError::TokenFetchFailed("no active session".to_string()));
        };

        match self.api.fetch_tokens(&session.session_id).await {
            Ok(pair) => {
                self.api.token_store().save(
                    &pair.access_token,
                    pair.access_expires_in,
                    &pair.refresh_token,
                    pair.refresh_expires_in,
                );
                self.phase = AuthPhase::Authenticated;
                self.session = None;
                self.release_subscription();
                info!("Login complete");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token fetch failed");
                self.fail("Could not fetch tokens");
                Err(ApiError::TokenFetchFailed(e.to_string()))
            }
        }
    }

    fn fail(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.phase = AuthPhase::Failed;
        self.session = None;
        self.release_subscription();
    }

    /// `take()` guarantees the handle is released at most once per session.
    fn release_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::{AuthNotifier, TokenStore};
    use crate::realtime::RealtimeError;

    #[derive(Default)]
    struct MockRealtime {
        releases: Arc<AtomicUsize>,
        channels: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RealtimeConnector for MockRealtime {
        async fn subscribe(
            &self,
            channel: &str,
        ) -> Result<Box<dyn Subscription>, RealtimeError> {
            self.channels.lock().unwrap().push(channel.to_string());
            Ok(Box::new(MockSubscription {
                releases: Arc::clone(&self.releases),
            }))
        }
    }

    struct MockSubscription {
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscription for MockSubscription {
        async fn next_event(&mut self) -> Option<AuthEvent> {
            None
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn server_with_init(session_id: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/init"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"session_id": session_id, "expires_in": 300})),
            )
            .mount(&server)
            .await;
        server
    }

    fn flow_for(server_uri: &str, realtime: Arc<MockRealtime>) -> (LoginFlow, Arc<TokenStore>) {
        let store = Arc::new(TokenStore::in_memory());
        let api = Arc::new(
            ApiClient::new(server_uri, Arc::clone(&store), AuthNotifier::new()).unwrap(),
        );
        (LoginFlow::new(api, realtime), store)
    }

    #[tokio::test]
    async fn approved_flow_ends_authenticated_with_stored_pair() {
        let server = server_with_init("s1").await;
        Mock::given(method("GET"))
            .and(path("/api/auth/tokens/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A1",
                "refresh_token": "R1",
                "access_expires_in": 300,
                "refresh_expires_in": 86400
            })))
            .mount(&server)
            .await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        assert_eq!(flow.phase(), AuthPhase::AwaitingBot);
        assert_eq!(
            *realtime.channels.lock().unwrap(),
            vec!["auth:s1".to_string()]
        );

        flow.handle_event(AuthEvent::BotStarted).await.unwrap();
        assert_eq!(flow.phase(), AuthPhase::Authenticating);
        assert_eq!(flow.status(), AuthStatus::BotStarted);

        flow.handle_event(AuthEvent::Approved).await.unwrap();
        assert_eq!(flow.phase(), AuthPhase::Authenticated);
        assert_eq!(store.access().unwrap().token, "A1");
        assert_eq!(store.refresh().unwrap().token, "R1");
        assert!(flow.session().is_none());
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_fails_the_flow_and_leaves_store_absent() {
        let server = server_with_init("s1").await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        flow.handle_event(AuthEvent::Rejected {
            reason: Some("declined".to_string()),
        })
        .await
        .unwrap();

        assert_eq!(flow.phase(), AuthPhase::Failed);
        assert_eq!(flow.status(), AuthStatus::Rejected);
        assert_eq!(flow.error(), Some("Login was rejected"));
        assert!(store.access().is_none());
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_phase_discards_late_events() {
        let server = server_with_init("s1").await;
        Mock::given(method("GET"))
            .and(path("/api/auth/tokens/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A1",
                "refresh_token": "R1",
                "access_expires_in": 300,
                "refresh_expires_in": 86400
            })))
            .mount(&server)
            .await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        flow.handle_event(AuthEvent::Approved).await.unwrap();
        assert_eq!(flow.phase(), AuthPhase::Authenticated);

        // Reordered/duplicated events arriving after the terminal phase.
        flow.handle_event(AuthEvent::Rejected { reason: None })
            .await
            .unwrap();
        flow.handle_event(AuthEvent::PhoneShared).await.unwrap();

        assert_eq!(flow.phase(), AuthPhase::Authenticated);
        assert_eq!(store.access().unwrap().token, "A1");
    }

    #[tokio::test]
    async fn duplicate_bot_started_does_not_regress_status() {
        let server = server_with_init("s1").await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, _store) = flow_for(&server.uri(), realtime);

        flow.submit("+15551234567").await.unwrap();
        flow.handle_event(AuthEvent::BotStarted).await.unwrap();
        flow.handle_event(AuthEvent::PhoneShared).await.unwrap();
        flow.handle_event(AuthEvent::BotStarted).await.unwrap();

        assert_eq!(flow.phase(), AuthPhase::Authenticating);
        assert_eq!(flow.status(), AuthStatus::PhoneShared);
    }

    #[tokio::test]
    async fn phone_shared_first_still_advances_the_phase() {
        let server = server_with_init("s1").await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, _store) = flow_for(&server.uri(), realtime);

        flow.submit("+15551234567").await.unwrap();
        flow.handle_event(AuthEvent::PhoneShared).await.unwrap();

        assert_eq!(flow.phase(), AuthPhase::Authenticating);
        assert_eq!(flow.status(), AuthStatus::PhoneShared);
    }

    #[tokio::test]
    async fn failed_login_init_reaches_failed_phase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/init"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, _store) = flow_for(&server.uri(), Arc::clone(&realtime));

        let result = flow.submit("+15551234567").await;
        assert!(matches!(result, Err(ApiError::LoginInitFailed(_))));
        assert_eq!(flow.phase(), AuthPhase::Failed);
        assert_eq!(flow.error(), Some("Could not start login"));
        // No subscription was ever opened.
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_token_fetch_reaches_failed_phase() {
        let server = server_with_init("s1").await;
        Mock::given(method("GET"))
            .and(path("/api/auth/tokens/s1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not approved"))
            .mount(&server)
            .await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        let result = flow.handle_event(AuthEvent::Approved).await;

        assert!(matches!(result, Err(ApiError::TokenFetchFailed(_))));
        assert_eq!(flow.phase(), AuthPhase::Failed);
        assert_eq!(flow.error(), Some("Could not fetch tokens"));
        assert!(store.access().is_none());
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_releases_the_subscription_exactly_once() {
        let server = server_with_init("s1").await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, _store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        flow.reset();

        assert_eq!(flow.phase(), AuthPhase::PhoneInput);
        assert_eq!(flow.status(), AuthStatus::Pending);
        assert!(flow.session().is_none());
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 1);

        // A second reset must not touch the already-released handle.
        flow.reset();
        assert_eq!(realtime.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_after_failure_allows_a_new_attempt() {
        let server = server_with_init("s2").await;

        let realtime = Arc::new(MockRealtime::default());
        let (mut flow, _store) = flow_for(&server.uri(), Arc::clone(&realtime));

        flow.submit("+15551234567").await.unwrap();
        flow.handle_event(AuthEvent::Rejected { reason: None })
            .await
            .unwrap();
        assert_eq!(flow.phase(), AuthPhase::Failed);

        // Terminal until reset: a new submit is refused.
        let refused = flow.submit("+15551234567").await;
        assert!(matches!(refused, Err(ApiError::LoginInitFailed(_))));

        flow.reset();
        flow.submit("+15559876543").await.unwrap();
        assert_eq!(flow.phase(), AuthPhase::AwaitingBot);
        assert_eq!(flow.session().unwrap().phone_number, "+15559876543");
    }

    #[test]
    fn describe_is_phase_and_status_scoped() {
        assert_eq!(
            describe(AuthPhase::PhoneInput, AuthStatus::Pending),
            "Enter your phone number"
        );
        assert_eq!(
            describe(AuthPhase::AwaitingBot, AuthStatus::Pending),
            "Waiting for the bot to connect..."
        );
        assert_eq!(
            describe(AuthPhase::Authenticating, AuthStatus::PhoneShared),
            "Phone number confirmed"
        );
        assert_eq!(
            describe(AuthPhase::Failed, AuthStatus::Rejected),
            "Login was rejected"
        );
        assert_eq!(
            describe(AuthPhase::Failed, AuthStatus::Pending),
            "Login failed"
        );
        assert_eq!(
            describe(AuthPhase::Authenticated, AuthStatus::Approved),
            "Login approved"
        );
    }
}
