//! API client for the card quest backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! API requests. Every call outside the credential-free allow-list goes
//! through [`ApiClient::ensure_valid_token`], which refreshes a stale
//! access token at most once no matter how many callers race on it.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{AuthNotifier, TokenStore};
use crate::models::{
    AuthSessionResponse, CompleteQuestRequest, CompleteQuestResponse, InitAuthRequest,
    ProgressResponse, RefreshRequest, TokenPairResponse,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Paths dispatched without credentials: login initiation, token fetch, and
/// the refresh call itself.
const SKIP_AUTH_PATHS: &[&str] = &["/api/auth/init", "/api/auth/tokens", "/api/auth/refresh"];

/// The in-flight refresh operation, shared by every caller that joins it.
type RefreshFuture = Shared<BoxFuture<'static, Result<String, ApiError>>>;

/// API client for the card quest backend.
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<TokenStore>,
    notifier: AuthNotifier,
    /// Holds the current refresh while one is running. Checked and set under
    /// the lock with no await in between, so concurrent callers can never
    /// start a second refresh.
    refresh_in_flight: Mutex<Option<RefreshFuture>>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<TokenStore>,
        notifier: AuthNotifier,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            notifier,
            refresh_in_flight: Mutex::new(None),
        })
    }

    /// The credential store this client reads and refreshes.
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn notifier(&self) -> &AuthNotifier {
        &self.notifier
    }

    // ===== Credential lifecycle =====

    /// Return a live access token, refreshing the pair if needed.
    ///
    /// - Live stored token: returned immediately, no suspension.
    /// - Refresh already running: joins it; every waiter observes the same
    ///   resolved token or the same failure.
    /// - Dead refresh token: clears the store, broadcasts auth-lost, and
    ///   fails with [`ApiError::AuthExpired`].
    pub async fn ensure_valid_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.store.live_access_value() {
            return Ok(token);
        }

        let refresh = {
            let mut slot = self.lock_refresh_slot();
            if let Some(existing) = slot.as_ref() {
                existing.clone()
            } else if let Some(token) = self.store.live_access_value() {
                // A refresh settled between the first check and taking the lock.
                return Ok(token);
            } else {
                if !self.store.is_refresh_live() {
                    self.store.clear();
                    self.notifier.notify();
                    return Err(ApiError::AuthExpired);
                }
                let fut = run_refresh(
                    self.client.clone(),
                    self.base_url.clone(),
                    Arc::clone(&self.store),
                    self.notifier.clone(),
                )
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };

        let result = refresh.clone().await;

        // The operation has settled; drop the marker so the next stale caller
        // starts fresh. Every waiter runs this, so the slot is cleared even
        // if the task that started the refresh was cancelled mid-await.
        {
            let mut slot = self.lock_refresh_slot();
            if slot.as_ref().is_some_and(|f| f.ptr_eq(&refresh)) {
                *slot = None;
            }
        }

        result
    }

    fn lock_refresh_slot(&self) -> std::sync::MutexGuard<'_, Option<RefreshFuture>> {
        self.refresh_in_flight
            .lock()
            .expect("refresh slot lock poisoned")
    }

    // ===== Request dispatch =====

    fn requires_auth(path: &str) -> bool {
        !SKIP_AUTH_PATHS.iter().any(|prefix| path.starts_with(prefix))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if Self::requires_auth(path) {
            request = request.bearer_auth(self.ensure_valid_token().await?);
        }

        debug!(path, "GET");
        let response = request.send().await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if Self::requires_auth(path) {
            request = request.bearer_auth(self.ensure_valid_token().await?);
        }

        debug!(path, "POST");
        let response = request.json(body).send().await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    // ===== Endpoints =====

    /// Start a phone-number login session.
    pub async fn init_auth(&self, phone_number: &str) -> Result<AuthSessionResponse, ApiError> {
        self.post(
            "/api/auth/init",
            &InitAuthRequest {
                phone_number: phone_number.to_string(),
            },
        )
        .await
    }

    /// Fetch the final token pair for an approved login session.
    pub async fn fetch_tokens(&self, session_id: &str) -> Result<TokenPairResponse, ApiError> {
        self.get(&format!("/api/auth/tokens/{}", session_id)).await
    }

    /// Fetch the set of solved cards for the authenticated user.
    pub async fn get_progress(&self) -> Result<ProgressResponse, ApiError> {
        self.get("/api/progress").await
    }

    /// Record a solved card for the authenticated user.
    pub async fn complete_quest(&self, quest_id: &str) -> Result<CompleteQuestResponse, ApiError> {
        self.post(
            "/api/progress/complete",
            &CompleteQuestRequest {
                quest_id: quest_id.to_string(),
            },
        )
        .await
    }
}

/// The refresh operation itself. Owns clones of everything it touches so the
/// future is `'static` and can outlive any individual caller.
async fn run_refresh(
    client: Client,
    base_url: String,
    store: Arc<TokenStore>,
    notifier: AuthNotifier,
) -> Result<String, ApiError> {
    let Some(refresh) = store.refresh() else {
        store.clear();
        notifier.notify();
        return Err(ApiError::AuthExpired);
    };

    debug!("Refreshing access token");
    let response = client
        .post(format!("{}/api/auth/refresh", base_url))
        .json(&RefreshRequest {
            refresh_token: refresh.token,
        })
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        warn!(status = %status, "Token refresh rejected");
        store.clear();
        notifier.notify();
        return Err(ApiError::RefreshFailed {
            status: status.as_u16(),
        });
    }

    let pair: TokenPairResponse = response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    store.save(
        &pair.access_token,
        pair.access_expires_in,
        &pair.refresh_token,
        pair.refresh_expires_in,
    );
    info!("Access token refreshed");
    Ok(pair.access_token)
}
