//! Cardgate - client-side session authentication for the card quest backend.
//!
//! The backend approves logins out-of-band: the user submits a phone number,
//! an external bot confirms it, and approval arrives asynchronously over a
//! realtime channel. From then on every API call carries a short-lived
//! access token backed by a longer-lived refresh token.
//!
//! The crate wires together four pieces:
//! - [`auth::TokenStore`] holds the credential pair, with a liveness skew
//!   that forces pre-emptive refresh, and persists it across restarts
//! - [`api::ApiClient`] attaches credentials to outbound requests and
//!   collapses concurrent refreshes into a single network call
//! - [`auth::LoginFlow`] drives the phone-number login state machine over
//!   [`realtime`] approval events
//! - [`auth::AuthNotifier`] broadcasts the process-wide auth-lost signal
//!   when credentials become unrecoverable
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cardgate::{ApiClient, AuthNotifier, Config, LoginFlow, RealtimeClient, TokenStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let store = Arc::new(TokenStore::open(config.token_dir()?));
//! let notifier = AuthNotifier::new();
//! let api = Arc::new(ApiClient::new(config.api_base_url.clone(), store, notifier)?);
//!
//! let realtime = Arc::new(RealtimeClient::new(config.realtime_url.clone()));
//! let mut flow = LoginFlow::new(Arc::clone(&api), realtime);
//! flow.submit("+15551234567").await?;
//! flow.drive().await;
//!
//! let _progress = api.get_progress().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod realtime;

pub use api::{ApiClient, ApiError};
pub use auth::{describe, AuthLost, AuthNotifier, AuthPhase, AuthStatus, LoginFlow, TokenStore};
pub use config::Config;
pub use realtime::{AuthEvent, RealtimeClient, RealtimeConnector, RealtimeError, Subscription};
