//! Authentication module: credential lifecycle and the login flow.
//!
//! This module provides:
//! - `TokenStore`: the access/refresh credential pair with expiry skew and
//!   durable persistence
//! - `LoginFlow`: the phone-number login state machine driven by realtime
//!   approval events
//! - `AuthNotifier`: the process-wide auth-lost broadcast

pub mod login;
pub mod notify;
pub mod token_store;

pub use login::{describe, AuthPhase, AuthStatus, LoginFlow, LoginSession};
pub use notify::{AuthLost, AuthNotifier};
pub use token_store::{StoredToken, TokenPair, TokenStore};
