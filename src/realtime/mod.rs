//! Realtime channel for login approval events.
//!
//! Login sessions subscribe to a session-scoped channel and receive named
//! broadcast events (`bot_started`, `phone_shared`, `auth_approved`,
//! `auth_rejected`) as the external bot walks the user through approval.
//!
//! The login flow depends only on the [`RealtimeConnector`] and
//! [`Subscription`] traits; [`websocket::RealtimeClient`] is the production
//! transport.

pub mod event;
pub mod websocket;

pub use event::{channel_name, AuthEvent};
pub use websocket::RealtimeClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Failed to connect realtime channel: {0}")]
    Connect(String),

    #[error("Realtime transport error: {0}")]
    Transport(String),
}

/// Opens subscriptions to session-scoped channels.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, RealtimeError>;
}

/// A live subscription to one channel.
///
/// The transport does not expire subscriptions on its own; the owner must
/// call [`Subscription::release`] when the login session ends.
#[async_trait]
pub trait Subscription: Send {
    /// Next event in transport delivery order. `None` once the stream ends
    /// or the subscription has been released.
    async fn next_event(&mut self) -> Option<AuthEvent>;

    /// Tear down the underlying connection.
    fn release(&mut self);
}
