//! Process-wide auth-lost notification.
//!
//! A broadcast signal emitted exactly when the refresh credential is
//! confirmed dead or a refresh attempt fails terminally. Listeners (a route
//! guard, a UI layer) react by sending the user back through the login flow.
//! Delivery is fire-and-forget: no acknowledgement, and a listener that
//! subscribes late does not see earlier signals.

use tokio::sync::broadcast;

/// Buffered signals per listener before lagging. Auth loss is rare and
/// idempotent to handle, so a small buffer suffices.
const CHANNEL_CAPACITY: usize = 16;

/// The auth-lost signal. Carries no payload; the only fact is that stored
/// credentials are unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthLost;

/// Handle for broadcasting and subscribing to the auth-lost signal.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct AuthNotifier {
    tx: broadcast::Sender<AuthLost>,
}

impl AuthNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast the signal. Returns the number of listeners that received it.
    pub fn notify(&self) -> usize {
        self.tx.send(AuthLost).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthLost> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new()
    }
}
