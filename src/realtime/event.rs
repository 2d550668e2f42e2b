use serde::Deserialize;
use tracing::{debug, warn};

/// Named authentication events delivered over the realtime channel.
///
/// Payloads are opaque to the login flow beyond the event name; the one
/// exception is the optional rejection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    BotStarted,
    PhoneShared,
    Approved,
    Rejected { reason: Option<String> },
}

/// Channel name for a login session's events.
pub fn channel_name(session_id: &str) -> String {
    format!("auth:{}", session_id)
}

/// Broadcast frame as it appears on the wire.
#[derive(Debug, Deserialize)]
struct BroadcastFrame {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode a text frame into an event. Unknown event names and unparseable
/// frames yield `None`; neither is fatal to the subscription.
pub(crate) fn decode_frame(text: &str) -> Option<AuthEvent> {
    let frame: BroadcastFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Discarding unparseable realtime frame");
            return None;
        }
    };

    match frame.event.as_str() {
        "bot_started" => Some(AuthEvent::BotStarted),
        "phone_shared" => Some(AuthEvent::PhoneShared),
        "auth_approved" => Some(AuthEvent::Approved),
        "auth_rejected" => Some(AuthEvent::Rejected {
            reason: frame
                .payload
                .get("reason")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }),
        other => {
            debug!(event = other, "Ignoring unknown realtime event");
            None
        }
    }
}
