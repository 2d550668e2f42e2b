//! WebSocket transport for the realtime channel.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Bytes;
use tracing::{debug, error};

use super::event::{decode_frame, AuthEvent};
use super::{RealtimeConnector, RealtimeError, Subscription};

/// Buffered events per subscription before the reader applies backpressure.
const EVENT_BUFFER_SIZE: usize = 64;

/// Heartbeat interval keeping idle connections open through proxies.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// First frame sent after connecting, binding the socket to one channel.
#[derive(Serialize)]
struct SubscribeFrame<'a> {
    action: &'static str,
    channel: &'a str,
}

/// WebSocket connector for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RealtimeConnector for RealtimeClient {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, RealtimeError> {
        let (mut ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        let join = serde_json::to_string(&SubscribeFrame {
            action: "subscribe",
            channel,
        })
        .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        ws_stream
            .send(Message::Text(join.into()))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        debug!(channel, "Realtime subscription opened");

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let channel_owned = channel.to_string();

        let task = tokio::spawn(async move {
            let mut heartbeat =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        if let Err(e) = ws_stream.send(Message::Ping(Bytes::new())).await {
                            error!(channel = %channel_owned, error = %e, "Failed to send heartbeat");
                            break;
                        }
                    }

                    msg = ws_stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = decode_frame(text.as_str()) {
                                if event_tx.send(event).await.is_err() {
                                    break; // Subscriber gone
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(channel = %channel_owned, "Realtime stream closed");
                            break;
                        }
                        Some(Ok(_)) => {} // binary/ping/pong frames carry no events
                        Some(Err(e)) => {
                            error!(channel = %channel_owned, error = %e, "Realtime transport error");
                            break;
                        }
                    },

                    _ = shutdown_rx.recv() => {
                        let _ = ws_stream.close(None).await;
                        break;
                    }
                }
            }
            debug!(channel = %channel_owned, "Realtime read task stopped");
        });

        Ok(Box::new(WsSubscription {
            channel: channel.to_string(),
            events: event_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }))
    }
}

/// Handle to one open channel subscription.
struct WsSubscription {
    channel: String,
    events: mpsc::Receiver<AuthEvent>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Subscription for WsSubscription {
    async fn next_event(&mut self) -> Option<AuthEvent> {
        self.events.recv().await
    }

    fn release(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(channel = %self.channel, "Realtime subscription released");
        }
    }
}

impl Drop for WsSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
