//! Async driver for [`RealtimeClient`].
//!
//! [`HubConnection`] is the only owner of the hub socket. It opens the
//! connection, feeds frames into the state machine, writes the outbox back out
//! and sleeps between attempts. Every failure ends the current session and
//! schedules the next one; nothing here terminates the process.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::client::{FrameOutcome, RealtimeClient};
use super::{Generation, HubError};
use crate::utils::websocket_url;

/// Why a session ended.
enum SessionEnd {
    /// The transport closed or the hub rejected us; reconnect later.
    Closed(String),
    /// Shutdown was requested.
    Cancelled,
}

/// Connection loop for the hub WebSocket API.
pub struct HubConnection {
    client: Arc<RealtimeClient>,
    url: String,
    connect_timeout: Duration,
}

impl HubConnection {
    /// Creates a driver for `client`.
    ///
    /// Fails if the hub is disabled or its URL cannot be turned into a
    /// WebSocket URL.
    pub fn new(client: Arc<RealtimeClient>) -> Result<Self, HubError> {
        let config = client.config();
        if !config.enabled {
            return Err(HubError::Disabled);
        }
        let url =
            websocket_url(&config.url).ok_or_else(|| HubError::InvalidUrl(config.url.clone()))?;
        let connect_timeout = config.connect_timeout();

        Ok(Self {
            client,
            url,
            connect_timeout,
        })
    }

    /// WebSocket URL, e.g. `ws://hub.local:8123/api/websocket`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs until `cancel` fires, reconnecting after every session.
    pub async fn run(self, cancel: CancellationToken) {
        log::info!("[Hub] Starting connection loop for {}", self.url);

        while !cancel.is_cancelled() {
            let Some(generation) = self.client.begin_connect() else {
                log::warn!(
                    "[Hub] Cannot start a connection attempt while {}",
                    self.client.state()
                );
                break;
            };

            let reason = match self.run_session(generation, &cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    self.client.transport_closed(generation, "shutdown");
                    break;
                }
                Ok(SessionEnd::Closed(reason)) => reason,
                Err(e) => {
                    log::warn!("[Hub] Connection to {} failed: {}", self.url, e);
                    e.to_string()
                }
            };

            let delay = self
                .client
                .transport_closed(generation, &reason)
                .unwrap_or_else(|| {
                    log::debug!(
                        "[Hub] Close for generation {} was not current, using default delay",
                        generation
                    );
                    self.client.config().reconnect_interval()
                });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        log::info!("[Hub] Connection loop stopped");
    }

    async fn run_session(
        &self,
        generation: Generation,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, HubError> {
        let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
        let (socket, _response) = tokio::select! {
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = connect => result.map_err(|_| HubError::ConnectTimeout(self.connect_timeout))??,
        };

        log::info!("[Hub] Transport open to {}", self.url);
        self.client.transport_opened(generation);
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = self.client.outbox_notified() => {
                    flush_outbox(&self.client, &mut sink).await?;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = self.client.handle_frame(generation, text.as_str());
                        flush_outbox(&self.client, &mut sink).await?;
                        if outcome == FrameOutcome::Close {
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(SessionEnd::Closed("authentication rejected".to_string()));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by hub".to_string());
                        return Ok(SessionEnd::Closed(reason));
                    }
                    // Pings are answered by tungstenite; binary frames are not part of the API
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Closed("stream ended".to_string())),
                },
            }
        }
    }
}

/// Sends every queued frame.
async fn flush_outbox<S>(client: &RealtimeClient, sink: &mut S) -> Result<(), HubError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    for frame in client.drain_outbox() {
        sink.send(Message::Text(frame.into())).await?;
    }
    Ok(())
}
