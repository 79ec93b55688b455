//! Upstream JSON feed pollers.
//!
//! Calendar, commute, media-session and weather data arrive as opaque JSON
//! from auxiliary HTTP services. Each feed panel polls one URL, keeps the last
//! good payload, and reports `unavailable` while the upstream is failing.
//! Feed failures stay local to the feed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{Panel, PanelContext};
use crate::config::FeedConfig;
use crate::runtime::TaskSpawner;
use crate::utils::now_millis;

/// Errors from fetching an upstream feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The request could not be sent or the body not read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("HTTP error status: {0}")]
    HttpStatus(StatusCode),

    /// The body was not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A source of feed payloads.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FeedError>;
}

/// Fetches a feed with an HTTP GET.
pub struct HttpFeedSource {
    client: Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Value, FeedError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Health of a feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedStatus {
    /// No fetch has completed yet.
    Pending,
    Ok {
        #[serde(rename = "fetchedAt")]
        fetched_at: u64,
    },
    Unavailable {
        error: String,
        since: u64,
    },
}

struct FeedState {
    status: FeedStatus,
    data: Option<Value>,
}

/// Polls one feed and publishes its payload as a panel.
pub struct FeedPanel {
    ctx: PanelContext,
    name: String,
    source: Arc<dyn FeedSource>,
    interval: Duration,
    state: Mutex<FeedState>,
    cancel: CancellationToken,
}

impl FeedPanel {
    /// Creates a feed panel. Polling starts with [`FeedPanel::start`].
    ///
    /// `parent` is the dashboard token; cancelling it stops the poller.
    pub fn new(
        ctx: PanelContext,
        name: impl Into<String>,
        source: Arc<dyn FeedSource>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            name: name.into(),
            source,
            interval,
            state: Mutex::new(FeedState {
                status: FeedStatus::Pending,
                data: None,
            }),
            cancel: parent.child_token(),
        })
    }

    /// Builds an HTTP feed from configuration.
    pub fn from_config(
        ctx: PanelContext,
        config: &FeedConfig,
        client: Client,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let source = Arc::new(HttpFeedSource::new(client, config.url.clone()));
        Self::new(ctx, config.name.clone(), source, config.poll_interval(), parent)
    }

    pub fn status(&self) -> FeedStatus {
        self.state.lock().status.clone()
    }

    /// Fetches once and records the outcome.
    ///
    /// A failure keeps the last good payload.
    pub async fn poll_once(&self) -> Result<(), FeedError> {
        let result = self.source.fetch().await;
        let outcome = {
            let mut state = self.state.lock();
            match result {
                Ok(data) => {
                    if matches!(state.status, FeedStatus::Unavailable { .. }) {
                        log::info!("[Feed] {} recovered", self.name);
                    }
                    state.data = Some(data);
                    state.status = FeedStatus::Ok {
                        fetched_at: now_millis(),
                    };
                    Ok(())
                }
                Err(e) => {
                    let since = match &state.status {
                        FeedStatus::Unavailable { since, .. } => *since,
                        _ => now_millis(),
                    };
                    state.status = FeedStatus::Unavailable {
                        error: e.to_string(),
                        since,
                    };
                    Err(e)
                }
            }
        };

        if let Err(e) = &outcome {
            log::warn!("[Feed] {} unavailable: {}", self.name, e);
        }
        self.ctx.publish_update(&self.name, self.snapshot());
        outcome
    }

    /// Spawns the polling loop. The first fetch happens immediately.
    pub fn start(self: &Arc<Self>) {
        let feed = Arc::clone(self);
        log::info!(
            "[Feed] Polling {} every {:?}",
            feed.name,
            feed.interval
        );
        self.ctx.spawner.spawn(async move {
            let mut interval = tokio::time::interval(feed.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = feed.cancel.cancelled() => {
                        log::debug!("[Feed] {} poller stopped", feed.name);
                        break;
                    }
                    _ = interval.tick() => {
                        // Errors are recorded in the feed state
                        let _ = feed.poll_once().await;
                    }
                }
            }
        });
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Panel for FeedPanel {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Value {
        let state = self.state.lock();
        let mut model = serde_json::to_value(&state.status).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut model {
            map.insert(
                "data".to_string(),
                state.data.clone().unwrap_or(Value::Null),
            );
        }
        model
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}
