//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services and panels of one dashboard instance are instantiated and wired
//! together. Nothing here is global, so independent instances can coexist in
//! one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::config::Config;
use crate::error::{HomeboardError, HomeboardResult};
use crate::events::{ClientEventBridge, EventBus};
use crate::hub::{HubConnection, HubError, ListItemsRequester, RealtimeClient};
use crate::panels::{
    CameraPanel, ConnectionStatusPanel, DoorbellPanel, FeedPanel, MediaPanel, MotionViewController,
    PanelContext, PanelRegistry, TodoPanel,
};
use crate::protocol_constants::FEED_HTTP_TIMEOUT_SECS;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{CommandRegistry, EventRouter, ViewManager};
use crate::state::EntityStore;

/// One fully wired dashboard instance.
pub struct Dashboard {
    pub config: Arc<Config>,
    pub bus: EventBus,
    pub store: Arc<EntityStore>,
    pub views: Arc<ViewManager>,
    pub client: Arc<RealtimeClient>,
    pub commands: Arc<CommandRegistry>,
    /// Held for its subscriptions; dropping it stops routing.
    router: EventRouter,
    pub panels: Arc<PanelRegistry>,
    pub cameras: Arc<CameraPanel>,
    pub doorbell: Arc<DoorbellPanel>,
    pub feeds: Vec<Arc<FeedPanel>>,
    pub event_bridge: Arc<ClientEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
    pub spawner: TokioSpawner,
    pub cancel_token: CancellationToken,
    started: AtomicBool,
}

impl Dashboard {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Number of bus subscriptions held by the event router.
    pub fn router_subscriptions(&self) -> usize {
        self.router.subscription_count()
    }

    /// Builds the state shared by the API handlers.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            Arc::clone(&self.views),
            Arc::clone(&self.panels),
            Arc::clone(&self.cameras),
            Arc::clone(&self.doorbell),
            Arc::clone(&self.event_bridge),
            Arc::clone(&self.ws_manager),
        )
    }

    /// Spawns the hub connection loop and the feed pollers.
    ///
    /// Must be called from within a tokio runtime. Subsequent calls are no-ops.
    pub fn start_background_tasks(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            log::debug!("[Bootstrap] Background tasks already running");
            return;
        }

        match HubConnection::new(Arc::clone(&self.client)) {
            Ok(connection) => {
                let cancel = self.cancel_token.clone();
                self.spawner.spawn(async move { connection.run(cancel).await });
            }
            Err(HubError::Disabled) => {
                log::info!("[Bootstrap] Hub integration disabled, not connecting");
            }
            Err(e) => {
                // Unreachable after validation; the dashboard still serves cached state
                log::error!("[Bootstrap] Cannot start hub connection: {}", e);
            }
        }

        for feed in &self.feeds {
            feed.start();
        }
        log::info!(
            "[Bootstrap] Background tasks started ({} feed(s))",
            self.feeds.len()
        );
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Stops the hub connection and feed pollers, closes browser sessions and
    /// releases every panel timer.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        self.panels.shutdown_all();
        self.event_bridge.detach();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for feed polling.
fn create_http_client() -> HomeboardResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(FEED_HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| HomeboardError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps a dashboard instance with all its dependencies.
///
/// The wiring order matters - components are created in dependency order:
///
/// 1. Shared infrastructure (spawner, HTTP client, bus, cancellation token)
/// 2. Shared state (entity store, view manager)
/// 3. Realtime client (depends on bus)
/// 4. Command registry and event router (depend on store, client, views)
/// 5. Panels (depend on the panel context and command registry)
/// 6. Event bridge (depends on bus and store)
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`HomeboardError::Configuration`] if `config` fails validation.
pub fn bootstrap_dashboard(config: &Config) -> HomeboardResult<Dashboard> {
    config.validate().map_err(HomeboardError::Configuration)?;
    let config = Arc::new(config.clone());

    let spawner = TokioSpawner::current();
    let http_client = create_http_client()?;
    let bus = EventBus::new();
    let cancel_token = CancellationToken::new();

    let store = Arc::new(EntityStore::new());
    let views = Arc::new(ViewManager::new(config.views.clone(), bus.clone()));

    let client = Arc::new(RealtimeClient::new(config.hub.clone(), bus.clone()));

    let commands = Arc::new(CommandRegistry::new());
    commands.register_switch_view(Arc::clone(&views));
    let router = EventRouter::start(
        &bus,
        Arc::clone(&store),
        Arc::clone(&client) as Arc<dyn ListItemsRequester>,
        Arc::clone(&commands),
        &config.hub,
    );

    let ctx = PanelContext {
        bus: bus.clone(),
        store: Arc::clone(&store),
        views: Arc::clone(&views),
        spawner: spawner.clone(),
        hub_url: config.hub.url.clone(),
    };
    let panel_config = &config.panels;

    let panels = Arc::new(PanelRegistry::new());
    panels.register(ConnectionStatusPanel::start(ctx.clone(), client.state()));
    panels.register(MediaPanel::start(
        ctx.clone(),
        panel_config.media_players.clone(),
    ));
    panels.register(TodoPanel::start(ctx.clone(), panel_config.todo.clone()));
    panels.register(MotionViewController::start(
        ctx.clone(),
        panel_config.motion_view.clone(),
    ));

    let doorbell = DoorbellPanel::start(ctx.clone(), panel_config.doorbell.clone(), &commands);
    panels.register(doorbell.clone());

    let cameras = CameraPanel::start(ctx.clone(), panel_config.cameras.clone());
    panels.register(cameras.clone());

    let feeds: Vec<Arc<FeedPanel>> = config
        .feeds
        .iter()
        .map(|feed| FeedPanel::from_config(ctx.clone(), feed, http_client.clone(), &cancel_token))
        .collect();
    for feed in &feeds {
        panels.register(feed.clone());
    }

    let event_bridge = Arc::new(ClientEventBridge::new(config.event_channel_capacity));
    event_bridge.attach(&bus, Arc::clone(&store));

    let ws_manager = Arc::new(WsConnectionManager::new());

    log::info!(
        "[Bootstrap] Dashboard ready: {} panel(s), {} command(s), view '{}'",
        panels.len(),
        commands.names().len(),
        views.current_view()
    );

    Ok(Dashboard {
        config,
        bus,
        store,
        views,
        client,
        commands,
        router,
        panels,
        cameras,
        doorbell,
        feeds,
        event_bridge,
        ws_manager,
        http_client,
        spawner,
        cancel_token,
        started: AtomicBool::new(false),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A dashboard with the hub disabled, customised by `configure`.
    pub(crate) fn dashboard(configure: impl FnOnce(&mut Config)) -> Dashboard {
        let mut config = Config::default();
        config.hub.enabled = false;
        configure(&mut config);
        bootstrap_dashboard(&config).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::dashboard;
    use super::*;
    use crate::config::FeedConfig;
    use crate::events::{channels, BusEvent};
    use crate::panels::FeedStatus;
    use serde_json::json;

    #[test]
    fn http_client_is_created() {
        let client = create_http_client().unwrap();
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.hub.url = "http://hub.local:8123".to_string();
        config.hub.token.clear();

        let err = bootstrap_dashboard(&config).err().unwrap();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn wires_panels_and_commands() {
        let dashboard = dashboard(|config| {
            config.feeds.push(FeedConfig {
                name: "weather".into(),
                url: "http://127.0.0.1:9/weather".into(),
                poll_interval_secs: 600,
            });
        });

        let mut names = dashboard.panels.names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cameras",
                "connection_status",
                "doorbell",
                "media",
                "motion_view",
                "todo",
                "weather"
            ]
        );
        assert!(dashboard.commands.contains("switch_view"));
        assert!(dashboard.commands.contains("doorbell_overlay"));
        assert_eq!(dashboard.router_subscriptions(), 4);
    }

    #[tokio::test]
    async fn command_events_switch_views() {
        let dashboard = dashboard(|_| {});
        let mut events = dashboard.event_bridge.subscribe();

        dashboard.bus.publish(BusEvent::HubEvent {
            event_type: dashboard.config.hub.command_event_type.clone(),
            data: json!({"command": "switch_view", "view": "cameras"}),
        });

        assert_eq!(dashboard.views.current_view(), "cameras");
        let forwarded = serde_json::to_value(events.recv().await.unwrap()).unwrap();
        assert_eq!(forwarded["category"], "view");
        assert_eq!(forwarded["view"], "cameras");
    }

    #[tokio::test]
    async fn instances_are_independent() {
        let first = dashboard(|_| {});
        let second = dashboard(|_| {});

        first.views.switch_view("cameras").unwrap();
        assert_eq!(second.views.current_view(), "home");

        first.shutdown();
        assert!(!second.cancel_token.is_cancelled());
        assert!(second.bus.listener_count(channels::VIEW_CHANGED) > 0);
    }

    #[tokio::test]
    async fn shutdown_stops_feeds_and_sessions() {
        let dashboard = dashboard(|config| {
            config.feeds.push(FeedConfig {
                name: "commute".into(),
                url: "http://127.0.0.1:9/commute".into(),
                poll_interval_secs: 600,
            });
        });
        dashboard.start_background_tasks();
        dashboard.start_background_tasks();

        let guard = dashboard.ws_manager.register();
        dashboard.shutdown();

        assert!(guard.cancel_token().is_cancelled());
        assert!(dashboard.cancel_token.is_cancelled());
        assert!(dashboard.feeds.iter().all(|f| f.is_stopped()));
        assert!(!matches!(dashboard.feeds[0].status(), FeedStatus::Ok { .. }));
    }
}
