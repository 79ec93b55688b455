//! Camera tile stream supervisors.
//!
//! The browser plays the streams and reports success or failure; this module
//! decides what each tile should be doing. `live` tiles stream while the camera
//! view is active and reconnect with a bounded backoff. `snapshot` tiles show
//! refreshed stills and stream on demand until a timeout. Leaving the camera
//! view stops every tile and cancels its timers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::{Panel, PanelContext, PanelSubscriptions, TimerSlot};
use crate::config::{CameraConfig, CameraMode};
use crate::error::{HomeboardError, HomeboardResult};
use crate::events::{channels, BusEvent};
use crate::hub::Backoff;
use crate::protocol_constants::{CAMERA_RETRY_BASE_MS, CAMERA_RETRY_MAX_MS};
use crate::utils::now_millis;

pub const PANEL_NAME: &str = "cameras";

const STATUS_CONNECTING: &str = "Connecting…";
const STATUS_RECONNECTING: &str = "Reconnecting…";
const STATUS_UNAVAILABLE: &str = "Stream unavailable";

/// What a tile is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TilePhase {
    /// Camera view inactive; nothing runs.
    Idle,
    /// Showing periodically refreshed snapshots.
    Snapshot,
    /// Waiting for the browser to report the stream playing.
    Connecting,
    Streaming,
    /// Waiting for the backoff delay before the next attempt.
    Reconnecting,
}

/// Appends `key=value` to `url`.
fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, value)
}

#[derive(Debug)]
struct TileState {
    phase: TilePhase,
    stream_type_index: usize,
    backoff: Backoff,
    status: Option<String>,
    snapshot_stamp: u64,
}

/// Render model of one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileModel {
    pub id: String,
    pub name: String,
    pub mode: CameraMode,
    pub phase: TilePhase,
    pub badge: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,
    pub snapshot_url: String,
}

struct CameraTile {
    config: CameraConfig,
    stream_types: Vec<String>,
    state: Mutex<TileState>,
    retry: TimerSlot,
    stop: TimerSlot,
    snapshots: TimerSlot,
}

impl CameraTile {
    fn new(config: CameraConfig, ctx: &PanelContext) -> Self {
        Self {
            stream_types: config.stream_types(),
            state: Mutex::new(TileState {
                phase: TilePhase::Idle,
                stream_type_index: 0,
                backoff: Backoff::new(
                    Duration::from_millis(CAMERA_RETRY_BASE_MS),
                    Duration::from_millis(CAMERA_RETRY_MAX_MS),
                ),
                status: None,
                snapshot_stamp: now_millis(),
            }),
            retry: TimerSlot::new(ctx.spawner.clone()),
            stop: TimerSlot::new(ctx.spawner.clone()),
            snapshots: TimerSlot::new(ctx.spawner.clone()),
            config,
        }
    }

    fn persistent(&self) -> bool {
        self.config.mode == CameraMode::Live
    }

    fn cancel_timers(&self) {
        self.retry.cancel();
        self.stop.cancel();
        self.snapshots.cancel();
    }

    fn model(&self) -> TileModel {
        let state = self.state.lock();
        let stream_type = self.stream_types.get(state.stream_type_index).cloned();
        let streaming = matches!(state.phase, TilePhase::Connecting | TilePhase::Streaming);
        let stream_url = streaming.then(|| match &stream_type {
            Some(t) => with_query(&self.config.stream_url, "type", t),
            None => self.config.stream_url.clone(),
        });
        TileModel {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            mode: self.config.mode,
            phase: state.phase,
            badge: if state.phase == TilePhase::Streaming {
                "Live"
            } else {
                "Snapshot"
            },
            status: state.status.clone(),
            stream_url,
            stream_type,
            snapshot_url: with_query(
                &self.config.snapshot_url,
                "t",
                &state.snapshot_stamp.to_string(),
            ),
        }
    }
}

/// Supervises every configured camera tile.
pub struct CameraPanel {
    ctx: PanelContext,
    tiles: Vec<CameraTile>,
    subs: PanelSubscriptions,
    weak_self: Weak<Self>,
}

impl CameraPanel {
    pub fn start(ctx: PanelContext, cameras: Vec<CameraConfig>) -> Arc<Self> {
        let panel = Arc::new_cyclic(|weak_self| Self {
            tiles: cameras
                .into_iter()
                .map(|config| CameraTile::new(config, &ctx))
                .collect(),
            ctx,
            subs: PanelSubscriptions::default(),
            weak_self: weak_self.clone(),
        });

        let weak = Arc::downgrade(&panel);
        panel
            .subs
            .push(panel.ctx.bus.subscribe(channels::VIEW_CHANGED, move |event| {
                if let (Some(panel), BusEvent::ViewChanged { view }) = (weak.upgrade(), event) {
                    if view == panel.ctx.views.camera_view() {
                        panel.activate();
                    } else {
                        panel.deactivate();
                    }
                }
            }));

        if panel.camera_view_active() {
            panel.activate();
        }
        panel
    }

    fn camera_view_active(&self) -> bool {
        self.ctx.views.is_active(self.ctx.views.camera_view())
    }

    fn tile(&self, camera_id: &str) -> HomeboardResult<&CameraTile> {
        self.tiles
            .iter()
            .find(|t| t.config.id == camera_id)
            .ok_or_else(|| HomeboardError::InvalidRequest(format!("unknown camera '{}'", camera_id)))
    }

    pub fn phase(&self, camera_id: &str) -> Option<TilePhase> {
        self.tile(camera_id).ok().map(|t| t.state.lock().phase)
    }

    /// Starts live tiles streaming and snapshot tiles refreshing.
    fn activate(&self) {
        log::debug!("[Panels] Camera view active, starting {} tile(s)", self.tiles.len());
        for tile in &self.tiles {
            if tile.persistent() {
                self.start_stream(tile);
            } else {
                self.show_snapshots(tile);
            }
        }
        self.publish();
    }

    /// Stops every tile and cancels all timers.
    fn deactivate(&self) {
        let mut changed = false;
        for tile in &self.tiles {
            tile.cancel_timers();
            let mut state = tile.state.lock();
            if state.phase != TilePhase::Idle {
                state.phase = TilePhase::Idle;
                state.status = None;
                state.backoff.reset();
                changed = true;
            }
        }
        if changed {
            log::debug!("[Panels] Camera view inactive, stopped all tiles");
            self.publish();
        }
    }

    fn start_stream(&self, tile: &CameraTile) {
        tile.retry.cancel();
        tile.stop.cancel();
        tile.snapshots.cancel();
        let mut state = tile.state.lock();
        state.phase = TilePhase::Connecting;
        state.status = Some(STATUS_CONNECTING.to_string());
    }

    fn show_snapshots(&self, tile: &CameraTile) {
        tile.retry.cancel();
        tile.stop.cancel();
        {
            let mut state = tile.state.lock();
            state.phase = TilePhase::Snapshot;
            state.snapshot_stamp = now_millis();
        }
        let weak = self.weak_self.clone();
        let id = tile.config.id.clone();
        tile.snapshots.schedule_repeating(
            Duration::from_millis(tile.config.snapshot_refresh_ms.max(1)),
            move || {
                if let Some(panel) = weak.upgrade() {
                    panel.refresh_snapshot(&id);
                }
            },
        );
    }

    fn refresh_snapshot(&self, camera_id: &str) {
        let Ok(tile) = self.tile(camera_id) else {
            return;
        };
        {
            let mut state = tile.state.lock();
            if state.phase != TilePhase::Snapshot {
                return;
            }
            state.snapshot_stamp = now_millis();
        }
        self.publish();
    }

    /// Handles a start/stop request from the browser.
    ///
    /// While the camera view is inactive, starts are ignored and stops leave
    /// the tile idle.
    pub fn request_stream(&self, camera_id: &str, start: bool) -> HomeboardResult<()> {
        let tile = self.tile(camera_id)?;
        if !self.camera_view_active() {
            log::debug!(
                "[Panels] Ignoring stream {} for {}: view inactive",
                if start { "start" } else { "stop" },
                camera_id
            );
            tile.cancel_timers();
            return Ok(());
        }
        if start {
            self.start_stream(tile);
        } else {
            self.show_snapshots(tile);
            tile.state.lock().status = None;
        }
        self.publish();
        Ok(())
    }

    /// Applies a playback report from the browser.
    pub fn report_stream_status(&self, camera_id: &str, ok: bool) -> HomeboardResult<()> {
        let tile = self.tile(camera_id)?;
        {
            let state = tile.state.lock();
            if !matches!(state.phase, TilePhase::Connecting | TilePhase::Streaming) {
                log::debug!(
                    "[Panels] Ignoring stream report for {} in phase {:?}",
                    camera_id,
                    state.phase
                );
                return Ok(());
            }
        }

        if ok {
            self.on_stream_ok(tile);
        } else {
            self.on_stream_failed(tile);
        }
        self.publish();
        Ok(())
    }

    fn on_stream_ok(&self, tile: &CameraTile) {
        {
            let mut state = tile.state.lock();
            state.phase = TilePhase::Streaming;
            state.status = None;
            state.backoff.reset();
        }
        if !tile.persistent() {
            let weak = self.weak_self.clone();
            let id = tile.config.id.clone();
            tile.stop
                .schedule(Duration::from_millis(tile.config.stream_timeout_ms), move || {
                    if let Some(panel) = weak.upgrade() {
                        log::debug!("[Panels] On-demand stream for {} timed out", id);
                        if let Err(e) = panel.request_stream(&id, false) {
                            log::warn!("[Panels] Failed to stop stream for {}: {}", id, e);
                        }
                    }
                });
        }
    }

    fn on_stream_failed(&self, tile: &CameraTile) {
        let persistent = tile.persistent();
        let delay = {
            let mut state = tile.state.lock();
            if !tile.stream_types.is_empty() {
                state.stream_type_index = (state.stream_type_index + 1) % tile.stream_types.len();
            }
            if persistent {
                state.phase = TilePhase::Reconnecting;
                state.status = Some(STATUS_RECONNECTING.to_string());
                Some(state.backoff.next_delay())
            } else {
                state.status = Some(STATUS_UNAVAILABLE.to_string());
                None
            }
        };

        match delay {
            Some(delay) => {
                log::warn!(
                    "[Panels] Stream for {} failed, retrying in {:?}",
                    tile.config.id,
                    delay
                );
                let weak = self.weak_self.clone();
                let id = tile.config.id.clone();
                tile.retry.schedule(delay, move || {
                    if let Some(panel) = weak.upgrade() {
                        panel.retry_stream(&id);
                    }
                });
            }
            None => {
                log::warn!(
                    "[Panels] On-demand stream for {} failed, back to snapshots",
                    tile.config.id
                );
                self.show_snapshots(tile);
            }
        }
    }

    fn retry_stream(&self, camera_id: &str) {
        let Ok(tile) = self.tile(camera_id) else {
            return;
        };
        if !self.camera_view_active() || tile.state.lock().phase != TilePhase::Reconnecting {
            return;
        }
        {
            // The retry task is the caller; only clear the other slots
            tile.stop.cancel();
            tile.snapshots.cancel();
            let mut state = tile.state.lock();
            state.phase = TilePhase::Connecting;
            state.status = Some(STATUS_RECONNECTING.to_string());
        }
        self.publish();
    }

    fn publish(&self) {
        self.ctx.publish_update(PANEL_NAME, self.snapshot());
    }
}

impl Panel for CameraPanel {
    fn name(&self) -> &str {
        PANEL_NAME
    }

    fn snapshot(&self) -> Value {
        let tiles: Vec<TileModel> = self.tiles.iter().map(CameraTile::model).collect();
        serde_json::json!({ "tiles": tiles })
    }

    fn shutdown(&self) {
        self.subs.clear();
        for tile in &self.tiles {
            tile.cancel_timers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panels::test_support::context;

    fn camera(id: &str, mode: CameraMode) -> CameraConfig {
        CameraConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            stream_url: format!("/cam/{}/stream", id),
            snapshot_url: format!("/cam/{}/snapshot.jpg", id),
            mode,
            stream_type: Some("mse".to_string()),
            stream_fallbacks: vec!["mjpeg".to_string()],
            snapshot_refresh_ms: 20_000,
            stream_timeout_ms: 90_000,
        }
    }

    fn tile_model(panel: &CameraPanel, index: usize) -> Value {
        panel.snapshot()["tiles"][index].clone()
    }

    fn start_on_cameras(cameras: Vec<CameraConfig>) -> (PanelContext, Arc<CameraPanel>) {
        let ctx = context();
        let panel = CameraPanel::start(ctx.clone(), cameras);
        ctx.views.switch_view("cameras").unwrap();
        (ctx, panel)
    }

    #[test]
    fn query_helper() {
        assert_eq!(with_query("/s", "type", "mse"), "/s?type=mse");
        assert_eq!(with_query("/s?a=1", "t", "5"), "/s?a=1&t=5");
    }

    #[tokio::test(start_paused = true)]
    async fn tiles_idle_until_camera_view() {
        let ctx = context();
        let panel = CameraPanel::start(ctx.clone(), vec![camera("porch", CameraMode::Live)]);
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));

        ctx.views.switch_view("cameras").unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Connecting));
        assert_eq!(tile_model(&panel, 0)["streamUrl"], "/cam/porch/stream?type=mse");
    }

    #[tokio::test(start_paused = true)]
    async fn stream_requests_ignored_off_camera_view() {
        let ctx = context();
        let panel = CameraPanel::start(ctx.clone(), vec![camera("porch", CameraMode::Snapshot)]);
        assert_eq!(ctx.views.current_view(), "home");

        panel.request_stream("porch", false).unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));
        assert!(!panel.tiles[0].snapshots.is_pending());

        panel.request_stream("porch", true).unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));
        assert!(!panel.tiles[0].stop.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn live_failures_cycle_types_and_back_off() {
        let (_ctx, panel) = start_on_cameras(vec![camera("porch", CameraMode::Live)]);

        panel.report_stream_status("porch", false).unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Reconnecting));
        assert_eq!(tile_model(&panel, 0)["status"], "Reconnecting…");

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(panel.phase("porch"), Some(TilePhase::Connecting));
        assert_eq!(tile_model(&panel, 0)["streamType"], "mjpeg");

        // Second failure waits 2 s
        panel.report_stream_status("porch", false).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(panel.phase("porch"), Some(TilePhase::Reconnecting));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(panel.phase("porch"), Some(TilePhase::Connecting));
        assert_eq!(tile_model(&panel, 0)["streamType"], "mse");

        panel.report_stream_status("porch", true).unwrap();
        assert_eq!(tile_model(&panel, 0)["badge"], "Live");
        assert_eq!(
            panel.tiles[0].state.lock().backoff.attempt(),
            0,
            "success resets the backoff"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_stream_times_out() {
        let (_ctx, panel) = start_on_cameras(vec![camera("garden", CameraMode::Snapshot)]);
        assert_eq!(panel.phase("garden"), Some(TilePhase::Snapshot));

        panel.request_stream("garden", true).unwrap();
        panel.report_stream_status("garden", true).unwrap();
        assert_eq!(panel.phase("garden"), Some(TilePhase::Streaming));

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(panel.phase("garden"), Some(TilePhase::Snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_failure_falls_back_to_snapshots() {
        let (_ctx, panel) = start_on_cameras(vec![camera("garden", CameraMode::Snapshot)]);
        panel.request_stream("garden", true).unwrap();
        panel.report_stream_status("garden", false).unwrap();

        assert_eq!(panel.phase("garden"), Some(TilePhase::Snapshot));
        assert_eq!(tile_model(&panel, 0)["status"], "Stream unavailable");
        assert!(!panel.tiles[0].retry.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_the_view_stops_everything() {
        let (ctx, panel) = start_on_cameras(vec![
            camera("porch", CameraMode::Live),
            camera("garden", CameraMode::Snapshot),
        ]);
        panel.report_stream_status("porch", false).unwrap();
        assert!(panel.tiles[0].retry.is_pending());
        assert!(panel.tiles[1].snapshots.is_pending());

        ctx.views.switch_view("home").unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));
        assert_eq!(panel.phase("garden"), Some(TilePhase::Idle));
        assert!(!panel.tiles[0].retry.is_pending());
        assert!(!panel.tiles[1].snapshots.is_pending());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));

        // Live streams resume on return
        ctx.views.switch_view("cameras").unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Connecting));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unknown_cameras_and_stale_reports() {
        let (ctx, panel) = start_on_cameras(vec![camera("porch", CameraMode::Live)]);
        assert_eq!(
            panel.report_stream_status("attic", true).unwrap_err().code(),
            "invalid_request"
        );

        ctx.views.switch_view("home").unwrap();
        panel.report_stream_status("porch", true).unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));
        panel.request_stream("porch", true).unwrap();
        assert_eq!(panel.phase("porch"), Some(TilePhase::Idle));
    }
}
