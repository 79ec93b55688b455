//! Now-playing strip.
//!
//! One slot per configured media player. A slot is only visible while its
//! player reports `playing`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::{replace_model, Panel, PanelContext, PanelSubscriptions};
use crate::config::MediaPlayerConfig;
use crate::events::{channels, BusEvent};
use crate::state::EntityRecord;
use crate::utils::resolve_hub_url;

pub const PANEL_NAME: &str = "media";

const PLAYING: &str = "playing";

/// Render model of one player slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSlot {
    pub entity_id: String,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    /// Playback position in 0..=1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl MediaSlot {
    fn hidden(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            visible: false,
            title: None,
            subtitle: None,
            source: None,
            artwork_url: None,
            progress: None,
        }
    }
}

/// Reads a numeric attribute, accepting numeric strings.
fn number_attr(record: &EntityRecord, key: &str) -> Option<f64> {
    let number = match record.attributes.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn non_empty_attr<'a>(record: &'a EntityRecord, key: &str) -> Option<&'a str> {
    record.attr_str(key).filter(|s| !s.is_empty())
}

/// Builds the slot model for `config` from its store record.
pub fn render_slot(
    config: &MediaPlayerConfig,
    record: Option<&EntityRecord>,
    hub_url: &str,
) -> MediaSlot {
    let Some(record) = record.filter(|r| r.state.as_deref() == Some(PLAYING)) else {
        return MediaSlot::hidden(&config.entity_id);
    };

    let title = non_empty_attr(record, "media_title").unwrap_or("Now Playing");
    let subtitle = non_empty_attr(record, "media_artist")
        .or_else(|| non_empty_attr(record, "media_album_name"))
        .or_else(|| non_empty_attr(record, "media_content_type"));
    let source = config
        .label
        .as_deref()
        .filter(|l| !l.is_empty())
        .or_else(|| non_empty_attr(record, "friendly_name"))
        .unwrap_or("Media");
    let artwork_url =
        non_empty_attr(record, "entity_picture").map(|path| resolve_hub_url(hub_url, path));

    let progress = match (
        number_attr(record, "media_position"),
        number_attr(record, "media_duration"),
    ) {
        (Some(position), Some(duration)) if duration > 0.0 => {
            Some((position / duration).clamp(0.0, 1.0))
        }
        _ => None,
    };

    MediaSlot {
        entity_id: config.entity_id.clone(),
        visible: true,
        title: Some(title.to_string()),
        subtitle: subtitle.map(str::to_string),
        source: Some(source.to_string()),
        artwork_url,
        progress,
    }
}

pub struct MediaPanel {
    ctx: PanelContext,
    players: Vec<MediaPlayerConfig>,
    model: Mutex<Value>,
    subs: PanelSubscriptions,
}

impl MediaPanel {
    pub fn start(ctx: PanelContext, players: Vec<MediaPlayerConfig>) -> Arc<Self> {
        let panel = Arc::new(Self {
            ctx,
            players,
            model: Mutex::new(Value::Null),
            subs: PanelSubscriptions::default(),
        });
        *panel.model.lock() = panel.render();

        let weak = Arc::downgrade(&panel);
        panel.subs.push(
            panel
                .ctx
                .bus
                .subscribe(channels::ENTITY_UPDATED, move |event| {
                    let (Some(panel), BusEvent::EntityUpdated { entity_id }) =
                        (weak.upgrade(), event)
                    else {
                        return;
                    };
                    if panel.tracks(entity_id) {
                        panel.refresh();
                    }
                }),
        );

        for channel in [channels::CONNECTED, channels::VIEW_CHANGED] {
            let weak = Arc::downgrade(&panel);
            panel.subs.push(panel.ctx.bus.subscribe(channel, move |_| {
                if let Some(panel) = weak.upgrade() {
                    panel.refresh();
                }
            }));
        }

        panel
    }

    fn tracks(&self, entity_id: &str) -> bool {
        self.players.iter().any(|p| p.entity_id == entity_id)
    }

    fn render(&self) -> Value {
        let slots: Vec<MediaSlot> = self
            .players
            .iter()
            .map(|player| {
                let record = self.ctx.store.get(&player.entity_id);
                render_slot(player, record.as_ref(), &self.ctx.hub_url)
            })
            .collect();
        serde_json::json!({ "slots": slots })
    }

    /// Re-renders every slot and publishes if anything changed.
    pub fn refresh(&self) {
        if let Some(model) = replace_model(&self.model, self.render()) {
            self.ctx.publish_update(PANEL_NAME, model);
        }
    }
}

impl Panel for MediaPanel {
    fn name(&self) -> &str {
        PANEL_NAME
    }

    fn snapshot(&self) -> Value {
        self.model.lock().clone()
    }

    fn shutdown(&self) {
        self.subs.clear();
    }
}
