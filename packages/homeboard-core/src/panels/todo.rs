//! Todo and shopping list panels.
//!
//! Items come from the list entity's `items` attribute, which the event router
//! fills from list-item responses. Completed items are hidden.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::{replace_model, Panel, PanelContext, PanelSubscriptions};
use crate::config::TodoPanelConfig;
use crate::events::{channels, BusEvent};
use crate::protocol_constants::{ALL_LIST_ITEMS_ATTRIBUTE, LIST_ITEMS_ATTRIBUTE};
use crate::state::EntityRecord;

pub const PANEL_NAME: &str = "todo";

const EMPTY_TODO: &str = "No tasks";
const EMPTY_SHOPPING: &str = "No shopping items";

/// A rendered list item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    pub days_left: String,
}

/// Rendered list with its empty-state placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub entity_id: String,
    pub items: Vec<TodoItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

fn item_text<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn is_completed(item: &Value) -> bool {
    item.get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("completed"))
}

/// Parses a due date given as a date, an RFC 3339 timestamp or a naive
/// date-time.
pub fn parse_due(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Label for the number of days until `due`.
pub fn days_left_label(due: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(due) = due else {
        return "—".to_string();
    };
    match (due - today).num_days() {
        d if d < 0 => "Overdue".to_string(),
        0 => "Today".to_string(),
        1 => "1 day".to_string(),
        d => format!("{} days", d),
    }
}

fn list_items(record: Option<&EntityRecord>) -> Vec<Value> {
    let Some(record) = record else {
        return Vec::new();
    };
    record
        .attributes
        .get(LIST_ITEMS_ATTRIBUTE)
        .or_else(|| record.attributes.get(ALL_LIST_ITEMS_ATTRIBUTE))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn open_items(record: Option<&EntityRecord>, today: NaiveDate) -> Vec<TodoItem> {
    list_items(record)
        .iter()
        .filter(|item| !is_completed(item))
        .map(|item| {
            let due = item_text(item, &["due", "due_date", "dueDate"]).and_then(parse_due);
            TodoItem {
                summary: item_text(item, &["summary", "name", "title"])
                    .unwrap_or("Untitled")
                    .to_string(),
                due,
                days_left: days_left_label(due, today),
            }
        })
        .collect()
}

/// Dated items first by due date, then undated; ties by summary.
fn by_due_then_summary(a: &TodoItem, b: &TodoItem) -> Ordering {
    match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.summary.cmp(&b.summary)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.summary.cmp(&b.summary),
    }
}

/// Renders the todo list, sorted by due date.
pub fn render_todo(entity_id: &str, record: Option<&EntityRecord>, today: NaiveDate) -> TodoList {
    let mut items = open_items(record, today);
    items.sort_by(by_due_then_summary);
    TodoList {
        entity_id: entity_id.to_string(),
        placeholder: items.is_empty().then_some(EMPTY_TODO),
        items,
    }
}

/// Renders the shopping list in hub order.
pub fn render_shopping(
    entity_id: &str,
    record: Option<&EntityRecord>,
    today: NaiveDate,
) -> TodoList {
    let items = open_items(record, today);
    TodoList {
        entity_id: entity_id.to_string(),
        placeholder: items.is_empty().then_some(EMPTY_SHOPPING),
        items,
    }
}

pub struct TodoPanel {
    ctx: PanelContext,
    config: TodoPanelConfig,
    model: Mutex<Value>,
    subs: PanelSubscriptions,
}

impl TodoPanel {
    pub fn start(ctx: PanelContext, config: TodoPanelConfig) -> Arc<Self> {
        let panel = Arc::new(Self {
            ctx,
            config,
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
                    if *entity_id == panel.config.todo_entity
                        || *entity_id == panel.config.shopping_entity
                    {
                        panel.refresh();
                    }
                }),
        );

        let weak = Arc::downgrade(&panel);
        panel
            .subs
            .push(panel.ctx.bus.subscribe(channels::CONNECTED, move |_| {
                if let Some(panel) = weak.upgrade() {
                    panel.refresh();
                }
            }));

        panel
    }

    fn render(&self) -> Value {
        let today = Local::now().date_naive();
        let todo = self.ctx.store.get(&self.config.todo_entity);
        let shopping = self.ctx.store.get(&self.config.shopping_entity);
        serde_json::json!({
            "todo": render_todo(&self.config.todo_entity, todo.as_ref(), today),
            "shopping": render_shopping(&self.config.shopping_entity, shopping.as_ref(), today),
        })
    }

    pub fn refresh(&self) {
        if let Some(model) = replace_model(&self.model, self.render()) {
            self.ctx.publish_update(PANEL_NAME, model);
        }
    }
}

impl Panel for TodoPanel {
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
