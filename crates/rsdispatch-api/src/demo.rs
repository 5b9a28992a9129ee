//! Demo resources served by the binary.
//!
//! `Widget` is a plain in-memory CRUD resource. `Gadget` references a
//! widget by id and reaches it through an inter-resource call, with an
//! extra `Widget: show` grant so callers need no direct widget access.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};

use rsdispatch_domain::platform_errors::codes;
use rsdispatch_domain::{
    Action, BodyValidator, ErrorEntry, ListParameters, Permissions, ResourceDescriptor, Verdict,
};
use rsdispatch_server::{Context, EndpointRegistry, HandlerResult, ResourceHandler};

/// Custom error raised when a widget name is taken.
pub const DUPLICATE_NAME: &str = "widget.duplicate_name";

type Row = Map<String, Value>;

/// Rows keyed by a monotonically assigned id.
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: DashMap<String, Row>,
    next_id: AtomicU64,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mut row: Row) -> Row {
        let id = (self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1).to_string();
        row.insert("id".to_string(), Value::String(id.clone()));
        row.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        self.rows.insert(id, row.clone());
        row
    }

    pub fn get(&self, id: &str) -> Option<Row> {
        self.rows.get(id).map(|r| r.value().clone())
    }

    pub fn replace(&self, id: &str, row: Row) {
        self.rows.insert(id.to_string(), row);
    }

    pub fn remove(&self, id: &str) -> Option<Row> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Applies search, filter, sort and paging. Returns the page and the
    /// size of the whole matching set.
    pub fn query(&self, list: &ListParameters) -> (Vec<Value>, u64) {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|row| {
                list.search_data.iter().all(|(key, needle)| {
                    text(row, key)
                        .to_lowercase()
                        .contains(&needle.to_lowercase())
                })
            })
            .filter(|row| {
                list.filter_data
                    .iter()
                    .all(|(key, wanted)| text(row, key) == *wanted)
            })
            .collect();

        rows.sort_by(|a, b| {
            list.sort_data
                .iter()
                .map(|(key, direction)| {
                    let ordering = text(a, key).cmp(&text(b, key));
                    if direction == "desc" {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(list.offset as usize)
            .take(list.limit as usize)
            .map(Value::Object)
            .collect();
        (page, total)
    }
}

fn text(row: &Row, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn body_object(ctx: &Context) -> Row {
    ctx.request
        .body
        .as_ref()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Requires listed fields to be non-empty strings on create, and any of
/// them present on update to be non-empty strings too.
#[derive(Debug, Clone)]
pub struct RequiredStrings(pub &'static [&'static str]);

impl BodyValidator for RequiredStrings {
    fn validate(&self, action: Action, body: &Value) -> Vec<ErrorEntry> {
        self.0
            .iter()
            .filter_map(|field| {
                let valid = match body.get(*field) {
                    Some(Value::String(s)) => !s.trim().is_empty(),
                    None => action == Action::Update,
                    Some(_) => false,
                };
                (!valid).then(|| {
                    ErrorEntry::new(
                        codes::GENERIC_INVALID_PARAMETERS,
                        format!("Field '{field}' must be a non-empty string"),
                    )
                    .with_reference(*field)
                })
            })
            .collect()
    }
}

// ============================================================
// Widget
// ============================================================

pub fn widget_descriptor() -> rsdispatch_domain::DomainResult<ResourceDescriptor> {
    ResourceDescriptor::builder("Widget", "widgets")
        .sort_key("created_at", ["desc", "asc"])
        .sort_key("name", ["asc", "desc"])
        .search(["name"])
        .filter(["colour"])
        .error(DUPLICATE_NAME, 409)
        .validator(Arc::new(RequiredStrings(&["name"])))
        .build()
}

#[derive(Debug, Default)]
pub struct WidgetHandler {
    table: MemoryTable,
}

impl WidgetHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.table.rows.iter().any(|r| {
            Some(r.key().as_str()) != except && r.value().get("name").and_then(Value::as_str) == Some(name)
        })
    }
}

#[async_trait]
impl ResourceHandler for WidgetHandler {
    async fn list(&self, ctx: &mut Context) -> HandlerResult {
        let (page, total) = self.table.query(&ctx.request.list);
        ctx.response.set_resources(page, Some(total));
        Ok(())
    }

    async fn show(&self, ctx: &mut Context) -> HandlerResult {
        let ident = ctx.request.ident().unwrap_or_default().to_string();
        match self.table.get(&ident) {
            Some(row) => ctx.response.set_resource(row),
            None => ctx.response.not_found(&ident),
        }
        Ok(())
    }

    async fn create(&self, ctx: &mut Context) -> HandlerResult {
        let body = body_object(ctx);
        let name = text(&body, "name");
        if self.name_taken(&name, None) {
            ctx.response.errors.add_with_reference(
                DUPLICATE_NAME,
                "A widget with this name already exists",
                name,
            );
            return Ok(());
        }
        let created = self.table.insert(body);
        ctx.response.set_resource(created);
        Ok(())
    }

    async fn update(&self, ctx: &mut Context) -> HandlerResult {
        let ident = ctx.request.ident().unwrap_or_default().to_string();
        let Some(mut row) = self.table.get(&ident) else {
            ctx.response.not_found(&ident);
            return Ok(());
        };

        let changes = body_object(ctx);
        if let Some(Value::String(name)) = changes.get("name") {
            if self.name_taken(name, Some(&ident)) {
                ctx.response.errors.add_with_reference(
                    DUPLICATE_NAME,
                    "A widget with this name already exists",
                    name.clone(),
                );
                return Ok(());
            }
        }
        for (key, value) in changes {
            if key != "id" && key != "created_at" {
                row.insert(key, value);
            }
        }
        self.table.replace(&ident, row.clone());
        ctx.response.set_resource(row);
        Ok(())
    }

    async fn delete(&self, ctx: &mut Context) -> HandlerResult {
        let ident = ctx.request.ident().unwrap_or_default().to_string();
        match self.table.remove(&ident) {
            Some(row) => ctx.response.set_resource(row),
            None => ctx.response.not_found(&ident),
        }
        Ok(())
    }
}

// ============================================================
// Gadget
// ============================================================

pub fn gadget_descriptor() -> rsdispatch_domain::DomainResult<ResourceDescriptor> {
    let mut widget_show = Permissions::grants();
    widget_show.set_resource("Widget", Action::Show, Verdict::Allow);

    ResourceDescriptor::builder("Gadget", "gadgets")
        .actions([Action::List, Action::Show, Action::Create, Action::Delete])
        .embeds(["widget"])
        .validator(Arc::new(RequiredStrings(&["name", "widget_id"])))
        .additional_permissions(Action::Show, widget_show.clone())
        .additional_permissions(Action::Create, widget_show)
        .build()
}

#[derive(Debug, Default)]
pub struct GadgetHandler {
    table: MemoryTable,
}

impl GadgetHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceHandler for GadgetHandler {
    async fn list(&self, ctx: &mut Context) -> HandlerResult {
        let (page, total) = self.table.query(&ctx.request.list);
        ctx.response.set_resources(page, Some(total));
        Ok(())
    }

    async fn show(&self, ctx: &mut Context) -> HandlerResult {
        let ident = ctx.request.ident().unwrap_or_default().to_string();
        let Some(mut row) = self.table.get(&ident) else {
            ctx.response.not_found(&ident);
            return Ok(());
        };

        if ctx.request.embeds.iter().any(|e| e == "widget") {
            let widget_id = text(&row, "widget_id");
            let widget = ctx.resource("Widget", 1).show(&widget_id, &[]).await?;
            if !widget.is_ok() {
                ctx.response.errors.merge(widget.errors);
                return Ok(());
            }
            let mut embedded = Map::new();
            embedded.insert(
                "widget".to_string(),
                Value::Object(widget.resource().cloned().unwrap_or_default()),
            );
            row.insert("_embed".to_string(), Value::Object(embedded));
        }

        ctx.response.set_resource(row);
        Ok(())
    }

    async fn create(&self, ctx: &mut Context) -> HandlerResult {
        let body = body_object(ctx);
        let widget_id = text(&body, "widget_id");

        let widget = ctx.resource("Widget", 1).show(&widget_id, &[]).await?;
        if !widget.is_ok() {
            ctx.response.errors.merge(widget.errors);
            return Ok(());
        }

        let created = self.table.insert(body);
        ctx.response.set_resource(created);
        Ok(())
    }

    async fn delete(&self, ctx: &mut Context) -> HandlerResult {
        let ident = ctx.request.ident().unwrap_or_default().to_string();
        match self.table.remove(&ident) {
            Some(row) => ctx.response.set_resource(row),
            None => ctx.response.not_found(&ident),
        }
        Ok(())
    }
}

/// Registry holding both demo resources.
pub fn demo_registry() -> anyhow::Result<EndpointRegistry> {
    let registry = EndpointRegistry::new()
        .with(widget_descriptor()?, Arc::new(WidgetHandler::new()))?
        .with(gadget_descriptor()?, Arc::new(GadgetHandler::new()))?;
    Ok(registry)
}
