//! Demo tools available to scenario agents

use serde_json::{json, Map, Value};

use super::envelope::ToolEnvelope;
use super::registry::{ToolContext, ToolRegistry, ToolSpec};
use crate::error::Error;
use crate::mock::{CatalogSearch, QuerySpec};
use crate::Result;

const PRODUCT_SEARCH_MAX_LIMIT: i64 = 20;

impl ToolRegistry {
    pub fn builtin() -> Self {
        Self::new(vec![
            ToolSpec::new(
                "echo_context",
                "Echo text back along with the session context keys.",
                json!({
                    "type": "object",
                    "properties": { "text": { "type": "string", "default": "" } },
                    "additionalProperties": false
                }),
                echo_context,
            ),
            ToolSpec::new(
                "weather",
                "Get the current weather for a city.",
                json!({
                    "type": "object",
                    "properties": { "city": { "type": "string" } },
                    "required": ["city"],
                    "additionalProperties": false
                }),
                weather,
            )
            .roles(&["support", "assistant"]),
            ToolSpec::new(
                "product_search",
                "Search the product catalog for matching items.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "limit": { "type": "integer", "minimum": 1, "maximum": PRODUCT_SEARCH_MAX_LIMIT, "default": 3 }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
                product_search,
            )
            .roles(&["sales"]),
            ToolSpec::new(
                "catalog_search",
                "Filter, sort and page through the full catalog.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "category": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "price_min": { "type": "number" },
                        "price_max": { "type": "number" },
                        "sort": { "type": "string", "enum": ["price_asc", "price_desc", "rating_desc"] },
                        "page": { "type": "integer", "minimum": 1 },
                        "page_size": { "type": "integer", "minimum": 1, "maximum": 50 }
                    },
                    "additionalProperties": false
                }),
                catalog_search,
            )
            .roles(&["sales"]),
            ToolSpec::new(
                "ticket_search",
                "Search support tickets by text, status or tags.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "status": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } }
                    },
                    "additionalProperties": false
                }),
                ticket_search,
            )
            .roles(&["support"]),
            ToolSpec::new(
                "order_lookup",
                "Look up an order by id.",
                json!({
                    "type": "object",
                    "properties": { "order_id": { "type": "string" } },
                    "required": ["order_id"],
                    "additionalProperties": false
                }),
                order_lookup,
            )
            .roles(&["support", "sales"]),
            ToolSpec::new(
                "project_tasks",
                "List the tasks of a project, optionally by status or assignee.",
                json!({
                    "type": "object",
                    "properties": {
                        "project_id": { "type": "string" },
                        "status": { "type": "string" },
                        "assignee": { "type": "string" }
                    },
                    "required": ["project_id"],
                    "additionalProperties": false
                }),
                project_tasks,
            ),
            ToolSpec::new(
                "data_query",
                "Read-only query over the catalog, orders, tickets and projects tables.",
                json!({
                    "type": "object",
                    "properties": {
                        "table": { "type": "string", "enum": ["catalog", "orders", "tickets", "projects"] },
                        "where": { "type": "object" },
                        "select": { "type": "array", "items": { "type": "string" } },
                        "sort": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "field": { "type": "string" },
                                    "dir": { "type": "string", "enum": ["asc", "desc"] }
                                },
                                "required": ["field"]
                            }
                        },
                        "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
                        "offset": { "type": "integer", "minimum": 0 }
                    },
                    "required": ["table"],
                    "additionalProperties": false
                }),
                data_query,
            ),
        ])
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn strings_arg(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn echo_context(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let text = str_arg(args, "text").unwrap_or("");
    // serde_json::Map iterates in key order
    let keys: Vec<&String> = ctx.context.keys().collect();
    Ok(ToolEnvelope::ok("echo_context", args.clone(), json!({ "text": text, "ctx_keys": keys }))
        .with_prompts(["Show my session context keys", "Echo back the last user message"]))
}

fn weather(_ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let city = str_arg(args, "city").unwrap_or("");
    Ok(ToolEnvelope::ok(
        "weather",
        args.clone(),
        json!({ "city": city, "forecast": "sunny", "temp_c": 23 }),
    )
    .with_prompts([format!("Do you want a 5-day forecast for {}?", city)]))
}

fn product_search(_ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let query = str_arg(args, "query").unwrap_or("");
    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(3);
    if !(1..=PRODUCT_SEARCH_MAX_LIMIT).contains(&limit) {
        return Err(Error::InvalidInput(format!(
            "product_search: limit must be between 1 and {}",
            PRODUCT_SEARCH_MAX_LIMIT
        )));
    }
    let items = [
        json!({ "sku": "sku-1", "name": "Widget Pro", "price": 49.99 }),
        json!({ "sku": "sku-2", "name": "Widget Mini", "price": 19.99 }),
        json!({ "sku": "sku-3", "name": "Widget Max", "price": 89.99 }),
    ];
    let take = limit.clamp(1, items.len() as i64) as usize;
    Ok(ToolEnvelope::ok(
        "product_search",
        args.clone(),
        json!({ "query": query, "results": &items[..take] }),
    )
    .with_prompts(["Filter results by price under $50", "Show only accessories"]))
}

fn catalog_search(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let search: CatalogSearch = serde_json::from_value(Value::Object(args.clone()))?;
    let page = ctx.data.search_catalog(&search);
    let summary = format!("{} matching catalog items", page.total);
    let mut data = serde_json::to_value(&page)?;
    if let Some(obj) = data.as_object_mut() {
        obj.insert("summary".to_string(), Value::String(summary));
    }
    let mut facets = Map::new();
    for field in ["category", "brand"] {
        facets.insert(field.to_string(), json!(ctx.data.catalog_facets(field)));
    }
    let mut envelope = ToolEnvelope::ok("catalog_search", args.clone(), data)
        .with_prompts(["Sort by price", "Show only top rated items"]);
    envelope.meta = Some(Map::from_iter([("facets".to_string(), Value::Object(facets))]));
    Ok(envelope)
}

fn ticket_search(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let tickets = ctx.data.search_tickets(
        str_arg(args, "query"),
        str_arg(args, "status"),
        &strings_arg(args, "tags"),
    );
    Ok(ToolEnvelope::ok(
        "ticket_search",
        args.clone(),
        json!({ "summary": format!("{} tickets found", tickets.len()), "tickets": tickets }),
    ))
}

fn order_lookup(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let order_id = str_arg(args, "order_id").unwrap_or("");
    let data = match ctx.data.find_order(order_id) {
        Some(order) => json!({
            "order": order,
            "message": format!(
                "Order {} is {}",
                order_id,
                order.get("status").and_then(Value::as_str).unwrap_or("unknown")
            ),
        }),
        None => json!({ "order": null, "message": format!("No order found with id {}", order_id) }),
    };
    Ok(ToolEnvelope::ok("order_lookup", args.clone(), data))
}

fn project_tasks(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let project_id = str_arg(args, "project_id").unwrap_or("");
    let tasks = ctx
        .data
        .list_project_tasks(project_id, str_arg(args, "status"), str_arg(args, "assignee"))
        .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;
    Ok(ToolEnvelope::ok(
        "project_tasks",
        args.clone(),
        json!({ "summary": format!("{} tasks in {}", tasks.len(), project_id), "tasks": tasks }),
    ))
}

fn data_query(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolEnvelope> {
    let spec: QuerySpec = serde_json::from_value(Value::Object(args.clone()))?;
    let result = ctx.data.query(&spec);
    Ok(ToolEnvelope::ok("data_query", args.clone(), serde_json::to_value(&result)?))
}
