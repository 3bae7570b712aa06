use std::sync::Arc;

use anyhow::{Context, Result};
use bstock_client::{
    identifier::{classify_page_url, extract_identifier, looks_like_url, normalize_url, product_url_for},
    store::AddOutcome,
    types::TrackedItem,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    i18n::Messages,
    markdown,
    state::{AppContext, CommandDefinition, CommandHandler, CommandResponse},
    InputError,
};

use super::{parse_args, text_response, wrap_handler};

#[derive(Deserialize)]
struct AddItemArgs {
    input: String,
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
struct ClearItemsArgs {
    ids: Vec<String>,
}

fn url_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": description
            }
        },
        "required": ["url"]
    })
}

pub fn add_item_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "add_item".to_string(),
            description: "Start tracking a product page, given its URL or article ID".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Product URL (scheme optional) or numeric article ID"
                    }
                },
                "required": ["input"]
            }),
        },
        wrap_handler(handle_add_item),
    )
}

/// Turns user input into a new tracked item. URLs keep their normalized form;
/// bare ids are expanded against the storefront.
pub(crate) fn item_from_input(
    input: &str,
    site_base_url: &str,
    messages: &Messages,
) -> Result<TrackedItem, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty(messages.enter_url));
    }
    let id = extract_identifier(input).ok_or(InputError::Invalid(messages.invalid_url))?;
    let url = if looks_like_url(input) {
        normalize_url(input)
    } else {
        product_url_for(&id, site_base_url)
    };
    Ok(TrackedItem::new(id, url))
}

async fn handle_add_item(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: AddItemArgs = parse_args(value)?;
    let messages = Messages::for_language(context.store.settings().await.language);
    let item = item_from_input(&args.input, &context.options.site_base_url, messages)?;

    match context
        .store
        .add_item(item)
        .await
        .context("failed to persist new item")?
    {
        AddOutcome::Added { item } => {
            info!(target: "bstock_core", item = %item.id, url = %item.url, "item added");
            let lines = vec![
                markdown::header(2, "Item added"),
                markdown::bold("ID", &item.id),
                markdown::bold("URL", &item.url),
            ];
            Ok(text_response(lines).with_metadata(json!({
                "added": true,
                "item": item,
            })))
        }
        AddOutcome::AlreadyTracked { .. } => Err(InputError::AlreadyTracked(messages.already_tracked).into()),
    }
}

pub fn remove_item_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "remove_item".to_string(),
            description: "Stop tracking an item and forget its results".to_string(),
            input_schema: url_schema("URL or article ID of the item to remove"),
        },
        wrap_handler(handle_remove_item),
    )
}

async fn handle_remove_item(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: UrlArgs = parse_args(value)?;
    let outcome = context
        .store
        .remove(&args.url)
        .await
        .context("failed to remove item")?;

    let text = if outcome.removed() {
        info!(target: "bstock_core", removed = ?outcome.removed_ids, "items removed");
        format!("Removed {}", outcome.removed_ids.join(", "))
    } else {
        let messages = Messages::for_language(context.store.settings().await.language);
        messages.not_tracked.to_string()
    };
    Ok(text_response([text]).with_metadata(json!({
        "removed": outcome.removed(),
        "removedIds": outcome.removed_ids,
    })))
}

pub fn is_tracked_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "is_tracked".to_string(),
            description: "Report whether a URL or article ID is tracked and what kind of page it is"
                .to_string(),
            input_schema: url_schema("URL or article ID to look up"),
        },
        wrap_handler(handle_is_tracked),
    )
}

async fn handle_is_tracked(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: UrlArgs = parse_args(value)?;
    let item = context.store.find(&args.url).await;
    let page_kind = classify_page_url(args.url.trim());

    let text = match &item {
        Some(item) => format!("Tracked as {}", item.display_name()),
        None => "Not tracked".to_string(),
    };
    Ok(text_response([text]).with_metadata(json!({
        "tracked": item.is_some(),
        "item": item,
        "pageKind": page_kind,
    })))
}

pub fn list_items_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "list_items".to_string(),
            description: "List tracked items in insertion order".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        wrap_handler(|context, _value| async move { handle_list_items(context).await }),
    )
}

async fn handle_list_items(context: Arc<AppContext>) -> Result<CommandResponse> {
    let items = context.store.items().await;
    if items.is_empty() {
        let messages = Messages::for_language(context.store.settings().await.language);
        return Ok(text_response([messages.no_items.to_string()])
            .with_metadata(json!({"count": 0, "items": []})));
    }

    let mut lines = vec![markdown::header(2, &format!("Tracked items ({})", items.len()))];
    lines.extend(
        items
            .iter()
            .map(|item| format!("- **{}** `{}` {}", item.display_name(), item.id, item.url)),
    );
    Ok(text_response(lines).with_metadata(json!({
        "count": items.len(),
        "items": items,
    })))
}

pub fn clear_items_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "clear_items".to_string(),
            description: "Remove several items and their results at once".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Identifiers of the items to remove"
                    }
                },
                "required": ["ids"]
            }),
        },
        wrap_handler(handle_clear_items),
    )
}

async fn handle_clear_items(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: ClearItemsArgs = parse_args(value)?;
    let outcome = context
        .store
        .remove_ids(&args.ids)
        .await
        .context("failed to remove items")?;

    Ok(text_response([format!("Removed {} item(s)", outcome.removed_ids.len())]).with_metadata(
        json!({
            "removed": outcome.removed_ids.len(),
            "removedIds": outcome.removed_ids,
        }),
    ))
}
