use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::{
    i18n::Messages,
    markdown,
    services::{
        available_count,
        poller::{self, PollTrigger},
        sorted_results,
    },
    state::{AppContext, CommandDefinition, CommandHandler, CommandResponse},
};

use super::{parse_args, text_response, wrap_handler};

#[derive(Deserialize)]
struct CheckOneArgs {
    url: String,
}

pub fn check_one_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "check_one".to_string(),
            description: "Check a single product page now. Tracked items keep the result; other pages are checked without tracking them.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Product URL or article ID"
                    }
                },
                "required": ["url"]
            }),
        },
        wrap_handler(handle_check_one),
    )
}

async fn handle_check_one(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: CheckOneArgs = parse_args(value)?;
    let check = poller::check_one(&context, &args.url).await?;

    let lines = vec![
        markdown::header(2, &format!("Article {}", check.item_id)),
        markdown::result_bullet(&check.url, &check.result),
    ];
    Ok(text_response(lines).with_metadata(serde_json::to_value(&check)?))
}

pub fn check_all_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "check_all".to_string(),
            description: "Check every tracked item now, one after another".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        wrap_handler(|context, _value| async move { handle_check_all(context).await }),
    )
}

async fn handle_check_all(context: Arc<AppContext>) -> Result<CommandResponse> {
    if context.store.items().await.is_empty() {
        let messages = Messages::for_language(context.store.settings().await.language);
        return Ok(text_response([messages.no_items.to_string()])
            .with_metadata(json!({"checked": 0})));
    }

    let report = poller::check_all(&context, PollTrigger::Manual).await?;
    let lines = vec![
        markdown::header(2, "Check complete"),
        markdown::bold("Checked", &report.checked.to_string()),
        markdown::bold("Available", &report.available.to_string()),
        markdown::bold("Errors", &report.errors.to_string()),
    ];
    Ok(text_response(lines).with_metadata(serde_json::to_value(&report)?))
}

pub fn list_results_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "list_results".to_string(),
            description: "Latest result per item, available items first, then newest".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        wrap_handler(|context, _value| async move { handle_list_results(context).await }),
    )
}

async fn handle_list_results(context: Arc<AppContext>) -> Result<CommandResponse> {
    let document = context.store.snapshot().await;
    let rows = sorted_results(&document.results, &document.items);
    let available = available_count(&document.results);

    let mut lines = vec![markdown::header(
        2,
        &format!("Results ({available} available)"),
    )];
    lines.extend(rows.iter().map(|row| {
        let label = row.name.clone().unwrap_or_else(|| row.id.clone());
        markdown::result_bullet(&label, &row.result)
    }));

    Ok(text_response(lines).with_metadata(json!({
        "available": available,
        "results": rows,
    })))
}
