use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::state::{AppContext, CommandContent, CommandEntry, CommandHandler, CommandResponse};

mod check;
mod items;
mod settings;

pub async fn register_commands(context: Arc<AppContext>) {
    let commands = [
        items::add_item_definition(),
        items::remove_item_definition(),
        items::is_tracked_definition(),
        items::list_items_definition(),
        items::clear_items_definition(),
        check::check_one_definition(),
        check::check_all_definition(),
        check::list_results_definition(),
        settings::update_schedule_definition(),
        settings::set_language_definition(),
        settings::status_definition(),
    ];

    let registry = context.commands.clone();

    for (definition, handler) in commands {
        registry
            .insert(CommandEntry {
                definition,
                handler,
            })
            .await;
    }
}

pub(crate) fn text_response(lines: impl IntoIterator<Item = String>) -> CommandResponse {
    CommandResponse {
        content: vec![CommandContent {
            r#type: "text".to_string(),
            text: lines.into_iter().collect::<Vec<_>>().join("\n"),
        }],
        metadata: None,
    }
}

pub(crate) fn wrap_handler<F, Fut>(handler: F) -> CommandHandler
where
    F: Fn(Arc<AppContext>, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<CommandResponse>> + Send + 'static,
{
    Arc::new(move |context, value| Box::pin(handler(context, value)))
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    let value = if value.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|error| anyhow!("invalid arguments: {error}"))
}
