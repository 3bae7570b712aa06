use std::sync::Arc;

use anyhow::{Context, Result};
use bstock_client::types::{Language, MIN_CHECK_INTERVAL_MINUTES};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    i18n::Messages,
    markdown,
    services::{available_count, scheduler},
    state::{AppContext, CommandDefinition, CommandHandler, CommandResponse},
    InputError,
};

use super::{parse_args, text_response, wrap_handler};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    enabled: bool,
    interval_minutes: Option<i64>,
    notifications_enabled: Option<bool>,
}

#[derive(Deserialize)]
struct LanguageArgs {
    language: String,
}

pub fn update_schedule_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "update_schedule_settings".to_string(),
            description: "Enable or disable automatic checks and set their interval".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "enabled": {"type": "boolean"},
                    "intervalMinutes": {
                        "type": "integer",
                        "minimum": MIN_CHECK_INTERVAL_MINUTES,
                        "description": "Minutes between automatic checks"
                    },
                    "notificationsEnabled": {"type": "boolean"}
                },
                "required": ["enabled"]
            }),
        },
        wrap_handler(handle_update_schedule),
    )
}

/// Validates a requested interval, keeping the stored one when none is given.
fn validate_interval(
    requested: Option<i64>,
    current: u32,
    messages: &Messages,
) -> Result<u32, InputError> {
    let Some(requested) = requested else {
        return Ok(current);
    };
    u32::try_from(requested)
        .ok()
        .filter(|minutes| *minutes >= MIN_CHECK_INTERVAL_MINUTES)
        .ok_or(InputError::IntervalTooShort(messages.interval_too_short))
}

async fn handle_update_schedule(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: ScheduleArgs = parse_args(value)?;
    let current = context.store.settings().await;
    let messages = Messages::for_language(current.language);
    let interval = validate_interval(args.interval_minutes, current.check_interval_minutes, messages)?;

    let settings = context
        .store
        .update_settings(|settings| {
            settings.auto_check_enabled = args.enabled;
            settings.check_interval_minutes = interval;
            if let Some(enabled) = args.notifications_enabled {
                settings.notifications_enabled = enabled;
            }
        })
        .await
        .context("failed to persist schedule settings")?;

    let armed = scheduler::configure(
        &context,
        settings.auto_check_enabled,
        settings.check_interval_minutes,
    )
    .await;
    info!(
        target: "bstock_core",
        enabled = settings.auto_check_enabled,
        interval_minutes = settings.check_interval_minutes,
        "schedule updated"
    );

    let text = match armed {
        Some(minutes) => format!("Automatic checks every {minutes} minute(s)"),
        None => "Automatic checks disabled".to_string(),
    };
    Ok(text_response([text]).with_metadata(json!({
        "settings": settings,
        "schedulerRunning": armed.is_some(),
    })))
}

pub fn set_language_definition() -> (CommandDefinition, CommandHandler) {
    let codes: Vec<&str> = Language::all().iter().map(|language| language.code()).collect();
    (
        CommandDefinition {
            name: "set_language".to_string(),
            description: "Choose the language of status messages and notifications".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "language": {
                        "type": "string",
                        "enum": codes
                    }
                },
                "required": ["language"]
            }),
        },
        wrap_handler(handle_set_language),
    )
}

async fn handle_set_language(context: Arc<AppContext>, value: serde_json::Value) -> Result<CommandResponse> {
    let args: LanguageArgs = parse_args(value)?;
    let language = Language::from_str_loose(&args.language)
        .ok_or_else(|| InputError::UnknownLanguage(args.language.clone()))?;

    let settings = context
        .store
        .update_settings(|settings| settings.language = language)
        .await
        .context("failed to persist language")?;

    Ok(text_response([format!("Language set to {language}")]).with_metadata(json!({
        "language": settings.language,
    })))
}

pub fn status_definition() -> (CommandDefinition, CommandHandler) {
    (
        CommandDefinition {
            name: "status".to_string(),
            description: "Summarise tracked items, available count, settings and the last poll"
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        wrap_handler(|context, _value| async move { handle_status(context).await }),
    )
}

async fn handle_status(context: Arc<AppContext>) -> Result<CommandResponse> {
    let document = context.store.snapshot().await;
    let available = available_count(&document.results);
    let running = scheduler::is_running(&context).await;
    let last_poll = context.state.activity.last_poll().await;

    let mut lines = vec![
        markdown::header(2, "B-Stock Beacon"),
        markdown::bold("Tracked items", &document.items.len().to_string()),
        markdown::bold("Available", &available.to_string()),
        markdown::bold(
            "Automatic checks",
            &if document.settings.auto_check_enabled {
                format!("every {} minute(s)", document.settings.check_interval_minutes)
            } else {
                "off".to_string()
            },
        ),
        markdown::bold(
            "Notifications",
            if document.settings.notifications_enabled { "on" } else { "off" },
        ),
        markdown::bold("Language", document.settings.language.code()),
    ];
    if let Some(report) = &last_poll {
        lines.push(markdown::bold(
            "Last poll",
            &format!("{} ({} checked)", report.started_at, report.checked),
        ));
    }

    Ok(text_response(lines).with_metadata(json!({
        "items": document.items.len(),
        "badge": available,
        "settings": document.settings,
        "schedulerRunning": running,
        "dataPath": context.store.path().display().to_string(),
        "lastPoll": last_poll,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_must_be_at_least_a_minute() {
        let messages = Messages::for_language(Language::En);
        assert_eq!(validate_interval(Some(5), 30, messages), Ok(5));
        assert_eq!(validate_interval(None, 30, messages), Ok(30));
        assert_eq!(
            validate_interval(Some(0), 30, messages),
            Err(InputError::IntervalTooShort(messages.interval_too_short))
        );
        assert_eq!(
            validate_interval(Some(-3), 30, messages),
            Err(InputError::IntervalTooShort(messages.interval_too_short))
        );
    }
}
