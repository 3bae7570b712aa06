//! Dispatch of registered commands.
//!
//! Every call lands in the activity log next to the poll reports, so `status`
//! style front ends can show one timeline of what the checker did. Refused
//! input is kept apart from real failures: it is logged quietly and surfaced
//! to callers as [`CommandExecutorError::Rejected`] with the localized reason.

use std::{sync::Arc, time::Instant};

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    state::{ActivityEntry, AppContext, CommandDefinition, CommandOutcome, CommandResponse},
    InputError,
};

#[derive(Debug, Error)]
pub enum CommandExecutorError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{reason}")]
    Rejected { name: String, reason: InputError },
    #[error("command `{name}` failed: {source}")]
    Execution {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CommandExecutorError {
    fn from_failure(name: &str, source: anyhow::Error) -> Self {
        match source.downcast::<InputError>() {
            Ok(reason) => Self::Rejected {
                name: name.to_string(),
                reason,
            },
            Err(source) => Self::Execution {
                name: name.to_string(),
                source,
            },
        }
    }

    /// The user-facing input rejection behind a failed command, if any.
    pub fn input_error(&self) -> Option<&InputError> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            Self::UnknownCommand(_) | Self::Execution { .. } => None,
        }
    }

    fn outcome(&self) -> CommandOutcome {
        match self {
            Self::Rejected { .. } => CommandOutcome::Rejected,
            Self::UnknownCommand(_) | Self::Execution { .. } => CommandOutcome::Failed,
        }
    }
}

#[derive(Clone)]
pub struct CommandExecutor {
    context: Arc<AppContext>,
}

impl CommandExecutor {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> Arc<AppContext> {
        self.context.clone()
    }

    pub async fn list_commands(&self) -> Vec<CommandDefinition> {
        self.context.commands.definitions().await
    }

    pub async fn call_command(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CommandResponse, CommandExecutorError> {
        let Some(entry) = self.context.commands.get(name).await else {
            return Err(CommandExecutorError::UnknownCommand(name.to_string()));
        };

        let started = Instant::now();
        let outcome = (entry.handler)(self.context.clone(), arguments)
            .await
            .map_err(|source| CommandExecutorError::from_failure(name, source));
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(_) => info!(target: "bstock_executor", command = name, latency_ms, "command completed"),
            Err(CommandExecutorError::Rejected { reason, .. }) => debug!(
                target: "bstock_executor",
                command = name,
                reason = %reason,
                "input rejected"
            ),
            Err(error) => warn!(
                target: "bstock_executor",
                command = name,
                latency_ms,
                error = %error,
                "command failed"
            ),
        }

        self.context
            .state
            .activity
            .record(ActivityEntry::Command {
                command: name.to_string(),
                timestamp: OffsetDateTime::now_utc(),
                latency_ms,
                outcome: outcome
                    .as_ref()
                    .map_or_else(CommandExecutorError::outcome, |_| CommandOutcome::Ok),
                error: outcome.as_ref().err().map(ToString::to_string),
            })
            .await;
        outcome
    }
}
