use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// A user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub item_id: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Emits notifications as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            target: "bstock_notifier",
            item = %notification.item_id,
            title = %notification.title,
            url = notification.url.as_deref().unwrap_or(""),
            "{}",
            notification.message
        );
        Ok(())
    }
}
