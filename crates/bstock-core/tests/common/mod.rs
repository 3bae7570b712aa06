#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use bstock_client::{types::Language, ClientError, ItemStore, PageFetcher};
use bstock_core::{
    notifier::{Notification, Notifier},
    state::{AppContext, PollOptions},
};
use tempfile::TempDir;
use tokio::{sync::mpsc, time::Instant};

pub const PRODUCT_URL: &str = "https://www.thomann.de/intl/harley_benton_st_20_123456.htm";
pub const B_STOCK_URL: &str = "https://www.thomann.de/intl/harley_benton_st_20_b_stock.htm";

pub fn product_page(name: &str, price: &str, b_stock_href: Option<&str>) -> String {
    let addons = b_stock_href.map_or_else(String::new, |href| {
        format!(
            r#"<div class="fx-content discounts-and-addons"><a href="{href}">B-Stock</a></div>"#
        )
    });
    format!(
        r#"<html><head><meta property="og:image" content="/pics/prod/123456.jpg"></head>
<body><h1>{name}</h1>
<span itemprop="price" content="{price}"></span>
{addons}
</body></html>"#
    )
}

pub fn b_stock_page(price: &str) -> String {
    format!(r#"<html><body><span itemprop="price" content="{price}"></span></body></html>"#)
}

/// Serves canned markup per URL and records every request.
#[derive(Default)]
pub struct StubFetcher {
    pages: Mutex<HashMap<String, Result<String, ClientError>>>,
    requests: Mutex<Vec<String>>,
    started: Mutex<Vec<Instant>>,
    observer: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl StubFetcher {
    pub fn serve(&self, url: &str, html: impl Into<String>) {
        self.lock_pages().insert(url.to_string(), Ok(html.into()));
    }

    pub fn fail(&self, url: &str, error: ClientError) {
        self.lock_pages().insert(url.to_string(), Err(error));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// When each request was made, on the tokio clock.
    pub fn request_times(&self) -> Vec<Instant> {
        self.started.lock().expect("times lock").clone()
    }

    /// Every fetched URL is also sent to the returned channel.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.observer.lock().expect("observer lock") = Some(sender);
        receiver
    }

    fn lock_pages(&self) -> std::sync::MutexGuard<'_, HashMap<String, Result<String, ClientError>>> {
        self.pages.lock().expect("pages lock")
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, ClientError> {
        self.requests.lock().expect("requests lock").push(url.to_string());
        self.started.lock().expect("times lock").push(Instant::now());
        if let Some(observer) = self.observer.lock().expect("observer lock").as_ref() {
            let _ = observer.send(url.to_string());
        }
        self.lock_pages()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(ClientError::Http(format!("no fixture for {url}"))))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().expect("notifier lock").push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub fetcher: Arc<StubFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub context: Arc<AppContext>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(PollOptions {
            request_delay: Duration::ZERO,
            ..PollOptions::default()
        })
        .await
    }

    pub async fn with_options(options: PollOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ItemStore::open(dir.path().join(ItemStore::FILE_NAME))
            .await
            .expect("store opens");
        store
            .update_settings(|settings| settings.language = Language::En)
            .await
            .expect("settings persist");

        let fetcher = Arc::new(StubFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let context = Arc::new(AppContext::new(
            fetcher.clone(),
            store,
            notifier.clone(),
            options,
        ));
        Self {
            dir,
            fetcher,
            notifier,
            context,
        }
    }

    pub async fn track(&self, id: &str, url: &str) {
        self.context
            .store
            .add_item(bstock_client::types::TrackedItem::new(id, url))
            .await
            .expect("item added");
    }
}
